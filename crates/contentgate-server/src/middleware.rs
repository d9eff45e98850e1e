use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::metrics;
use crate::rate_limit::{RateDecision, client_identity};
use crate::server::AppState;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// =============================================================================
// Rate Limiting
// =============================================================================

/// Fixed-window rate limiting. Runs before authentication so rejected
/// requests never reach the auth gate.
pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.config.rate_limit.enabled {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(
        req.headers(),
        peer,
        state.config.rate_limit.trust_forwarded_for,
    );

    match state.rate_limiter.check(&client) {
        RateDecision::Allowed {
            limit,
            remaining,
            reset_secs,
        } => {
            let mut res = next.run(req).await;
            let headers = res.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_secs));
            res
        }
        RateDecision::Limited {
            limit,
            retry_after_secs,
        } => {
            metrics::record_rate_limited();
            tracing::warn!(
                client = %client,
                path = %req.uri().path(),
                "Rate limit exceeded"
            );
            let mut res = GatewayError::RateLimited { retry_after_secs }.into_response();
            let headers = res.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
            headers.insert(X_RATELIMIT_RESET, HeaderValue::from(retry_after_secs));
            res
        }
        RateDecision::Untracked => next.run(req).await,
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Classify the request with the auth gate and store the resulting
/// `AuthContext` in request extensions for downstream handlers.
///
/// Requests the gate rejects get 401 with a `WWW-Authenticate: Bearer`
/// challenge and never reach a handler.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let decision = state
        .auth_gate
        .evaluate(req.method(), req.uri().path(), req.headers());

    match decision {
        Ok(ctx) => {
            let principal = ctx.principal.as_ref().map(|p| p.label());
            tracing::debug!(
                auth.method = %ctx.method,
                principal = principal.as_deref().unwrap_or("-"),
                "Request admitted"
            );
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(
                method = %req.method(),
                path = %req.uri().path(),
                error = %e,
                "Request rejected by auth gate"
            );
            GatewayError::from(e).into_response()
        }
    }
}

// =============================================================================
// Other Middleware
// =============================================================================

/// Count requests and record per-route latency.
pub async fn track_requests(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let res = next.run(req).await;

    state.requests.fetch_add(1, Ordering::Relaxed);
    metrics::record_http_request(
        method.as_str(),
        &path,
        res.status().as_u16(),
        started.elapsed(),
    );
    res
}

// Middleware that ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = req
        .headers()
        .get(&header_name)
        .cloned()
        .unwrap_or_else(new_request_id);

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;

    // Add/propagate the request id header to response
    res.headers_mut().insert(header_name, req_id_value);

    res
}

fn new_request_id() -> HeaderValue {
    // A hyphenated UUID is always a valid header value
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}
