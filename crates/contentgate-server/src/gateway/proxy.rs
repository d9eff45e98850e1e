//! Pass-through proxies onto the content engine.
//!
//! `/engine-proxy/*` forwards to the engine's document root and
//! `/content-proxy/*` to its structured-content API. Both cache successful
//! GET responses under `<scope>_GET_<path?query>`.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Method, Request, StatusCode},
    response::Response,
};
use contentgate_core::{
    CacheTag, EngineRequest, Payload, STRUCTURED_CONTENT_TYPE, forward_path, now_rfc3339,
};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{CacheStatus, GatewayError, call_engine, json_response};
use crate::metrics;
use crate::server::AppState;

/// Which engine surface a proxy route targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Engine,
    Content,
}

impl ProxyKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ProxyKind::Engine => "/engine-proxy",
            ProxyKind::Content => "/content-proxy",
        }
    }

    /// Cache key prefix and metrics label.
    pub fn scope(self) -> &'static str {
        match self {
            ProxyKind::Engine => "engine-proxy",
            ProxyKind::Content => "content-proxy",
        }
    }

    fn context(self) -> &'static str {
        match self {
            ProxyKind::Engine => "Engine request failed",
            ProxyKind::Content => "Content API request failed",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            ProxyKind::Engine => "application/json",
            ProxyKind::Content => STRUCTURED_CONTENT_TYPE,
        }
    }
}

/// Cache key for one logical proxied request.
pub fn cache_key(kind: ProxyKind, method: &Method, stripped_path_and_query: &str) -> String {
    format!("{}_{}_{}", kind.scope(), method, stripped_path_and_query)
}

/// Entity tags for `/node/{type}[/{id}]` style paths.
pub fn entity_tags(stripped_path: &str) -> Vec<CacheTag> {
    let path = stripped_path.split('?').next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    if segments.next() != Some("node") {
        return Vec::new();
    }
    match (segments.next(), segments.next()) {
        (Some(entity_type), Some(id)) => vec![
            CacheTag::entity_type(entity_type),
            CacheTag::entity(entity_type, id),
        ],
        (Some(entity_type), None) => vec![CacheTag::entity_type(entity_type)],
        _ => Vec::new(),
    }
}

pub async fn engine_proxy(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    forward(&state, ProxyKind::Engine, request).await
}

pub async fn content_proxy(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    forward(&state, ProxyKind::Content, request).await
}

#[instrument(skip(state, request), fields(method = %request.method(), path = %request.uri().path()))]
async fn forward(
    state: &AppState,
    kind: ProxyKind,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let stripped = forward_path(uri.path(), kind.prefix(), "", uri.query());
    let cacheable = method == Method::GET;
    let key = cache_key(kind, &method, &stripped);

    if cacheable {
        if let Some(cached) = state.cache.get(&key) {
            debug!(key = %key, "cache hit");
            metrics::record_cache_hit(kind.scope());
            return Ok(json_response(
                StatusCode::OK,
                cached.to_vec(),
                kind.content_type(),
                Some(CacheStatus::Hit),
            ));
        }
        metrics::record_cache_miss(kind.scope());
    }

    let base = match kind {
        ProxyKind::Engine => "",
        ProxyKind::Content => state.config.engine.content_api_base.as_str(),
    };
    let engine_path = forward_path(uri.path(), kind.prefix(), base, uri.query());
    let headers = forwarded_headers(request.headers(), state.config.engine.forward_auth_headers);
    let body = axum::body::to_bytes(request.into_body(), state.config.server.body_limit_bytes)
        .await
        .map_err(|e| GatewayError::validation(format!("Failed to read request body: {e}")))?;

    let mut engine_request = EngineRequest::new(method.clone(), engine_path)
        .with_headers(headers)
        .with_body(body);
    if kind == ProxyKind::Content {
        engine_request = engine_request.structured_content();
    }

    let response = call_engine(state, kind.scope(), kind.context(), engine_request).await?;
    let status = response.status;

    let value = match response.payload() {
        Payload::Json(value) if kind == ProxyKind::Content && status.is_success() => {
            with_generated_at(value)
        }
        payload => payload.into_value(),
    };
    let body = serde_json::to_vec(&value)
        .map_err(|e| GatewayError::Internal(format!("failed to serialize response: {e}")))?;

    if !cacheable {
        return Ok(json_response(status, body, kind.content_type(), None));
    }

    if status == StatusCode::OK {
        state.cache.set_tagged(
            key,
            body.clone(),
            state.config.cache.default_ttl(),
            entity_tags(&stripped),
        );
    }
    Ok(json_response(
        status,
        body,
        kind.content_type(),
        Some(CacheStatus::Miss),
    ))
}

/// Stamp `meta.generated_at` on JSON objects carrying `data`.
fn with_generated_at(mut value: Value) -> Value {
    let Some(document) = value.as_object_mut() else {
        return value;
    };
    if !document.contains_key("data") {
        return value;
    }
    let meta = document.entry("meta").or_insert_with(|| json!({}));
    if let Some(meta) = meta.as_object_mut() {
        meta.entry("generated_at")
            .or_insert_with(|| Value::String(now_rfc3339()));
    }
    value
}

/// Why an inbound header stays at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Withheld {
    /// Describes this connection only, or is recomputed for the engine call.
    Connection,
    /// Asks for a body encoding the bridge cannot decode.
    Encoding,
    /// The gateway's own credential.
    GatewayCredential,
    /// End-user credential, held back unless `engine.forward_auth_headers`.
    UserCredential,
}

fn withheld(name: &HeaderName, forward_auth: bool) -> Option<Withheld> {
    match name.as_str() {
        "connection" | "keep-alive" | "proxy-authenticate" | "proxy-authorization" | "te"
        | "trailer" | "trailers" | "transfer-encoding" | "upgrade" | "host"
        | "content-length" => Some(Withheld::Connection),
        "accept-encoding" => Some(Withheld::Encoding),
        contentgate_auth::X_API_KEY_HEADER => Some(Withheld::GatewayCredential),
        "authorization" | "cookie" if !forward_auth => Some(Withheld::UserCredential),
        _ => None,
    }
}

/// Copy inbound headers that are safe to hand to the engine.
fn forwarded_headers(incoming: &HeaderMap, forward_auth: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in incoming {
        match withheld(name, forward_auth) {
            None => {
                headers.append(name.clone(), value.clone());
            }
            Some(reason) => debug!(header = %name, ?reason, "Header withheld from engine"),
        }
    }
    headers
}
