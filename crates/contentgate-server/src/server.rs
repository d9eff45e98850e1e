use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{any, delete, get, post},
};
use contentgate_auth::{ApiKey, AuthGate, JwtVerifier, PublicPaths};
use contentgate_core::{EngineAdapter, EngineBridge, HttpEngineBridge, ResponseCache};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::{
    config::AppConfig,
    gateway::proxy,
    handlers::{self, cache, content, system},
    metrics, middleware as app_middleware,
    rate_limit::RateLimiter,
};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
     script-src 'self'; img-src 'self' data: https:; connect-src 'self'; font-src 'self'; \
     object-src 'none'; media-src 'self'; frame-src 'none'";

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<ResponseCache>,
    pub engine: EngineAdapter,
    pub auth_gate: Arc<AuthGate>,
    pub rate_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
    pub requests: Arc<AtomicU64>,
}

impl AppState {
    /// Assemble state around an engine bridge. Secrets left empty disable
    /// the corresponding credential type.
    pub fn new(config: AppConfig, bridge: Arc<dyn EngineBridge>) -> Self {
        let engine = EngineAdapter::new(
            bridge,
            config.engine.timeout(),
            config.engine.max_concurrency,
        );
        let auth_gate = AuthGate::new(PublicPaths::new(&config.auth.public_paths))
            .with_api_key(ApiKey::new(&config.auth.api_key))
            .with_jwt(JwtVerifier::new(&config.auth.jwt_secret));
        let rate_limiter = RateLimiter::from_config(&config.rate_limit);

        Self {
            config: Arc::new(config),
            cache: Arc::new(ResponseCache::new()),
            engine,
            auth_gate: Arc::new(auth_gate),
            rate_limiter: Arc::new(rate_limiter),
            started_at: Instant::now(),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn cors_layer(cfg: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            header::ACCEPT,
            header::ORIGIN,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-csrf-token"),
        ])
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    let cors = cors_layer(&state.config);

    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics_json))
        .route("/metrics/prometheus", get(system::prometheus))
        .route("/config", get(system::site_config))
        .route("/stats", get(system::content_stats))
        // Engine pass-through
        .route("/engine-proxy", any(proxy::engine_proxy))
        .route("/engine-proxy/{*path}", any(proxy::engine_proxy))
        .route("/content-proxy", any(proxy::content_proxy))
        .route("/content-proxy/{*path}", any(proxy::content_proxy))
        // Content
        .route("/content/featured", get(content::featured))
        .route("/search", get(content::search))
        .route("/content/batch", post(content::batch))
        .route("/preview/{type}/{id}", get(content::preview))
        // Cache administration
        .route("/cache/invalidate", post(cache::invalidate))
        .route("/webhook/cache-invalidate", post(cache::invalidate))
        .route("/cache", delete(cache::flush))
        .route("/cache/stats", get(cache::stats))
        .fallback(handlers::not_found)
        // Middleware stack, innermost first:
        // auth -> rate limit -> request tracking -> security headers -> cors -> trace -> request id
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authenticate,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::track_requests,
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Periodically drop expired cache entries.
pub fn spawn_cache_sweeper(cache: Arc<ResponseCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                metrics::record_cache_invalidation("expired", removed);
                tracing::debug!(removed, "Expired cache entries purged");
            }
            metrics::set_cache_entries(cache.len());
        }
    })
}

pub struct ContentGateServer {
    addr: SocketAddr,
    state: AppState,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    bridge: Option<Arc<dyn EngineBridge>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            bridge: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use a specific engine bridge instead of the HTTP bridge to
    /// `engine.base_url`.
    pub fn with_bridge(mut self, bridge: Arc<dyn EngineBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn build(self) -> anyhow::Result<ContentGateServer> {
        let bridge = match self.bridge {
            Some(bridge) => bridge,
            None => Arc::new(HttpEngineBridge::new(self.config.engine.base_url.clone())?),
        };
        tracing::info!(
            engine = bridge.name(),
            base_url = %self.config.engine.base_url,
            max_concurrency = self.config.engine.max_concurrency,
            timeout_ms = self.config.engine.timeout_ms,
            "Engine bridge configured"
        );

        Ok(ContentGateServer {
            addr: self.addr,
            state: AppState::new(self.config, bridge),
        })
    }
}

impl ContentGateServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let sweep_secs = self.state.config.cache.sweep_interval_secs;
        let sweeper = (sweep_secs > 0).then(|| {
            spawn_cache_sweeper(self.state.cache.clone(), Duration::from_secs(sweep_secs))
        });

        let app = build_app(self.state);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
