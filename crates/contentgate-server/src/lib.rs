//! HTTP gateway in front of a legacy content engine.
//!
//! Request pipeline: request id → trace → CORS and security headers →
//! rate limiter → auth gate → handler. Cacheable handlers consult the
//! shared [`ResponseCache`](contentgate_core::ResponseCache) before calling
//! the engine through the [`EngineAdapter`](contentgate_core::EngineAdapter).

pub mod config;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod server;

pub use config::AppConfig;
pub use gateway::GatewayError;
pub use observability::init_tracing;
pub use rate_limit::{RateDecision, RateLimiter};
pub use server::{AppState, ContentGateServer, ServerBuilder, build_app};
