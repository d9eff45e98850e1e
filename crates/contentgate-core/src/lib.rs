//! Core building blocks of the contentgate gateway.
//!
//! - [`cache`]: in-memory response cache with per-entry TTL, tag and
//!   substring invalidation, and hit/miss accounting.
//! - [`engine`]: the adapter in front of the content engine bridge, plus the
//!   bridge implementations (HTTP origin and in-process blocking executor).

pub mod cache;
pub mod engine;
pub mod error;
pub mod time;

pub use cache::{CacheStats, CacheTag, CachedEntry, ResponseCache};
pub use engine::{
    BlockingEngineBridge, EngineAdapter, EngineBridge, EngineRequest, EngineResponse,
    EngineStatsSnapshot, HttpEngineBridge, Payload, STRUCTURED_CONTENT_TYPE, forward_path,
};
pub use error::EngineError;
pub use time::now_rfc3339;
