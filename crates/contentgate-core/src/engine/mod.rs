//! Content engine access.
//!
//! The engine is an opaque request executor. Everything the gateway sends
//! it goes through an [`EngineBridge`]; the [`EngineAdapter`] wraps a bridge
//! with a concurrency bound, a per-call timeout and call accounting.
//!
//! ```text
//! handler ──▶ EngineAdapter ──▶ dyn EngineBridge
//!             (permits, timeout)   ├─ HttpEngineBridge     (engine's local origin)
//!                                  └─ BlockingEngineBridge (in-process executor)
//! ```

mod adapter;
mod blocking;
mod http_bridge;

pub use adapter::{EngineAdapter, EngineStatsSnapshot, forward_path};
pub use blocking::BlockingEngineBridge;
pub use http_bridge::HttpEngineBridge;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::{Value, json};

use crate::error::EngineError;

/// Media type of the engine's structured-content (JSON:API) documents.
pub const STRUCTURED_CONTENT_TYPE: &str = "application/vnd.api+json";

/// A single, self-contained call into the engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub method: Method,
    /// Engine-side path including the query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl EngineRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body; empty bodies are dropped.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = (!body.is_empty()).then_some(body);
        self
    }

    /// Force content negotiation to the structured-content media type.
    pub fn structured_content(mut self) -> Self {
        let value = HeaderValue::from_static(STRUCTURED_CONTENT_TYPE);
        self.headers.insert(ACCEPT, value.clone());
        self.headers.insert(CONTENT_TYPE, value);
        self
    }
}

/// Raw engine response.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Engine body classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON.
    Json(Value),
    /// Body that is not JSON, kept verbatim.
    Raw(String),
}

impl Payload {
    /// Structured form: JSON as-is, raw text wrapped as `{ "data": text }`.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Raw(text) => json!({ "data": text }),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json(_))
    }
}

impl EngineResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// JSON response helper, mostly for in-process bridges and tests.
    pub fn json(status: StatusCode, value: &Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(STRUCTURED_CONTENT_TYPE),
        );
        response
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn payload(&self) -> Payload {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(String::from_utf8_lossy(&self.body).into_owned()),
        }
    }
}

/// Transport to the content engine.
///
/// Implementations must treat every call independently: the result of a
/// call depends only on its own request.
#[async_trait]
pub trait EngineBridge: Send + Sync {
    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError>;

    /// Short label used in logs.
    fn name(&self) -> &'static str {
        "engine"
    }
}
