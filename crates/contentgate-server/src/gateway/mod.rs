//! Request forwarding to the content engine.
//!
//! Shared pieces used by every engine-facing handler:
//! - [`call_engine`]: one adapter call with metrics and error mapping
//! - [`expect_json`]: strict decoding for handlers that aggregate data
//! - [`json_response`]: JSON body with an optional `X-Cache` marker

pub mod error;
pub mod proxy;

pub use error::GatewayError;

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use contentgate_core::{EngineRequest, EngineResponse, Payload};
use serde_json::Value;

use crate::metrics;
use crate::server::AppState;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Whether a cacheable response was served from the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Build a response around an already-serialized JSON body.
pub fn json_response(
    status: StatusCode,
    body: impl Into<Body>,
    content_type: &'static str,
    cache: Option<CacheStatus>,
) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(cache) = cache {
        headers.insert(X_CACHE, HeaderValue::from_static(cache.as_str()));
    }
    response
}

/// Execute one engine call for `operation`.
///
/// Transport failures become [`GatewayError::BackendUnavailable`] carrying
/// `context` as the caller-facing error title.
pub async fn call_engine(
    state: &AppState,
    operation: &'static str,
    context: &'static str,
    request: EngineRequest,
) -> Result<EngineResponse, GatewayError> {
    let started = Instant::now();
    let result = state.engine.execute(request).await;
    let outcome = match &result {
        Ok(response) if response.is_success() => "ok",
        Ok(_) => "error_status",
        Err(e) if e.is_timeout() => "timeout",
        Err(_) => "transport_error",
    };
    metrics::record_engine_call(operation, outcome, started.elapsed());
    result.map_err(|e| GatewayError::backend(context, e))
}

/// Require a successful JSON response.
pub fn expect_json(context: &'static str, response: &EngineResponse) -> Result<Value, GatewayError> {
    if !response.is_success() {
        return Err(GatewayError::malformed(
            context,
            format!("Content engine answered with status {}", response.status.as_u16()),
        ));
    }
    match response.payload() {
        Payload::Json(value) => Ok(value),
        Payload::Raw(_) => Err(GatewayError::malformed(
            context,
            "Content engine returned a non-JSON body",
        )),
    }
}

/// The `data` array of a structured-content listing; absent data is empty.
pub fn data_items(document: &Value) -> Vec<Value> {
    match document.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expect_json() {
        let ok = EngineResponse::json(StatusCode::OK, &json!({"data": []}));
        assert_eq!(expect_json("ctx", &ok).unwrap(), json!({"data": []}));

        let not_found = EngineResponse::json(StatusCode::NOT_FOUND, &json!({"errors": []}));
        assert!(matches!(
            expect_json("ctx", &not_found),
            Err(GatewayError::MalformedBackendResponse { .. })
        ));

        let html = EngineResponse::new(StatusCode::OK, "<html></html>");
        assert!(expect_json("ctx", &html).is_err());
    }

    #[test]
    fn test_data_items() {
        assert_eq!(data_items(&json!({"data": [1, 2]})).len(), 2);
        assert!(data_items(&json!({"data": null})).is_empty());
        assert!(data_items(&json!({"meta": {}})).is_empty());
        assert_eq!(data_items(&json!({"data": {"id": "1"}})), vec![json!({"id": "1"})]);
    }

    #[test]
    fn test_json_response_marks_cache_status() {
        let response = json_response(StatusCode::OK, "{}", "application/json", Some(CacheStatus::Hit));
        assert_eq!(response.headers()[X_CACHE], "HIT");

        let response = json_response(StatusCode::CREATED, "{}", "application/json", None);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get(X_CACHE).is_none());
    }
}
