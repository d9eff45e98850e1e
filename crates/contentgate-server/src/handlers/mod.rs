//! HTTP handlers for the gateway's own endpoints.

pub mod cache;
pub mod content;
pub mod system;

use axum::http::Uri;
use serde_json::Value;

use crate::gateway::GatewayError;
use crate::server::AppState;

/// Engine-side path under the structured-content API base.
pub(crate) fn content_api_path(state: &AppState, rest: &str) -> String {
    format!(
        "{}/{}",
        state.config.engine.content_api_base.trim_end_matches('/'),
        rest.trim_start_matches('/')
    )
}

/// Lowercase machine name such as `article` or `basic_page`.
pub(crate) fn is_machine_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 64
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Identifier that can be spliced into an engine path as one segment.
pub(crate) fn is_path_safe_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Identifier given as a JSON string or number.
pub(crate) fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a JSON request body, mapping failures onto the gateway envelope.
pub(crate) fn parse_json_body(body: &[u8]) -> Result<Value, GatewayError> {
    if body.is_empty() {
        return Err(GatewayError::validation("Request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::validation(format!("Request body is not valid JSON: {e}")))
}

pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("Route {}", uri.path()))
}
