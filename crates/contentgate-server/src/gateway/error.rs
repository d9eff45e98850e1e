//! Gateway error taxonomy and its JSON rendering.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use contentgate_auth::AuthError;
use contentgate_core::{EngineError, now_rfc3339};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors surfaced to gateway clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No acceptable credentials (401).
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    /// Client exceeded its request window (429).
    #[error("Too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Malformed or missing input (400).
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// The engine call failed at the transport level or timed out.
    #[error("{context}: {source}")]
    BackendUnavailable {
        context: &'static str,
        #[source]
        source: EngineError,
    },

    /// The engine answered, but not with what the handler needs.
    #[error("{context}: {message}")]
    MalformedBackendResponse {
        context: &'static str,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn backend(context: &'static str, source: EngineError) -> Self {
        Self::BackendUnavailable { context, source }
    }

    pub fn malformed(context: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedBackendResponse {
            context,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BackendUnavailable { .. }
            | Self::MalformedBackendResponse { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short `error` field of the envelope.
    fn title(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired(_) => "Authentication required",
            Self::RateLimited { .. } => "Too many requests",
            Self::Validation { .. } => "Bad request",
            Self::BackendUnavailable { context, .. }
            | Self::MalformedBackendResponse { context, .. } => context,
            Self::NotFound(_) => "Not found",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Caller-facing `message` field. Engine transport details stay in the logs.
    fn message(&self) -> String {
        match self {
            Self::AuthenticationRequired(message) => message.clone(),
            Self::RateLimited { retry_after_secs } => {
                format!("Rate limit exceeded, retry in {retry_after_secs} seconds")
            }
            Self::Validation { message, .. } => message.clone(),
            Self::BackendUnavailable { source, .. } if source.is_timeout() => {
                "The content engine did not respond in time".to_string()
            }
            Self::BackendUnavailable { .. } => "The content engine is unavailable".to_string(),
            Self::MalformedBackendResponse { message, .. } => message.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Internal(_) => "An unexpected error occurred".to_string(),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationRequired { message } => Self::AuthenticationRequired(message),
            other => Self::AuthenticationRequired(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = json!({
            "error": self.title(),
            "message": self.message(),
            "timestamp": now_rfc3339(),
        });
        if let Self::Validation {
            details: Some(details),
            ..
        } = &self
        {
            body["details"] = details.clone();
        }

        let mut response = (status, Json(body)).into_response();
        match &self {
            Self::AuthenticationRequired(_) => {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static("Bearer"),
                );
            }
            Self::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            _ => {}
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unauthorized_envelope() {
        let response =
            GatewayError::AuthenticationRequired("Please provide a valid API key".into())
                .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let body = body_json(response).await;
        assert_eq!(body["error"], "Authentication required");
        assert_eq!(body["message"], "Please provide a valid API key");
        assert!(body["timestamp"].is_string());
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = GatewayError::RateLimited {
            retry_after_secs: 17,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "17");
    }

    #[tokio::test]
    async fn test_backend_error_hides_transport_detail() {
        let err = GatewayError::backend(
            "Failed to fetch featured content",
            EngineError::unreachable("connection refused (os error 111)"),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to fetch featured content");
        assert!(!body["message"].as_str().unwrap().contains("os error"));

        let timeout = GatewayError::backend("Search failed", EngineError::Timeout(Duration::from_secs(1)));
        let body = body_json(timeout.into_response()).await;
        assert_eq!(body["message"], "The content engine did not respond in time");
    }

    #[tokio::test]
    async fn test_validation_details() {
        let err = GatewayError::validation_with_details(
            "Too many ids",
            json!({"max_batch_size": 50}),
        );
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"], "Bad request");
        assert_eq!(body["details"]["max_batch_size"], 50);
    }

    #[test]
    fn test_from_auth_error() {
        let err: GatewayError = AuthError::authentication_required("nope").into();
        assert!(matches!(err, GatewayError::AuthenticationRequired(ref m) if m == "nope"));
    }
}
