use std::time::Duration;

use thiserror::Error;

/// Transport-level failures of an engine call.
///
/// Any of these means the engine produced no usable response. Callers must
/// never treat them as an empty success.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    #[error("Engine call failed: {0}")]
    Failed(String),

    #[error("Engine bridge is shut down")]
    Closed,
}

impl EngineError {
    /// Create a new Unreachable error
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    /// Create a new Failed error
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
