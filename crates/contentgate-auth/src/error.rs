/// Errors produced while admitting a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No acceptable credentials on a gated request.
    #[error("Authentication required: {message}")]
    AuthenticationRequired {
        /// Description shown to the caller.
        message: String,
    },

    /// The bearer token is malformed or its signature does not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The bearer token has expired.
    #[error("Token expired")]
    TokenExpired,
}

impl AuthError {
    /// Creates a new `AuthenticationRequired` error.
    #[must_use]
    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self::AuthenticationRequired {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }
}
