//! Authentication context attached to each admitted request.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// How a request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Path is on the public allowlist; credentials were not inspected.
    Public,
    ApiKey,
    Jwt,
    /// Read method without valid credentials.
    AnonymousRead,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::ApiKey => write!(f, "api-key"),
            Self::Jwt => write!(f, "jwt"),
            Self::AnonymousRead => write!(f, "anonymous-read"),
        }
    }
}

/// Authenticated identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    ApiKey,
    /// Decoded JWT claims (wrapped in Arc for cheap cloning).
    Claims(Arc<Value>),
}

impl Principal {
    /// Display name for logs: `api-key`, or the token's `sub` claim.
    pub fn label(&self) -> String {
        match self {
            Principal::ApiKey => "api-key".to_string(),
            Principal::Claims(claims) => claims
                .get("sub")
                .and_then(Value::as_str)
                .unwrap_or("jwt")
                .to_string(),
        }
    }
}

/// Result of the auth gate, stored in request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub method: AuthMethod,
    pub principal: Option<Principal>,
}

impl AuthContext {
    pub fn public() -> Self {
        Self {
            method: AuthMethod::Public,
            principal: None,
        }
    }

    pub fn api_key() -> Self {
        Self {
            method: AuthMethod::ApiKey,
            principal: Some(Principal::ApiKey),
        }
    }

    pub fn jwt(claims: Value) -> Self {
        Self {
            method: AuthMethod::Jwt,
            principal: Some(Principal::Claims(Arc::new(claims))),
        }
    }

    pub fn anonymous_read() -> Self {
        Self {
            method: AuthMethod::AnonymousRead,
            principal: None,
        }
    }

    /// `true` only for API-key and JWT admission.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// Decoded JWT claims, if the request carried a valid token.
    pub fn claims(&self) -> Option<&Value> {
        match &self.principal {
            Some(Principal::Claims(claims)) => Some(claims),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_authenticated_flags() {
        assert!(!AuthContext::public().is_authenticated());
        assert!(!AuthContext::anonymous_read().is_authenticated());
        assert!(AuthContext::api_key().is_authenticated());

        let ctx = AuthContext::jwt(json!({"sub": "alice"}));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.claims().unwrap()["sub"], "alice");
        assert_eq!(ctx.principal.unwrap().label(), "alice");
    }

    #[test]
    fn test_method_display() {
        assert_eq!(AuthMethod::AnonymousRead.to_string(), "anonymous-read");
        assert_eq!(
            serde_json::to_value(AuthMethod::ApiKey).unwrap(),
            json!("api-key")
        );
    }
}
