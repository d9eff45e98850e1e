//! HS256 bearer token verification.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;

use crate::error::AuthError;

/// Verifies bearer tokens signed with the shared gateway secret.
///
/// `exp` and `nbf` are enforced when present; no claim is mandatory. The
/// decoded claims are returned as raw JSON and become the request principal.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Returns `None` for an empty secret, which disables JWT auth.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        Some(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Decode and validate a token, returning its claims.
    pub fn verify(&self, token: &str) -> Result<Value, AuthError> {
        decode::<Value>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::invalid_token(e.to_string()),
            })
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithm", &Algorithm::HS256)
            .finish()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
