//! Shared-secret API key check.

use sha2::{Digest, Sha256};

/// Header carrying the gateway API key.
pub const X_API_KEY_HEADER: &str = "x-api-key";

/// Configured API key, kept only as a SHA-256 digest.
///
/// Presented keys are hashed and compared without early exit.
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl ApiKey {
    /// Returns `None` for an empty secret, which disables API-key auth.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        })
    }

    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let key = ApiKey::new("s3cret").unwrap();
        assert!(key.matches("s3cret"));
        assert!(!key.matches("s3cret "));
        assert!(!key.matches(""));
    }

    #[test]
    fn test_empty_secret_disables() {
        assert!(ApiKey::new("").is_none());
    }

    #[test]
    fn test_debug_redacts() {
        let key = ApiKey::new("s3cret").unwrap();
        assert!(!format!("{key:?}").contains("s3cret"));
    }
}
