//! Admission decision for inbound requests.

use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use tracing::{debug, warn};

use crate::api_key::{ApiKey, X_API_KEY_HEADER};
use crate::context::AuthContext;
use crate::error::AuthError;
use crate::jwt::{JwtVerifier, bearer_token};

/// Paths that bypass credential checks.
///
/// A configured path matches itself and anything below it on a segment
/// boundary: `/health` matches `/health` and `/health/live`, not
/// `/healthcheck`.
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    paths: Vec<String>,
}

impl PublicPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| p.as_ref().trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|public| {
            path.strip_prefix(public.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// Evaluates the admission rules once per request.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    public_paths: PublicPaths,
    api_key: Option<ApiKey>,
    jwt: Option<JwtVerifier>,
}

impl AuthGate {
    pub fn new(public_paths: PublicPaths) -> Self {
        Self {
            public_paths,
            api_key: None,
            jwt: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_jwt(mut self, jwt: Option<JwtVerifier>) -> Self {
        self.jwt = jwt;
        self
    }

    pub fn jwt_enabled(&self) -> bool {
        self.jwt.is_some()
    }

    pub fn api_key_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Classify a request. Rules are evaluated in order and the first match
    /// wins.
    pub fn evaluate(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<AuthContext, AuthError> {
        if self.public_paths.matches(path) {
            return Ok(AuthContext::public());
        }

        if let (Some(api_key), Some(presented)) = (
            self.api_key.as_ref(),
            headers.get(X_API_KEY_HEADER).and_then(|v| v.to_str().ok()),
        ) {
            if api_key.matches(presented) {
                debug!(path = %path, "Admitted with API key");
                return Ok(AuthContext::api_key());
            }
            debug!(path = %path, "API key mismatch");
        }

        if let Some(token) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
        {
            match self.jwt.as_ref() {
                Some(verifier) => match verifier.verify(token) {
                    Ok(claims) => {
                        debug!(path = %path, "Admitted with bearer token");
                        return Ok(AuthContext::jwt(claims));
                    }
                    Err(e) => {
                        warn!(path = %path, method = %method, error = %e, "Invalid bearer token");
                    }
                },
                None => debug!("Bearer token presented but JWT auth is not configured"),
            }
        }

        if is_read_method(method) {
            return Ok(AuthContext::anonymous_read());
        }

        Err(AuthError::authentication_required(
            "Please provide a valid API key or JWT token",
        ))
    }
}

fn is_read_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuthMethod;
    use crate::jwt::tests::sign;
    use http::HeaderValue;
    use serde_json::json;

    fn gate() -> AuthGate {
        AuthGate::new(PublicPaths::new(["/health", "/metrics", "/content/featured"]))
            .with_api_key(ApiKey::new("key-123"))
            .with_jwt(JwtVerifier::new("jwt-secret"))
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_public_paths() {
        let paths = PublicPaths::new(["/health", "/content/featured/"]);
        assert!(paths.matches("/health"));
        assert!(paths.matches("/health/live"));
        assert!(!paths.matches("/healthcheck"));
        assert!(paths.matches("/content/featured"));
        assert!(!paths.matches("/content"));
    }

    #[test]
    fn test_public_path_short_circuits() {
        let ctx = gate()
            .evaluate(&Method::POST, "/health", &headers(&[("x-api-key", "key-123")]))
            .unwrap();
        assert_eq!(ctx.method, AuthMethod::Public);
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_api_key() {
        let ctx = gate()
            .evaluate(&Method::DELETE, "/cache", &headers(&[("x-api-key", "key-123")]))
            .unwrap();
        assert_eq!(ctx, AuthContext::api_key());

        let err = gate()
            .evaluate(&Method::DELETE, "/cache", &headers(&[("x-api-key", "wrong")]))
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationRequired { .. }));
    }

    #[test]
    fn test_valid_jwt() {
        let token = sign("jwt-secret", &json!({"sub": "editor"}));
        let ctx = gate()
            .evaluate(
                &Method::POST,
                "/content/batch",
                &headers(&[("authorization", &format!("Bearer {token}"))]),
            )
            .unwrap();
        assert_eq!(ctx.method, AuthMethod::Jwt);
        assert_eq!(ctx.claims().unwrap()["sub"], "editor");
    }

    #[test]
    fn test_invalid_jwt_degrades_to_anonymous_read_on_get() {
        let bad = headers(&[("authorization", "Bearer garbage")]);

        let ctx = gate().evaluate(&Method::GET, "/search", &bad).unwrap();
        assert_eq!(ctx.method, AuthMethod::AnonymousRead);
        assert!(!ctx.is_authenticated());

        assert!(gate().evaluate(&Method::POST, "/search", &bad).is_err());
    }

    #[test]
    fn test_anonymous_write_is_rejected() {
        let err = gate()
            .evaluate(&Method::POST, "/cache/invalidate", &HeaderMap::new())
            .unwrap_err();
        assert!(err.to_string().starts_with("Authentication required"));
    }

    #[test]
    fn test_unconfigured_secrets_never_authenticate() {
        let gate = AuthGate::new(PublicPaths::default());
        let token = sign("anything", &json!({}));
        let h = headers(&[
            ("x-api-key", ""),
            ("authorization", &format!("Bearer {token}")),
        ]);
        assert_eq!(
            gate.evaluate(&Method::GET, "/preview/node/1", &h).unwrap(),
            AuthContext::anonymous_read()
        );
        assert!(gate.evaluate(&Method::PUT, "/engine-proxy/node/1", &h).is_err());
    }
}
