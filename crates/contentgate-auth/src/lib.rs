//! Request admission for the contentgate gateway.
//!
//! The [`AuthGate`] classifies every inbound request exactly once:
//!
//! 1. public path → admitted, unauthenticated
//! 2. valid `X-API-Key` → authenticated as the API-key principal
//! 3. valid `Authorization: Bearer` JWT → authenticated with decoded claims
//! 4. read method → admitted as anonymous read
//! 5. anything else → [`AuthError::AuthenticationRequired`]
//!
//! An invalid bearer token does not reject by itself; it falls through to
//! the anonymous-read rule.

pub mod api_key;
pub mod context;
pub mod error;
pub mod gate;
pub mod jwt;

pub use api_key::{ApiKey, X_API_KEY_HEADER};
pub use context::{AuthContext, AuthMethod, Principal};
pub use error::AuthError;
pub use gate::{AuthGate, PublicPaths};
pub use jwt::JwtVerifier;
