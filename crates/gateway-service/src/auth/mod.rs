//! Token verification and authorization.
//!
//! # Components
//!
//! - `jwks` - realm key set cache, refreshed lazily on key-id misses
//! - `jwt` - bearer token verification against the cached key set
//! - `claims` - claim schema and the per-request identity context
//! - `guard` - role checks that gate privileged operations

pub mod claims;
pub mod guard;
pub mod jwks;
pub mod jwt;

pub use claims::IdentityContext;
pub use guard::{require_role, AccessDenied, AdminGrant};
pub use jwks::KeySetCache;
pub use jwt::{TokenVerifier, VerifyError};
