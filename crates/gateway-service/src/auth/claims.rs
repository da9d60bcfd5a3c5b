//! Claim schema for realm access tokens and the identity context built from it.
//!
//! Claims are read through a fixed schema instead of ad hoc JSON lookups.
//! Optional claims default to `None`, and a token without `realm_access`
//! yields an empty role set rather than an error. The subject and email are
//! redacted in Debug output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// `realm_access` claim: realm-level role assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    /// Realm role names. `null` or absent reads as empty.
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// Fields the gateway reads from a verified access token.
#[derive(Clone, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id). Required.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds). Required.
    pub exp: i64,

    /// Issued-at timestamp, when present.
    #[serde(default)]
    pub iat: Option<i64>,

    /// Login name.
    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Nested realm role claim; absent for tokens without realm roles.
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("preferred_username", &self.preferred_username)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("name", &self.name)
            .field("realm_access", &self.realm_access)
            .finish()
    }
}

impl TokenClaims {
    /// Realm role names, empty when the nested claim is missing.
    pub fn realm_roles(&self) -> BTreeSet<String> {
        self.realm_access
            .as_ref()
            .and_then(|access| access.roles.as_ref())
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Authenticated identity for the lifetime of one request.
///
/// Built only from claims whose signature has been verified. Immutable.
#[derive(Clone)]
pub struct IdentityContext {
    subject_id: String,
    username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    roles: BTreeSet<String>,
    claims: Map<String, Value>,
    expires_at: i64,
}

impl fmt::Debug for IdentityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityContext")
            .field("subject_id", &"[REDACTED]")
            .field("username", &self.username)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("roles", &self.roles)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl IdentityContext {
    /// Project a verified claim map into an identity context.
    ///
    /// Callers must only pass claims that came out of signature
    /// verification.
    ///
    /// # Errors
    ///
    /// Returns the serde error when required claims are missing or mistyped.
    pub fn from_verified_claims(claims: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let typed: TokenClaims = serde_json::from_value(Value::Object(claims.clone()))?;
        let roles = typed.realm_roles();

        Ok(Self {
            subject_id: typed.sub,
            username: typed.preferred_username,
            email: typed.email,
            name: typed.name,
            roles,
            claims,
            expires_at: typed.exp,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Realm roles in sorted order.
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// The full verified claim map, including claims outside the fixed schema.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn claim_map(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_projects_keycloak_shaped_claims() {
        let ctx = IdentityContext::from_verified_claims(claim_map(serde_json::json!({
            "sub": "5f1c9a5e-user",
            "exp": 1_900_000_000,
            "iat": 1_899_999_700,
            "preferred_username": "john",
            "email": "john@example.com",
            "name": "John Doe",
            "azp": "iam-frontend",
            "realm_access": {"roles": ["user-manager", "offline_access"]}
        })))
        .unwrap();

        assert_eq!(ctx.subject_id(), "5f1c9a5e-user");
        assert_eq!(ctx.username(), Some("john"));
        assert_eq!(ctx.email(), Some("john@example.com"));
        assert_eq!(ctx.name(), Some("John Doe"));
        assert_eq!(ctx.expires_at(), 1_900_000_000);
        assert!(ctx.roles().contains("user-manager"));
        assert!(ctx.roles().contains("offline_access"));
        // Claims outside the schema stay reachable
        assert_eq!(ctx.claims()["azp"], "iam-frontend");
    }

    #[test]
    fn test_missing_realm_access_yields_empty_roles() {
        let ctx = IdentityContext::from_verified_claims(claim_map(serde_json::json!({
            "sub": "u", "exp": 1
        })))
        .unwrap();
        assert!(ctx.roles().is_empty());
        assert!(ctx.username().is_none());
    }

    #[test]
    fn test_null_or_rolesless_realm_access_yields_empty_roles() {
        for realm_access in [
            serde_json::json!(null),
            serde_json::json!({}),
            serde_json::json!({"roles": null}),
        ] {
            let ctx = IdentityContext::from_verified_claims(claim_map(serde_json::json!({
                "sub": "u", "exp": 1, "realm_access": realm_access
            })))
            .unwrap();
            assert!(ctx.roles().is_empty());
        }
    }

    #[test]
    fn test_missing_sub_is_error() {
        assert!(IdentityContext::from_verified_claims(claim_map(serde_json::json!({
            "exp": 1
        })))
        .is_err());
    }

    #[test]
    fn test_mistyped_roles_is_error() {
        assert!(IdentityContext::from_verified_claims(claim_map(serde_json::json!({
            "sub": "u", "exp": 1, "realm_access": {"roles": "realm-admin"}
        })))
        .is_err());
    }

    #[test]
    fn test_debug_redacts_subject_and_email() {
        let ctx = IdentityContext::from_verified_claims(claim_map(serde_json::json!({
            "sub": "secret-user-id",
            "exp": 1,
            "email": "hidden@example.com"
        })))
        .unwrap();

        let debug_str = format!("{ctx:?}");
        assert!(!debug_str.contains("secret-user-id"));
        assert!(!debug_str.contains("hidden@example.com"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_token_claims_debug_redacts_subject() {
        let claims: TokenClaims =
            serde_json::from_value(serde_json::json!({"sub": "abc-123", "exp": 5})).unwrap();
        assert!(!format!("{claims:?}").contains("abc-123"));
    }
}
