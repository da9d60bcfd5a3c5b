//! Builder patterns for test tokens
//!
//! Produces realm-style access token claims and signs them with the fixture
//! keys, plus deliberately broken tokens for negative tests.

use crate::crypto_fixtures::TestSigningKey;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Builder for realm access tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_roles(&["realm-admin"])
///     .expires_in(300)
///     .sign(&TEST_KEY_1);
/// ```
pub struct TestTokenBuilder {
    sub: String,
    username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    roles: Option<Vec<String>>,
    audience: Option<String>,
    exp: i64,
    iat: i64,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Valid for an hour, subject "test-subject", no roles.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            username: None,
            email: None,
            name: None,
            roles: Some(Vec::new()),
            audience: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            extra: Map::new(),
        }
    }

    /// Set username, email, and display name from `username`.
    pub fn for_user(mut self, username: &str) -> Self {
        self.sub = format!("sub-{username}");
        self.username = Some(username.to_string());
        self.email = Some(format!("{username}@example.com"));
        self.name = Some(username.to_string());
        self
    }

    pub fn with_subject(mut self, sub: &str) -> Self {
        self.sub = sub.to_string();
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = Some(roles.iter().map(ToString::to_string).collect());
        self
    }

    /// Omit the `realm_access` claim entirely.
    pub fn without_realm_access(mut self) -> Self {
        self.roles = None;
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = Some(audience.to_string());
        self
    }

    /// Set expiration in seconds from now; negative values are in the past.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Add or replace an arbitrary claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value.
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("typ".to_string(), json!("Bearer"));
        if let Some(username) = self.username {
            claims.insert("preferred_username".to_string(), json!(username));
        }
        if let Some(email) = self.email {
            claims.insert("email".to_string(), json!(email));
        }
        if let Some(name) = self.name {
            claims.insert("name".to_string(), json!(name));
        }
        if let Some(roles) = self.roles {
            claims.insert("realm_access".to_string(), json!({ "roles": roles }));
        }
        if let Some(audience) = self.audience {
            claims.insert("aud".to_string(), json!(audience));
        }
        claims.extend(self.extra);
        Value::Object(claims)
    }

    /// Sign with RS256 under the key's id.
    pub fn sign(self, key: &TestSigningKey) -> String {
        self.sign_with(key, Algorithm::RS256)
    }

    /// Sign with an RSA algorithm of choice under the key's id.
    pub fn sign_with(self, key: &TestSigningKey, alg: Algorithm) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(key.kid.to_string());
        encode(&header, &self.build(), &key.encoding_key()).expect("signing should succeed")
    }

    /// HS256 token keyed with `secret`, for algorithm-confusion tests.
    pub fn sign_hs256(self, kid: &str, secret: &[u8]) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        encode(&header, &self.build(), &EncodingKey::from_secret(secret))
            .expect("signing should succeed")
    }

    /// `alg: none` token with an empty signature.
    pub fn unsigned(self, kid: &str) -> String {
        let header = json!({ "alg": "none", "typ": "JWT", "kid": kid });
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.build().to_string())
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the payload of a signed token, keeping header and signature.
pub fn tamper_payload(token: &str, claims: &Value) -> String {
    let mut parts = token.split('.');
    let header = parts.next().unwrap_or_default();
    let _payload = parts.next();
    let signature = parts.next().unwrap_or_default();
    format!(
        "{header}.{}.{signature}",
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_fixtures::TEST_KEY_1;

    #[test]
    fn test_default_claims() {
        let claims = TestTokenBuilder::new().build();
        assert_eq!(claims["sub"], "test-subject");
        assert_eq!(claims["realm_access"]["roles"], json!([]));
        assert!(claims.get("aud").is_none());
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_user_and_roles() {
        let claims = TestTokenBuilder::new()
            .for_user("alice")
            .with_roles(&["realm-admin", "viewer"])
            .build();
        assert_eq!(claims["preferred_username"], "alice");
        assert_eq!(claims["email"], "alice@example.com");
        assert_eq!(claims["realm_access"]["roles"], json!(["realm-admin", "viewer"]));
    }

    #[test]
    fn test_without_realm_access() {
        let claims = TestTokenBuilder::new().without_realm_access().build();
        assert!(claims.get("realm_access").is_none());
    }

    #[test]
    fn test_signed_token_has_kid() {
        let token = TestTokenBuilder::new().sign(&TEST_KEY_1);
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("test-key-1"));
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn test_unsigned_token_shape() {
        let token = TestTokenBuilder::new().unsigned("test-key-1");
        assert_eq!(token.split('.').count(), 3);
        assert!(token.ends_with('.'));
    }
}
