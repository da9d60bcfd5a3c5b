//! Wiremock-backed identity provider
//!
//! Serves a realm's certs and token endpoints so the verifier, token client,
//! and full router can run against real HTTP without Keycloak.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Realm used by the mock authority unless told otherwise.
pub const TEST_REALM: &str = "iam";

/// Client id the mock token endpoint expects.
pub const TEST_CLIENT_ID: &str = "iam-frontend";

/// Mock identity provider for one realm.
///
/// # Example
/// ```rust,ignore
/// let authority = MockAuthority::start().await;
/// authority.mount_jwks(&[TEST_KEY_1]).await;
/// let verifier = TokenVerifier::new(
///     Arc::new(KeySetCache::new(authority.jwks_url(), Duration::from_secs(2))),
///     settings,
/// );
/// ```
pub struct MockAuthority {
    server: MockServer,
    realm: String,
}

impl MockAuthority {
    pub async fn start() -> Self {
        Self::start_for_realm(TEST_REALM).await
    }

    pub async fn start_for_realm(realm: &str) -> Self {
        Self {
            server: MockServer::start().await,
            realm: realm.to_string(),
        }
    }

    /// Base URL, as configured in `KEYCLOAK_URL`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    fn certs_path(&self) -> String {
        format!("/realms/{}/protocol/openid-connect/certs", self.realm)
    }

    fn token_path(&self) -> String {
        format!("/realms/{}/protocol/openid-connect/token", self.realm)
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.uri(), self.certs_path())
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.uri(), self.token_path())
    }

    /// Publish `keys` at the certs endpoint.
    pub async fn mount_jwks(&self, keys: &[TestSigningKey]) {
        self.mount_jwks_document(jwks_document(keys)).await;
    }

    /// Publish an arbitrary certs document.
    pub async fn mount_jwks_document(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Make the certs endpoint fail with `status`.
    pub async fn mount_jwks_failure(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(self.certs_path()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answer the password grant for `username` with `access_token`.
    pub async fn mount_password_grant(&self, username: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains(format!("username={username}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
            .mount(&self.server)
            .await;
    }

    /// Answer the refresh grant for `refresh_token` with `access_token`.
    pub async fn mount_refresh_grant(&self, refresh_token: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
            .mount(&self.server)
            .await;
    }

    /// Reject every grant the way the realm rejects bad credentials.
    ///
    /// Mount after any accepting grants; wiremock matches in mount order.
    pub async fn mount_grant_rejection(&self) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the certs endpoint has received.
    pub async fn jwks_fetch_count(&self) -> usize {
        let certs_path = self.certs_path();
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == certs_path)
            .count()
    }
}

/// Token endpoint success body with a fixed refresh token.
pub fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": "test-refresh-token",
        "token_type": "Bearer",
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "scope": "profile email"
    })
}
