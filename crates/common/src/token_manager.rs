//! Admin credential provider with lazy refresh.
//!
//! The gateway talks to the identity provider's admin REST surface with a
//! privileged service credential that is distinct from end-user tokens. That
//! credential is owned by a [`CredentialProvider`] injected into the admin
//! client, so there is no process-wide token slot and tests can swap in
//! [`mock::StaticCredentialProvider`].
//!
//! # Refresh policy
//!
//! [`PasswordGrantProvider`] acquires a token on first use and caches it with
//! its expiry. Subsequent calls reuse the cached value while more than
//! [`CLOCK_DRIFT_MARGIN_SECS`] of lifetime remain; otherwise the token is
//! re-acquired. There is no background task. Two callers racing past an
//! expired token both fetch a new one and the last write wins, which costs a
//! round trip but never leaves a torn value.
//!
//! # Security
//!
//! - The admin password and the access token are `SecretString`
//! - Acquisition events are logged without values
//! - Error bodies from the token endpoint are only logged at trace level

use crate::secret::{ExposeSecret, SecretString};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Remaining lifetime below which a cached credential is re-acquired.
///
/// Covers clock differences with the identity provider and the latency of
/// the admin call that will carry the token.
pub const CLOCK_DRIFT_MARGIN_SECS: i64 = 30;

/// Realm that holds the provider's administrator accounts.
pub const DEFAULT_ADMIN_REALM: &str = "master";

/// Built-in public client used for admin password grants.
pub const DEFAULT_ADMIN_CLIENT_ID: &str = "admin-cli";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while obtaining the admin credential.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// Transport failure, timeout, or server error from the token endpoint.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the token endpoint (401, 400).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response could not be parsed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// HTTP client could not be constructed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TokenError {
    /// Short, bounded label for metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            TokenError::HttpError(_) => "http",
            TokenError::AuthenticationRejected(_) => "auth_rejected",
            TokenError::InvalidResponse(_) => "invalid_response",
            TokenError::Configuration(_) => "configuration",
        }
    }
}

// =============================================================================
// Provider seam
// =============================================================================

/// Source of the privileged credential used for admin calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a currently valid access token, acquiring one if needed.
    async fn access_token(&self) -> Result<SecretString, TokenError>;

    /// Drop any cached token so the next call re-acquires.
    ///
    /// Called when the admin surface rejects a token the provider still
    /// considered valid (revoked session, realm key rotation).
    async fn invalidate(&self);
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for [`PasswordGrantProvider`].
#[derive(Clone)]
pub struct PasswordGrantConfig {
    /// Identity provider base URL, e.g. `http://localhost:8080`.
    pub base_url: String,

    /// Realm the admin account lives in.
    pub realm: String,

    /// OAuth client used for the grant.
    pub client_id: String,

    /// Admin account username.
    pub username: String,

    /// Admin account password.
    pub password: SecretString,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for PasswordGrantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGrantConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl PasswordGrantConfig {
    /// Admin grant against the `master` realm through `admin-cli`.
    #[must_use]
    pub fn new(base_url: String, username: String, password: SecretString) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            realm: DEFAULT_ADMIN_REALM.to_string(),
            client_id: DEFAULT_ADMIN_CLIENT_ID.to_string(),
            username,
            password,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the realm holding the admin account.
    #[must_use]
    pub fn with_realm(mut self, realm: String) -> Self {
        self.realm = realm;
        self
    }

    /// Set the OAuth client used for the grant.
    #[must_use]
    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.realm
        )
    }
}

// =============================================================================
// Refresh observation
// =============================================================================

/// Outcome of one credential acquisition, handed to a [`TokenRefreshCallback`].
#[derive(Debug, Clone, Copy)]
pub struct TokenRefreshEvent {
    pub success: bool,
    pub error_category: Option<&'static str>,
    pub duration: Duration,
}

/// Hook for recording acquisition metrics from the owning service.
pub type TokenRefreshCallback = Arc<dyn Fn(TokenRefreshEvent) + Send + Sync>;

// =============================================================================
// OAuth Response Types
// =============================================================================

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: u64,
}

impl std::fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// =============================================================================
// Password grant provider
// =============================================================================

struct CachedCredential {
    token: SecretString,
    expires_at: i64,
}

impl CachedCredential {
    fn is_fresh_at(&self, now: i64) -> bool {
        self.expires_at - now > CLOCK_DRIFT_MARGIN_SECS
    }
}

/// Lazily acquires the admin credential with a resource-owner password grant.
pub struct PasswordGrantProvider {
    config: PasswordGrantConfig,
    http_client: reqwest::Client,
    cached: RwLock<Option<CachedCredential>>,
    on_refresh: Option<TokenRefreshCallback>,
}

impl std::fmt::Debug for PasswordGrantProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordGrantProvider")
            .field("config", &self.config)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl PasswordGrantProvider {
    /// Build a provider. No network call is made until the first use.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: PasswordGrantConfig) -> Result<Self, TokenError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            cached: RwLock::new(None),
            on_refresh: None,
        })
    }

    /// Attach a callback invoked after every acquisition attempt.
    #[must_use]
    pub fn with_refresh_callback(mut self, callback: TokenRefreshCallback) -> Self {
        self.on_refresh = Some(callback);
        self
    }

    async fn acquire_and_store(&self) -> Result<SecretString, TokenError> {
        let started = Instant::now();
        let result = acquire_token(&self.config, &self.http_client).await;

        if let Some(callback) = &self.on_refresh {
            callback(TokenRefreshEvent {
                success: result.is_ok(),
                error_category: result.as_ref().err().map(TokenError::category),
                duration: started.elapsed(),
            });
        }

        let (token, expires_at) = result?;
        let mut slot = self.cached.write().await;
        *slot = Some(CachedCredential {
            token: token.clone(),
            expires_at,
        });

        info!(
            target: "common.token_manager",
            client_id = %self.config.client_id,
            realm = %self.config.realm,
            "Admin credential acquired"
        );
        Ok(token)
    }
}

#[async_trait]
impl CredentialProvider for PasswordGrantProvider {
    #[instrument(skip_all)]
    async fn access_token(&self) -> Result<SecretString, TokenError> {
        {
            let slot = self.cached.read().await;
            if let Some(cached) = slot.as_ref() {
                if cached.is_fresh_at(chrono::Utc::now().timestamp()) {
                    trace!(target: "common.token_manager", "Reusing cached admin credential");
                    return Ok(cached.token.clone());
                }
                debug!(target: "common.token_manager", "Admin credential near expiry, re-acquiring");
            }
        }

        self.acquire_and_store().await
    }

    async fn invalidate(&self) {
        let mut slot = self.cached.write().await;
        if slot.take().is_some() {
            debug!(target: "common.token_manager", "Cached admin credential invalidated");
        }
    }
}

/// Perform one password grant.
///
/// Returns the token and its expiration time (Unix timestamp).
#[instrument(skip_all)]
async fn acquire_token(
    config: &PasswordGrantConfig,
    http_client: &reqwest::Client,
) -> Result<(SecretString, i64), TokenError> {
    let url = config.token_url();

    debug!(
        target: "common.token_manager",
        client_id = %config.client_id,
        url = %url,
        "Requesting admin credential"
    );

    let form_body = [
        ("grant_type", "password"),
        ("client_id", config.client_id.as_str()),
        ("username", config.username.as_str()),
        ("password", config.password.expose_secret()),
    ];

    let response = http_client
        .post(&url)
        .form(&form_body)
        .send()
        .await
        .map_err(|e| {
            debug!(target: "common.token_manager", error = %e, "HTTP request failed");
            TokenError::HttpError(e.to_string())
        })?;

    let status = response.status();

    if status.is_success() {
        let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
            warn!(target: "common.token_manager", error = %e, "Failed to parse token response");
            TokenError::InvalidResponse(e.to_string())
        })?;

        let now = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(token_response.expires_in).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(lifetime);

        debug!(
            target: "common.token_manager",
            expires_in_secs = token_response.expires_in,
            "Admin credential issued"
        );

        Ok((SecretString::from(token_response.access_token), expires_at))
    } else if status.as_u16() == 401 || status.as_u16() == 400 {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "common.token_manager", error = %e, "Failed to read error response body");
            "<failed to read body>".to_string()
        });
        warn!(
            target: "common.token_manager",
            status = %status,
            "Admin credential rejected by identity provider"
        );
        trace!(
            target: "common.token_manager",
            body = %body,
            "Admin credential rejection body"
        );
        Err(TokenError::AuthenticationRejected(format!("Status {status}")))
    } else if status.is_server_error() {
        warn!(
            target: "common.token_manager",
            status = %status,
            "Identity provider returned server error"
        );
        Err(TokenError::HttpError(format!("Server error: {status}")))
    } else {
        warn!(
            target: "common.token_manager",
            status = %status,
            "Unexpected response from token endpoint"
        );
        Err(TokenError::HttpError(format!("Unexpected status: {status}")))
    }
}

// =============================================================================
// Test double
// =============================================================================

/// In-memory credential providers for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, CredentialProvider, SecretString, TokenError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out a fixed token, or fails every time.
    pub struct StaticCredentialProvider {
        token: Option<String>,
        calls: AtomicUsize,
        invalidations: AtomicUsize,
    }

    impl StaticCredentialProvider {
        /// Always returns `token`.
        #[must_use]
        pub fn with_token(token: &str) -> Self {
            Self {
                token: Some(token.to_string()),
                calls: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
            }
        }

        /// Always fails with `AuthenticationRejected`.
        #[must_use]
        pub fn failing() -> Self {
            Self {
                token: None,
                calls: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
            }
        }

        /// Number of `access_token` calls so far.
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Number of `invalidate` calls so far.
        #[must_use]
        pub fn invalidation_count(&self) -> usize {
            self.invalidations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialProvider for StaticCredentialProvider {
        async fn access_token(&self) -> Result<SecretString, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.token {
                Some(token) => Ok(SecretString::from(token.as_str())),
                None => Err(TokenError::AuthenticationRejected(
                    "Status 401 Unauthorized".to_string(),
                )),
            }
        }

        async fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";

    fn test_config(base_url: &str) -> PasswordGrantConfig {
        PasswordGrantConfig::new(
            base_url.to_string(),
            "admin".to_string(),
            SecretString::from("admin-password"),
        )
        .with_http_timeout(Duration::from_millis(500))
    }

    fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": expires_in,
            "refresh_token": "ignored"
        })
    }

    // =========================================================================
    // Configuration Tests
    // =========================================================================

    #[test]
    fn test_config_defaults() {
        let config = PasswordGrantConfig::new(
            "http://localhost:8080/".to_string(),
            "admin".to_string(),
            SecretString::from("secret"),
        );

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.realm, "master");
        assert_eq!(config.client_id, "admin-cli");
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(
            config.token_url(),
            "http://localhost:8080/realms/master/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_config_builder() {
        let config = test_config("http://kc")
            .with_realm("ops".to_string())
            .with_client_id("ops-cli".to_string())
            .with_http_timeout(Duration::from_secs(3));

        assert_eq!(config.realm, "ops");
        assert_eq!(config.client_id, "ops-cli");
        assert_eq!(config.http_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = PasswordGrantConfig::new(
            "http://kc".to_string(),
            "admin".to_string(),
            SecretString::from("super-secret-value"),
        );

        let debug_str = format!("{config:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret-value"));
    }

    #[test]
    fn test_oauth_response_debug_redacts_token() {
        let response = OAuthTokenResponse {
            access_token: "super-secret-access-token".to_string(),
            expires_in: 60,
        };

        let debug_str = format!("{response:?}");
        assert!(!debug_str.contains("super-secret-access-token"));
        assert!(debug_str.contains("60"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TokenError::HttpError(String::new()).category(), "http");
        assert_eq!(
            TokenError::AuthenticationRejected(String::new()).category(),
            "auth_rejected"
        );
        assert_eq!(
            TokenError::InvalidResponse(String::new()).category(),
            "invalid_response"
        );
    }

    // =========================================================================
    // Acquisition Tests
    // =========================================================================

    #[tokio::test]
    async fn test_first_use_acquires_with_password_grant() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains("client_id=admin-cli"))
            .and(body_string_contains("username=admin"))
            .and(body_string_contains("password=admin-password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("admin-token", 60)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        let token = provider.access_token().await.unwrap();

        assert_eq!(token.expose_secret(), "admin-token");
    }

    #[tokio::test]
    async fn test_cached_credential_is_reused() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("cached", 300)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        for _ in 0..3 {
            assert_eq!(provider.access_token().await.unwrap().expose_secret(), "cached");
        }
    }

    #[tokio::test]
    async fn test_short_lived_credential_is_reacquired() {
        let mock_server = MockServer::start().await;

        // Lifetime inside the drift margin is never considered fresh
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("short", 10)))
            .expect(2)
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        provider.access_token().await.unwrap();
        provider.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_forces_reacquire() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t", 300)))
            .expect(2)
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        provider.access_token().await.unwrap();
        provider.invalidate().await;
        provider.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_401_is_authentication_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"error": "invalid_grant"}"#),
            )
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        let err = provider.access_token().await.unwrap_err();

        assert!(matches!(err, TokenError::AuthenticationRejected(_)));
        // The body never leaks into the error message
        assert!(!err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_5xx_is_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        assert!(matches!(
            provider.access_token().await,
            Err(TokenError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_fields_is_invalid_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"token_type": "Bearer"})),
            )
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        assert!(matches!(
            provider.access_token().await,
            Err(TokenError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_http_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("late", 300))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri())).unwrap();
        assert!(matches!(
            provider.access_token().await,
            Err(TokenError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_callback_sees_success_and_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let failures = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&failures);
        let provider = PasswordGrantProvider::new(test_config(&mock_server.uri()))
            .unwrap()
            .with_refresh_callback(Arc::new(move |event: TokenRefreshEvent| {
                if !event.success && event.error_category == Some("auth_rejected") {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }));

        let _ = provider.access_token().await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // Mock provider
    // =========================================================================

    #[tokio::test]
    async fn test_static_provider_counts_calls() {
        let provider = mock::StaticCredentialProvider::with_token("fixed");
        assert_eq!(provider.access_token().await.unwrap().expose_secret(), "fixed");
        provider.invalidate().await;
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.invalidation_count(), 1);

        let failing = mock::StaticCredentialProvider::failing();
        assert!(failing.access_token().await.is_err());
    }
}
