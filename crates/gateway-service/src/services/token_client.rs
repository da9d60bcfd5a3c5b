//! End-user token issuance against the realm token endpoint.
//!
//! Implements the resource-owner password grant (login) and the refresh
//! grant. The gateway never mints tokens itself; it relays the grant and
//! returns what the identity provider issued.

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Token issuance errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenIssueError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid or expired refresh token")]
    InvalidRefreshToken,

    /// Transport failure, timeout, or 5xx.
    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),

    /// Any other non-success status (client misconfiguration).
    #[error("token endpoint rejected the request with status {0}")]
    Rejected(u16),

    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// Tokens returned by a successful grant.
#[derive(Clone, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// OAuth error body (`{"error": "invalid_grant", ...}`).
#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// Source of end-user tokens.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Password grant.
    async fn password_grant(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IssuedTokens, TokenIssueError>;

    /// Refresh grant.
    async fn refresh_grant(&self, refresh_token: &SecretString)
        -> Result<IssuedTokens, TokenIssueError>;
}

/// HTTP implementation of [`TokenIssuer`].
#[derive(Clone)]
pub struct TokenClient {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: Option<SecretString>,
}

impl TokenClient {
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: Option<SecretString>,
        http_timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(target: "gw.token_client", error = %e, "Failed to build HTTP client with custom config, using defaults");
                Client::new()
            });

        Self {
            client,
            token_url,
            client_id,
            client_secret,
        }
    }

    async fn grant(
        &self,
        grant_type: &'static str,
        params: &[(&str, &str)],
        rejected: TokenIssueError,
    ) -> Result<IssuedTokens, TokenIssueError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant_type),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }
        form.extend_from_slice(params);

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gw.token_client", grant_type, error = %e, "Token request failed");
                TokenIssueError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            let tokens: IssuedTokens = response.json().await.map_err(|e| {
                error!(target: "gw.token_client", error = %e, "Failed to parse token response");
                TokenIssueError::MalformedResponse(e.to_string())
            })?;
            debug!(target: "gw.token_client", grant_type, expires_in = tokens.expires_in, "Tokens issued");
            return Ok(tokens);
        }

        if status.is_server_error() {
            warn!(target: "gw.token_client", grant_type, status = %status, "Token endpoint returned server error");
            return Err(TokenIssueError::Unavailable(format!("status {status}")));
        }

        if status == StatusCode::UNAUTHORIZED {
            debug!(target: "gw.token_client", grant_type, "Grant rejected");
            return Err(rejected);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST {
            let is_invalid_grant = serde_json::from_str::<OAuthErrorBody>(&body)
                .is_ok_and(|parsed| parsed.error == "invalid_grant");
            if is_invalid_grant {
                debug!(target: "gw.token_client", grant_type, "Grant rejected (invalid_grant)");
                return Err(rejected);
            }
        }

        warn!(
            target: "gw.token_client",
            grant_type,
            status = %status,
            body = %body,
            "Unexpected token endpoint response"
        );
        Err(TokenIssueError::Rejected(status.as_u16()))
    }
}

#[async_trait]
impl TokenIssuer for TokenClient {
    #[instrument(skip(self, password))]
    async fn password_grant(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IssuedTokens, TokenIssueError> {
        self.grant(
            "password",
            &[("username", username), ("password", password.expose_secret())],
            TokenIssueError::InvalidCredentials,
        )
        .await
    }

    #[instrument(skip_all)]
    async fn refresh_grant(
        &self,
        refresh_token: &SecretString,
    ) -> Result<IssuedTokens, TokenIssueError> {
        self.grant(
            "refresh_token",
            &[("refresh_token", refresh_token.expose_secret())],
            TokenIssueError::InvalidRefreshToken,
        )
        .await
    }
}
