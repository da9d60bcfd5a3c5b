//! Upward authentication boundary: login, refresh, authenticate, authorize.
//!
//! Freshly issued access tokens are run through the same verifier as inbound
//! bearer tokens, so the identity returned from `login` is never read from
//! unverified claims.

use crate::auth::claims::IdentityContext;
use crate::auth::guard::{require_role, AccessDenied, AdminGrant};
use crate::auth::jwt::{TokenVerifier, VerifyError};
use crate::services::token_client::{IssuedTokens, TokenIssueError, TokenIssuer};
use common::secret::SecretString;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Login or refresh failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error(transparent)]
    Issue(#[from] TokenIssueError),

    /// The provider issued a token the gateway does not accept.
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// Tokens plus the verified identity they carry.
#[derive(Clone)]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub identity: IdentityContext,
}

impl fmt::Debug for LoginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginOutcome")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("identity", &self.identity)
            .finish()
    }
}

pub struct AuthService {
    verifier: Arc<TokenVerifier>,
    issuer: Arc<dyn TokenIssuer>,
}

impl AuthService {
    pub fn new(verifier: Arc<TokenVerifier>, issuer: Arc<dyn TokenIssuer>) -> Self {
        Self { verifier, issuer }
    }

    /// Exchange username and password for tokens.
    ///
    /// # Errors
    ///
    /// - `Issue(InvalidCredentials)` for a rejected password grant
    /// - `Issue(Unavailable)` when the token endpoint cannot be reached
    /// - `Verify(_)` when the issued access token fails verification
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, AuthError> {
        let result = self.issuer.password_grant(username, password).await;
        let tokens = result.inspect_err(|e| {
            info!(target: "gw.auth_service", username = %username, reason = %e, "Login failed");
        })?;

        let outcome = self.complete(tokens).await?;
        info!(
            target: "gw.auth_service",
            username = ?outcome.identity.username(),
            role_count = outcome.identity.roles().len(),
            "Login succeeded"
        );
        Ok(outcome)
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// - `Issue(InvalidRefreshToken)` for an expired or revoked refresh token
    /// - `Issue(Unavailable)` when the token endpoint cannot be reached
    /// - `Verify(_)` when the issued access token fails verification
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<LoginOutcome, AuthError> {
        let tokens = self.issuer.refresh_grant(refresh_token).await?;
        self.complete(tokens).await
    }

    /// Verify an Authorization header value.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` of the first failed check.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<IdentityContext, VerifyError> {
        self.verifier.authenticate(authorization).await
    }

    /// Verify an Authorization header as received, before any UTF-8 check.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` of the first failed check.
    pub async fn authenticate_raw(
        &self,
        authorization: Option<&[u8]>,
    ) -> Result<IdentityContext, VerifyError> {
        self.verifier.authenticate_raw(authorization).await
    }

    /// Require `role` on an authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` when the role is absent.
    pub fn authorize(
        &self,
        context: &IdentityContext,
        role: &str,
    ) -> Result<AdminGrant, AccessDenied> {
        require_role(context, role)
    }

    async fn complete(&self, tokens: IssuedTokens) -> Result<LoginOutcome, AuthError> {
        let identity = self
            .verifier
            .verify_token(&tokens.access_token)
            .await
            .inspect_err(|e| {
                warn!(
                    target: "gw.auth_service",
                    reason = e.label(),
                    "Issued access token failed verification"
                );
            })?;

        Ok(LoginOutcome {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            identity,
        })
    }
}
