//! Bearer token verification against the realm key set.
//!
//! Verification is split into an untrusted structural pass and a
//! cryptographic pass. The structural pass ([`common::jwt`]) reads the
//! declared `kid`, `alg`, and `exp`; its output is only used to reject a
//! token or to choose which key to try. Claims are read exclusively from the
//! cryptographic pass.
//!
//! # Checks, in order
//!
//! 1. `Bearer ` scheme present and token non-empty
//! 2. Size limit and header parse
//! 3. Declared `alg` in the configured allow-list (asymmetric only)
//! 4. Early expiry rejection from the unverified `exp`, so stale tokens never
//!    trigger a key set refresh
//! 5. Key resolution through [`KeySetCache`]
//! 6. Key algorithm equals the declared `alg`; signature verified with it
//! 7. `exp` re-checked on the verified claims with the configured leeway
//! 8. Optional audience check
//! 9. Projection into [`IdentityContext`]

use crate::auth::claims::IdentityContext;
use crate::auth::jwks::{KeyResolveError, KeySetCache, SigningKey};
use crate::config::Config;
use crate::observability::metrics;
use common::jwt::{is_expired_at, parse_unverified_header, peek_expiry, JwtValidationError};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Why a bearer token was rejected.
///
/// All variants except `KeysUnavailable` collapse to a single "invalid token"
/// response at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed token header")]
    MalformedHeader,

    /// Declared algorithm outside the allow-list, or not the key's algorithm.
    #[error("algorithm '{0}' is not allowed")]
    DisallowedAlgorithm(String),

    #[error("unknown signing key")]
    UnknownSigningKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("malformed claims")]
    MalformedClaims,

    /// The key set could not be fetched; transient.
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

impl VerifyError {
    /// Bounded label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            VerifyError::MissingToken => "missing_token",
            VerifyError::MalformedHeader => "malformed_header",
            VerifyError::DisallowedAlgorithm(_) => "disallowed_algorithm",
            VerifyError::UnknownSigningKey => "unknown_signing_key",
            VerifyError::InvalidSignature => "invalid_signature",
            VerifyError::Expired => "expired",
            VerifyError::AudienceMismatch => "audience_mismatch",
            VerifyError::MalformedClaims => "malformed_claims",
            VerifyError::KeysUnavailable(_) => "keys_unavailable",
        }
    }
}

impl From<JwtValidationError> for VerifyError {
    fn from(_: JwtValidationError) -> Self {
        VerifyError::MalformedHeader
    }
}

/// Verification policy.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Accepted algorithms; never contains HMAC variants.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Leeway applied to `exp`.
    pub clock_skew: Duration,

    /// Required `aud` value, or `None` to skip the audience check.
    pub audience: Option<String>,
}

impl VerifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_algorithms: config.jwt_algorithms.clone(),
            clock_skew: config.jwt_clock_skew,
            audience: config
                .verify_audience
                .then(|| config.audience.clone()),
        }
    }
}

/// Strip the `Bearer ` scheme from an Authorization header value.
///
/// # Errors
///
/// Returns `MissingToken` for an absent or blank header or an empty token, and
/// `MalformedHeader` for any other scheme.
pub fn strip_bearer(authorization: Option<&str>) -> Result<&str, VerifyError> {
    let value = authorization
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "gw.auth.jwt", "Missing Authorization header");
            VerifyError::MissingToken
        })?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| {
            tracing::debug!(target: "gw.auth.jwt", "Non-Bearer Authorization header");
            VerifyError::MalformedHeader
        })?;

    if token.is_empty() {
        return Err(VerifyError::MissingToken);
    }
    Ok(token)
}

fn record_outcome(
    result: Result<IdentityContext, VerifyError>,
) -> Result<IdentityContext, VerifyError> {
    metrics::record_token_verification(match &result {
        Ok(_) => "success",
        Err(e) => e.label(),
    });
    if let Err(e) = &result {
        tracing::debug!(target: "gw.auth.jwt", reason = e.label(), "Token rejected");
    }
    result
}

/// Verifies realm access tokens.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    settings: VerifierSettings,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>, settings: VerifierSettings) -> Self {
        Self { keys, settings }
    }

    /// Verify an Authorization header value (`Bearer <token>`).
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` for the first failed check.
    #[instrument(skip_all, name = "gw.auth.authenticate")]
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
    ) -> Result<IdentityContext, VerifyError> {
        let result = match strip_bearer(authorization) {
            Ok(token) => self.verify_token(token).await,
            Err(e) => Err(e),
        };
        record_outcome(result)
    }

    /// Verify an Authorization header as raw bytes off the wire.
    ///
    /// A value that is not valid UTF-8 is a `MalformedHeader`, not a missing
    /// one.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` for the first failed check.
    pub async fn authenticate_raw(
        &self,
        authorization: Option<&[u8]>,
    ) -> Result<IdentityContext, VerifyError> {
        match authorization.map(std::str::from_utf8).transpose() {
            Ok(header) => self.authenticate(header).await,
            Err(_) => {
                tracing::debug!(target: "gw.auth.jwt", "Authorization header is not valid UTF-8");
                record_outcome(Err(VerifyError::MalformedHeader))
            }
        }
    }

    /// Verify a raw compact JWS without the scheme prefix.
    ///
    /// # Errors
    ///
    /// Returns the `VerifyError` for the first failed check.
    pub async fn verify_token(&self, token: &str) -> Result<IdentityContext, VerifyError> {
        let header = parse_unverified_header(token)?;

        let declared = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| self.settings.allowed_algorithms.contains(alg))
            .ok_or_else(|| VerifyError::DisallowedAlgorithm(header.alg.clone()))?;

        if let Some(exp) = peek_expiry(token) {
            if is_expired_at(exp, chrono::Utc::now().timestamp(), self.settings.clock_skew) {
                return Err(VerifyError::Expired);
            }
        }

        let key = self.keys.resolve(&header.kid).await.map_err(|e| match e {
            KeyResolveError::NotFound => VerifyError::UnknownSigningKey,
            KeyResolveError::Unavailable(reason) => VerifyError::KeysUnavailable(reason),
        })?;

        if key.algorithm != declared {
            tracing::debug!(
                target: "gw.auth.jwt",
                kid = %key.key_id,
                declared = ?declared,
                key_algorithm = ?key.algorithm,
                "Declared algorithm does not match key"
            );
            return Err(VerifyError::DisallowedAlgorithm(header.alg));
        }

        let claims = self.verify_signature(token, &key)?;

        IdentityContext::from_verified_claims(claims).map_err(|e| {
            tracing::debug!(target: "gw.auth.jwt", error = %e, "Claims do not match schema");
            VerifyError::MalformedClaims
        })
    }

    /// Cryptographic pass: signature, `exp` with leeway, and audience.
    fn verify_signature(
        &self,
        token: &str,
        key: &SigningKey,
    ) -> Result<Map<String, Value>, VerifyError> {
        let mut validation = Validation::new(key.algorithm);
        validation.leeway = self.settings.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        match &self.settings.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        decode::<Map<String, Value>>(token, &key.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let mapped = match e.kind() {
                    ErrorKind::ExpiredSignature => VerifyError::Expired,
                    ErrorKind::InvalidAudience => VerifyError::AudienceMismatch,
                    ErrorKind::MissingRequiredClaim(_) | ErrorKind::Json(_) => {
                        VerifyError::MalformedClaims
                    }
                    ErrorKind::InvalidAlgorithm => {
                        VerifyError::DisallowedAlgorithm(format!("{:?}", key.algorithm))
                    }
                    _ => VerifyError::InvalidSignature,
                };
                tracing::debug!(target: "gw.auth.jwt", error = %e, "Signature pass failed");
                mapped
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn unsigned_token(header: &serde_json::Value, payload: &serde_json::Value) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload.to_string()),
            URL_SAFE_NO_PAD.encode(b"not-a-signature")
        )
    }

    fn settings() -> VerifierSettings {
        VerifierSettings {
            allowed_algorithms: vec![Algorithm::RS256],
            clock_skew: Duration::from_secs(30),
            audience: None,
        }
    }

    async fn verifier_with_counted_jwks() -> (TokenVerifier, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"keys": []})))
            .mount(&server)
            .await;
        let cache = Arc::new(KeySetCache::new(
            format!("{}/certs", server.uri()),
            Duration::from_secs(2),
        ));
        (TokenVerifier::new(cache, settings()), server)
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 300
    }

    // =========================================================================
    // strip_bearer
    // =========================================================================

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(strip_bearer(None), Err(VerifyError::MissingToken));
        assert_eq!(strip_bearer(Some("Basic dXNlcjpwYXNz")), Err(VerifyError::MalformedHeader));
        assert_eq!(strip_bearer(Some("bearer abc")), Err(VerifyError::MalformedHeader));
        assert_eq!(strip_bearer(Some("Bearer")), Err(VerifyError::MalformedHeader));
        assert_eq!(strip_bearer(Some("")), Err(VerifyError::MissingToken));
        assert_eq!(strip_bearer(Some("Bearer ")), Err(VerifyError::MissingToken));
        assert_eq!(strip_bearer(Some("Bearer    ")), Err(VerifyError::MissingToken));
    }

    // =========================================================================
    // Pre-key checks (no key set fetch may happen)
    // =========================================================================

    #[tokio::test]
    async fn test_missing_header_is_missing_token() {
        let (verifier, server) = verifier_with_counted_jwks().await;
        assert_eq!(
            verifier.authenticate(None).await.unwrap_err(),
            VerifyError::MissingToken
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_is_malformed_header() {
        let (verifier, server) = verifier_with_counted_jwks().await;
        assert_eq!(
            verifier
                .authenticate(Some("Bearer not-a-jwt"))
                .await
                .unwrap_err(),
            VerifyError::MalformedHeader
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alg_none_fails_closed() {
        let (verifier, server) = verifier_with_counted_jwks().await;
        let token = unsigned_token(
            &serde_json::json!({"alg": "none", "kid": "k1"}),
            &serde_json::json!({"sub": "u", "exp": future_exp()}),
        );

        assert_eq!(
            verifier.verify_token(&token).await.unwrap_err(),
            VerifyError::DisallowedAlgorithm("none".to_string())
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hs256_fails_closed() {
        let (verifier, _server) = verifier_with_counted_jwks().await;
        let token = unsigned_token(
            &serde_json::json!({"alg": "HS256", "kid": "k1"}),
            &serde_json::json!({"sub": "u", "exp": future_exp()}),
        );

        assert!(matches!(
            verifier.verify_token(&token).await,
            Err(VerifyError::DisallowedAlgorithm(_))
        ));
    }

    #[tokio::test]
    async fn test_allowed_but_unlisted_asymmetric_alg_fails_closed() {
        let (verifier, _server) = verifier_with_counted_jwks().await;
        let token = unsigned_token(
            &serde_json::json!({"alg": "PS256", "kid": "k1"}),
            &serde_json::json!({"sub": "u", "exp": future_exp()}),
        );

        assert_eq!(
            verifier.verify_token(&token).await.unwrap_err(),
            VerifyError::DisallowedAlgorithm("PS256".to_string())
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected_before_key_lookup() {
        let (verifier, server) = verifier_with_counted_jwks().await;
        let token = unsigned_token(
            &serde_json::json!({"alg": "RS256", "kid": "k1"}),
            &serde_json::json!({"sub": "u", "exp": chrono::Utc::now().timestamp() - 3600}),
        );

        assert_eq!(
            verifier.verify_token(&token).await.unwrap_err(),
            VerifyError::Expired
        );
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kid_after_refresh() {
        let (verifier, server) = verifier_with_counted_jwks().await;
        let token = unsigned_token(
            &serde_json::json!({"alg": "RS256", "kid": "ghost"}),
            &serde_json::json!({"sub": "u", "exp": future_exp()}),
        );

        assert_eq!(
            verifier.verify_token(&token).await.unwrap_err(),
            VerifyError::UnknownSigningKey
        );
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_key_set_is_keys_unavailable() {
        let cache = Arc::new(KeySetCache::new(
            "http://127.0.0.1:9/certs".to_string(),
            Duration::from_millis(500),
        ));
        let verifier = TokenVerifier::new(cache, settings());
        let token = unsigned_token(
            &serde_json::json!({"alg": "RS256", "kid": "k1"}),
            &serde_json::json!({"sub": "u", "exp": future_exp()}),
        );

        assert!(matches!(
            verifier.verify_token(&token).await,
            Err(VerifyError::KeysUnavailable(_))
        ));
    }

    // =========================================================================
    // Misc
    // =========================================================================

    #[test]
    fn test_settings_from_config_audience_flag() {
        let mut vars = std::collections::HashMap::from([
            ("KEYCLOAK_URL".to_string(), "http://kc".to_string()),
            ("KEYCLOAK_REALM".to_string(), "iam".to_string()),
            ("KEYCLOAK_CLIENT_ID".to_string(), "iam-frontend".to_string()),
            ("KEYCLOAK_ADMIN_USER".to_string(), "admin".to_string()),
            ("KEYCLOAK_ADMIN_PASSWORD".to_string(), "pw".to_string()),
        ]);
        let off = VerifierSettings::from_config(&Config::from_vars(&vars).unwrap());
        assert!(off.audience.is_none());

        vars.insert("JWT_VERIFY_AUDIENCE".to_string(), "true".to_string());
        let on = VerifierSettings::from_config(&Config::from_vars(&vars).unwrap());
        assert_eq!(on.audience.as_deref(), Some("iam-frontend"));
    }

    #[test]
    fn test_labels_are_distinct() {
        let labels = [
            VerifyError::MissingToken.label(),
            VerifyError::MalformedHeader.label(),
            VerifyError::DisallowedAlgorithm(String::new()).label(),
            VerifyError::UnknownSigningKey.label(),
            VerifyError::InvalidSignature.label(),
            VerifyError::Expired.label(),
            VerifyError::AudienceMismatch.label(),
            VerifyError::MalformedClaims.label(),
            VerifyError::KeysUnavailable(String::new()).label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
