//! Structural JWT helpers shared by the gateway crates.
//!
//! Everything here works on the *unverified* token: size limits, header
//! parsing to select a key, and a payload expiry peek. None of these results
//! may be used to grant access. They exist to pick a verification key and to
//! reject tokens early; the cryptographic check lives in the gateway's token
//! verifier.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{parse_unverified_header, peek_expiry};
//!
//! let header = parse_unverified_header(token)?;
//! // header.kid selects the JWKS entry, header.alg is checked against the allow-list
//! if let Some(exp) = peek_expiry(token) {
//!     // reject early if already expired
//! }
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (16KB).
///
/// Checked before any base64 decoding. Realm tokens carrying many roles and
/// group claims routinely exceed 4KB, so the limit is looser than a bare
/// service token would need.
pub const MAX_JWT_SIZE_BYTES: usize = 16_384;

/// Default clock skew tolerance applied to `exp`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Upper bound for a configured clock skew tolerance.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

// =============================================================================
// Error Types
// =============================================================================

/// Errors from structural token parsing.
///
/// Messages stay generic; the variant is kept for diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Not three dot-separated segments, bad base64, or bad header JSON.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no non-empty `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Header has no `alg`.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,
}

/// Errors from parsing a configured algorithm allow-list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmListError {
    #[error("algorithm allow-list is empty")]
    Empty,

    #[error("unknown signing algorithm '{0}'")]
    Unknown(String),

    #[error("symmetric signing algorithm '{0}' is not allowed")]
    Symmetric(String),
}

// =============================================================================
// Header parsing
// =============================================================================

/// Declared header fields of a token that has not been verified yet.
///
/// `alg` is kept as the raw string so that values outside the
/// `jsonwebtoken` vocabulary (e.g. `none`) can still be reported and rejected
/// by the allow-list check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    pub kid: String,
    pub alg: String,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
}

#[derive(Deserialize)]
struct RawExpiry {
    #[serde(default)]
    exp: Option<i64>,
}

fn segments(token: &str) -> Result<(&str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(_signature), None) => Ok((header, payload)),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Parse the JOSE header without touching the signature.
///
/// The result only selects a key and an algorithm candidate. The token must
/// still be cryptographically verified before any claim is trusted.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` for a wrong segment count, bad base64, or bad JSON
/// - `MissingKid` if `kid` is absent or empty
/// - `MissingAlgorithm` if `alg` is absent or empty
pub fn parse_unverified_header(token: &str) -> Result<UnverifiedHeader, JwtValidationError> {
    let (header_part, _) = segments(token)?;

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = header
        .kid
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MissingKid)?;
    let alg = header
        .alg
        .filter(|s| !s.is_empty())
        .ok_or(JwtValidationError::MissingAlgorithm)?;

    Ok(UnverifiedHeader { kid, alg })
}

/// Read the payload `exp` claim without verifying the signature.
///
/// Returns `None` when the payload cannot be decoded or has no integer `exp`.
/// Only ever use the value to reject a token.
#[must_use]
pub fn peek_expiry(token: &str) -> Option<i64> {
    let (_, payload_part) = segments(token).ok()?;
    let payload = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
    serde_json::from_slice::<RawExpiry>(&payload).ok()?.exp
}

/// Whether `exp` lies in the past by more than `skew` at time `now`.
#[must_use]
pub fn is_expired_at(exp: i64, now: i64, skew: Duration) -> bool {
    let skew_secs = i64::try_from(skew.as_secs()).unwrap_or(i64::MAX);
    exp.saturating_add(skew_secs) < now
}

// =============================================================================
// Algorithm allow-list
// =============================================================================

/// Whether `alg` is an asymmetric signature algorithm.
#[must_use]
pub fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Parse a comma-separated allow-list such as `"RS256,PS256"`.
///
/// `none` and the HMAC family are refused: anyone holding the published
/// public key could otherwise mint tokens.
///
/// # Errors
///
/// Returns `AlgorithmListError` for an empty list, an unknown name, or a
/// symmetric algorithm.
pub fn parse_algorithm_allow_list(raw: &str) -> Result<Vec<Algorithm>, AlgorithmListError> {
    let mut algorithms = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let alg =
            Algorithm::from_str(name).map_err(|_| AlgorithmListError::Unknown(name.to_string()))?;
        if !is_asymmetric(alg) {
            return Err(AlgorithmListError::Symmetric(name.to_string()));
        }
        if !algorithms.contains(&alg) {
            algorithms.push(alg);
        }
    }

    if algorithms.is_empty() {
        return Err(AlgorithmListError::Empty);
    }
    Ok(algorithms)
}
