//! Realm key set cache.
//!
//! Fetches the identity provider's published signing keys from the realm
//! `certs` endpoint and resolves a token's key id to a verification key.
//!
//! There is no TTL and no background refresh. A lookup that misses triggers
//! exactly one fetch; the fetched set replaces the previous one wholesale, and
//! a key id that is still unknown afterwards is reported as
//! [`KeyResolveError::NotFound`]. Readers that already hold the previous set
//! keep using it while a refresh is in flight.

use crate::observability::metrics;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

/// JSON Web Key as published by the realm.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    pub kid: String,

    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC coordinates (base64url).
    #[serde(default)]
    pub x: Option<String>,

    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// A verification key resolved from the key set.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: Algorithm,
    pub decoding_key: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Keys from one fetch, in the order the provider published them.
#[derive(Debug)]
pub struct KeySet {
    keys: Vec<SigningKey>,
    fetched_at: DateTime<Utc>,
}

impl KeySet {
    fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.key_id == kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Key resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolveError {
    /// Key id absent even after a refresh.
    #[error("signing key not found")]
    NotFound,

    /// The key set could not be fetched or parsed.
    #[error("key set unavailable: {0}")]
    Unavailable(String),
}

impl Jwk {
    /// Convert to a verification key.
    ///
    /// Returns `None` for encryption keys, HMAC or unknown algorithms, and
    /// entries with missing or malformed key material.
    pub fn to_signing_key(&self) -> Option<SigningKey> {
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return None;
        }

        let algorithm = match self.alg.as_deref() {
            Some(alg) => Algorithm::from_str(alg).ok()?,
            None => match (self.kty.as_str(), self.crv.as_deref()) {
                ("RSA", _) => Algorithm::RS256,
                ("EC", Some("P-256")) => Algorithm::ES256,
                ("EC", Some("P-384")) => Algorithm::ES384,
                _ => return None,
            },
        };

        let decoding_key = match (self.kty.as_str(), algorithm) {
            (
                "RSA",
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => DecodingKey::from_rsa_components(self.n.as_deref()?, self.e.as_deref()?).ok()?,
            ("EC", Algorithm::ES256 | Algorithm::ES384) => {
                DecodingKey::from_ec_components(self.x.as_deref()?, self.y.as_deref()?).ok()?
            }
            _ => return None,
        };

        Some(SigningKey {
            key_id: self.kid.clone(),
            algorithm,
            decoding_key,
        })
    }
}

/// Lazily refreshed cache of the realm signing keys.
pub struct KeySetCache {
    jwks_url: String,
    http_client: reqwest::Client,
    current: RwLock<Option<Arc<KeySet>>>,
}

impl KeySetCache {
    /// Create a cache for `jwks_url`. Nothing is fetched until the first lookup.
    pub fn new(jwks_url: String, http_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            current: RwLock::new(None),
        }
    }

    /// Resolve `kid` to a signing key, refreshing the set once on a miss.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the key id is absent after one refresh
    /// - `Unavailable` if the refresh itself failed
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<SigningKey, KeyResolveError> {
        if let Some(key) = self.lookup(kid).await {
            tracing::debug!(target: "gw.auth.jwks", kid = %kid, "Key set cache hit");
            return Ok(key);
        }

        tracing::debug!(target: "gw.auth.jwks", kid = %kid, "Key id not cached, refreshing key set");
        let refreshed = self.refresh().await?;

        match refreshed.find(kid) {
            Some(key) => Ok(key.clone()),
            None => {
                tracing::warn!(target: "gw.auth.jwks", kid = %kid, "Key id not found after refresh");
                Err(KeyResolveError::NotFound)
            }
        }
    }

    /// Snapshot of the current key set, if one has been fetched.
    pub async fn current(&self) -> Option<Arc<KeySet>> {
        self.current.read().await.clone()
    }

    async fn lookup(&self, kid: &str) -> Option<SigningKey> {
        let current = self.current.read().await;
        current.as_ref().and_then(|set| set.find(kid)).cloned()
    }

    /// Fetch the key set and swap it in.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeyResolveError> {
        let result = self.fetch().await;
        metrics::record_jwks_refresh(if result.is_ok() { "success" } else { "error" });

        let key_set = Arc::new(result?);
        tracing::info!(
            target: "gw.auth.jwks",
            key_count = key_set.len(),
            "Key set refreshed"
        );

        let mut current = self.current.write().await;
        *current = Some(Arc::clone(&key_set));
        Ok(key_set)
    }

    async fn fetch(&self) -> Result<KeySet, KeyResolveError> {
        tracing::debug!(target: "gw.auth.jwks", url = %self.jwks_url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to fetch key set");
                KeyResolveError::Unavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gw.auth.jwks",
                status = %response.status(),
                "Key set endpoint returned error"
            );
            return Err(KeyResolveError::Unavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to parse key set");
            KeyResolveError::Unavailable(e.to_string())
        })?;

        let published = jwks.keys.len();
        let keys: Vec<SigningKey> = jwks.keys.iter().filter_map(Jwk::to_signing_key).collect();
        if keys.len() < published {
            tracing::debug!(
                target: "gw.auth.jwks",
                skipped = published - keys.len(),
                "Ignored non-signing or unsupported keys"
            );
        }

        Ok(KeySet {
            keys,
            fetched_at: Utc::now(),
        })
    }
}
