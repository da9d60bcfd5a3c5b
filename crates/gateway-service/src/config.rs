//! Gateway configuration.
//!
//! Loaded from environment variables. Secrets are held as `SecretString` and
//! redacted in Debug output.

use common::jwt::{parse_algorithm_allow_list, DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use common::token_manager::{PasswordGrantConfig, DEFAULT_ADMIN_CLIENT_ID, DEFAULT_ADMIN_REALM};
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default role required for privileged mutations.
pub const DEFAULT_ELEVATED_ROLE: &str = "realm-admin";

/// Default per-call timeout for outbound requests to the identity provider.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for `HTTP_TIMEOUT_SECONDS`.
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 120;

/// Default browser origin allowed by CORS.
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Identity provider base URL without trailing slash.
    pub keycloak_url: String,

    /// Realm whose users, roles, and groups the gateway manages.
    pub realm: String,

    /// OAuth client used for end-user password and refresh grants.
    pub client_id: String,

    /// Client secret, absent for public clients.
    pub client_secret: Option<SecretString>,

    /// Administrator account used for the admin REST surface.
    pub admin_username: String,

    pub admin_password: SecretString,

    /// Realm holding the administrator account (default: "master").
    pub admin_realm: String,

    /// Client used for the administrator grant (default: "admin-cli").
    pub admin_client_id: String,

    /// Accepted token signature algorithms. Never contains HMAC variants.
    pub jwt_algorithms: Vec<Algorithm>,

    /// Leeway applied to `exp`.
    pub jwt_clock_skew: Duration,

    /// Whether `aud` must contain [`Config::audience`].
    ///
    /// Off by default: tokens minted for a public client carry `aud` values
    /// that do not name this gateway.
    pub verify_audience: bool,

    pub audience: String,

    /// Role required for privileged mutations (default: "realm-admin").
    pub elevated_role: String,

    pub bind_address: String,

    /// Per-call timeout for JWKS, token, and admin requests.
    pub http_timeout: Duration,

    pub cors_allowed_origins: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("keycloak_url", &self.keycloak_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"[REDACTED]")
            .field("admin_realm", &self.admin_realm)
            .field("admin_client_id", &self.admin_client_id)
            .field("jwt_algorithms", &self.jwt_algorithms)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("verify_audience", &self.verify_audience)
            .field("audience", &self.audience)
            .field("elevated_role", &self.elevated_role)
            .field("bind_address", &self.bind_address)
            .field("http_timeout", &self.http_timeout)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT algorithm configuration: {0}")]
    InvalidJwtAlgorithms(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid boolean for {name}: '{value}'")]
    InvalidBool { name: String, value: String },

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let keycloak_url = required(vars, "KEYCLOAK_URL")?
            .trim_end_matches('/')
            .to_string();
        let realm = required(vars, "KEYCLOAK_REALM")?;
        let client_id = required(vars, "KEYCLOAK_CLIENT_ID")?;
        let client_secret = optional(vars, "KEYCLOAK_CLIENT_SECRET").map(SecretString::from);
        let admin_username = required(vars, "KEYCLOAK_ADMIN_USER")?;
        let admin_password = SecretString::from(required(vars, "KEYCLOAK_ADMIN_PASSWORD")?);

        let admin_realm = optional(vars, "KEYCLOAK_ADMIN_REALM")
            .unwrap_or_else(|| DEFAULT_ADMIN_REALM.to_string());
        let admin_client_id = optional(vars, "KEYCLOAK_ADMIN_CLIENT_ID")
            .unwrap_or_else(|| DEFAULT_ADMIN_CLIENT_ID.to_string());

        let jwt_algorithms = parse_algorithm_allow_list(
            &optional(vars, "JWT_ALGORITHMS").unwrap_or_else(|| "RS256".to_string()),
        )
        .map_err(|e| ConfigError::InvalidJwtAlgorithms(e.to_string()))?;

        let jwt_clock_skew = if let Some(value_str) = optional(vars, "JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got 0".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let verify_audience = match optional(vars, "JWT_VERIFY_AUDIENCE") {
            Some(value) => parse_bool("JWT_VERIFY_AUDIENCE", &value)?,
            None => false,
        };
        let audience = optional(vars, "JWT_AUDIENCE").unwrap_or_else(|| client_id.clone());

        let elevated_role =
            optional(vars, "ELEVATED_ROLE").unwrap_or_else(|| DEFAULT_ELEVATED_ROLE.to_string());

        let bind_address =
            optional(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let http_timeout = if let Some(value_str) = optional(vars, "HTTP_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidHttpTimeout(format!(
                    "HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 || value > MAX_HTTP_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidHttpTimeout(format!(
                    "HTTP_TIMEOUT_SECONDS must be between 1 and {MAX_HTTP_TIMEOUT_SECONDS}, got {value}"
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS)
        };

        let cors_allowed_origins = optional(vars, "CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();

        Ok(Config {
            keycloak_url,
            realm,
            client_id,
            client_secret,
            admin_username,
            admin_password,
            admin_realm,
            admin_client_id,
            jwt_algorithms,
            jwt_clock_skew,
            verify_audience,
            audience,
            elevated_role,
            bind_address,
            http_timeout,
            cors_allowed_origins,
        })
    }

    /// Realm key set endpoint.
    pub fn jwks_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/certs",
            self.keycloak_url, self.realm
        )
    }

    /// Realm token endpoint for end-user grants.
    pub fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.keycloak_url, self.realm
        )
    }

    /// Grant settings for the administrator credential.
    pub fn admin_grant_config(&self) -> PasswordGrantConfig {
        PasswordGrantConfig::new(
            self.keycloak_url.clone(),
            self.admin_username.clone(),
            self.admin_password.clone(),
        )
        .with_realm(self.admin_realm.clone())
        .with_client_id(self.admin_client_id.clone())
        .with_http_timeout(self.http_timeout)
    }
}
