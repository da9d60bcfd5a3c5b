//! Gateway models.
//!
//! Two families of types live here: representations exchanged with the
//! identity provider's admin REST surface (camelCase on the wire), and the
//! request/response bodies of the gateway's own HTTP API.

use crate::auth::claims::IdentityContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum username length accepted by the API.
pub const MAX_USERNAME_LENGTH: usize = 255;

/// Maximum role or group name length accepted by the API.
pub const MAX_ENTITY_NAME_LENGTH: usize = 255;

// ============================================================================
// Admin REST representations
// ============================================================================

/// A user as returned by the admin surface.
///
/// Fields the gateway does not model (attributes, required actions, ...) are
/// kept in `extra` so a read-modify-write update does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,

    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Profile for a user that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    pub enabled: bool,

    /// Defaults to `true` for provisioned accounts.
    #[serde(default = "default_true")]
    pub email_verified: bool,

    /// Sent even when empty.
    #[serde(default)]
    pub required_actions: Vec<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            first_name: None,
            last_name: None,
            enabled: true,
            email_verified: true,
            required_actions: Vec::new(),
        }
    }
}

/// Partial user update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl UserUpdate {
    /// Check if the update has any changes.
    pub fn has_changes(&self) -> bool {
        self.email.is_some()
            || self.first_name.is_some()
            || self.last_name.is_some()
            || self.enabled.is_some()
    }

    /// Merge the present fields into `record`.
    pub fn apply_to(&self, record: &mut UserRecord) {
        if let Some(email) = &self.email {
            record.email = Some(email.clone());
        }
        if let Some(first_name) = &self.first_name {
            record.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            record.last_name = Some(last_name.clone());
        }
        if let Some(enabled) = self.enabled {
            record.enabled = enabled;
        }
    }

    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.has_changes() {
            return Err("At least one field must be provided");
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err("Email address is invalid");
            }
        }
        Ok(())
    }
}

/// A realm role. Identified by name; `id` is assigned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRecord {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub composite: bool,
}

/// A group. Identified by the provider-assigned `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,

    pub name: String,

    /// Hierarchical path; top-level groups are `/{name}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl GroupRecord {
    pub fn path_or_default(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/{}", self.name))
    }
}

/// Realm created by bootstrap when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmSettings {
    pub realm: String,
    pub enabled: bool,
    pub display_name: String,

    /// Access token lifetime in seconds.
    pub access_token_lifespan: u32,
    pub sso_session_idle_timeout: u32,
    pub sso_session_max_lifespan: u32,
}

/// OAuth client created by bootstrap when absent.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    pub client_id: String,
    pub enabled: bool,
    pub public_client: bool,
    pub direct_access_grants_enabled: bool,
    pub standard_flow_enabled: bool,
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,

    /// Client secret for confidential clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("client_id", &self.client_id)
            .field("public_client", &self.public_client)
            .field(
                "direct_access_grants_enabled",
                &self.direct_access_grants_enabled,
            )
            .field("redirect_uris", &self.redirect_uris)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Basic `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !host.starts_with('.'),
        None => false,
    }
}

fn validate_username(username: &str) -> Result<(), &'static str> {
    let username = username.trim();
    if username.is_empty() {
        return Err("Username is required");
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err("Username must be at most 255 characters");
    }
    Ok(())
}

fn validate_entity_name(name: &str) -> Result<(), &'static str> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required");
    }
    if name.chars().count() > MAX_ENTITY_NAME_LENGTH {
        return Err("Name must be at most 255 characters");
    }
    if name.contains('/') {
        return Err("Name must not contain '/'");
    }
    Ok(())
}

// ============================================================================
// Auth API Models
// ============================================================================

/// Request body for `POST /api/v1/auth/login`.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl LoginRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_username(&self.username)?;
        if self.password.is_empty() {
            return Err("Password is required");
        }
        Ok(())
    }
}

/// Request body for `POST /api/v1/auth/refresh`.
#[derive(Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Identity summary embedded in token responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub roles: Vec<String>,
}

impl From<&IdentityContext> for UserSummary {
    fn from(context: &IdentityContext) -> Self {
        Self {
            id: context.subject_id().to_string(),
            username: context.username().map(ToString::to_string),
            email: context.email().map(ToString::to_string),
            name: context.name().map(ToString::to_string),
            roles: context.roles().iter().cloned().collect(),
        }
    }
}

/// Response body for login and refresh.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserSummary,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .finish()
    }
}

/// Response body for `GET /api/v1/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub sub: String,
    pub preferred_username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub roles: Vec<String>,
}

impl From<&IdentityContext> for MeResponse {
    fn from(context: &IdentityContext) -> Self {
        Self {
            sub: context.subject_id().to_string(),
            preferred_username: context.username().map(ToString::to_string),
            email: context.email().map(ToString::to_string),
            name: context.name().map(ToString::to_string),
            roles: context.roles().iter().cloned().collect(),
        }
    }
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============================================================================
// User API Models
// ============================================================================

/// Query for `GET /api/v1/users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSearchQuery {
    #[serde(default)]
    pub search: Option<String>,
}

/// A user as exposed by the gateway API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub enabled: bool,
    pub email_verified: bool,
}

impl From<UserRecord> for UserResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email.unwrap_or_default(),
            first_name: record.first_name.unwrap_or_default(),
            last_name: record.last_name.unwrap_or_default(),
            enabled: record.enabled,
            email_verified: record.email_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: usize,
}

/// Request body for `POST /api/v1/users`.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserBody {
    pub username: String,
    pub email: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    pub password: String,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl fmt::Debug for CreateUserBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserBody")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("groups", &self.groups)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl CreateUserBody {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_username(&self.username)?;
        if !is_valid_email(&self.email) {
            return Err("Email address is invalid");
        }
        if self.password.is_empty() {
            return Err("Password is required");
        }
        Ok(())
    }

    /// Profile part of the request.
    pub fn profile(&self) -> NewUser {
        NewUser {
            username: self.username.trim().to_string(),
            email: Some(self.email.clone()),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            enabled: self.enabled,
            ..NewUser::new(self.username.trim())
        }
    }
}

/// Request body for `PUT /api/v1/users/{id}/password`.
#[derive(Clone, Deserialize)]
pub struct PasswordResetBody {
    pub password: String,

    #[serde(default)]
    pub temporary: bool,
}

impl fmt::Debug for PasswordResetBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordResetBody")
            .field("password", &"[REDACTED]")
            .field("temporary", &self.temporary)
            .finish()
    }
}

impl PasswordResetBody {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.password.is_empty() {
            return Err("Password is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRolesResponse {
    pub roles: Vec<RoleRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroupsResponse {
    pub groups: Vec<GroupResponse>,
}

// ============================================================================
// Role API Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleListResponse {
    pub roles: Vec<RoleRecord>,
    pub total: usize,
}

/// Request body for `POST /api/v1/roles`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleBody {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl CreateRoleBody {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_entity_name(&self.name)
    }
}

/// Request body for `POST` and `DELETE /api/v1/users/{id}/roles`.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleChangeBody {
    pub roles: Vec<String>,
}

impl RoleChangeBody {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.roles.is_empty() {
            return Err("At least one role is required");
        }
        Ok(())
    }
}

// ============================================================================
// Group API Models
// ============================================================================

/// A group as exposed by the gateway API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResponse {
    pub id: String,
    pub name: String,
    pub path: String,
}

impl From<GroupRecord> for GroupResponse {
    fn from(record: GroupRecord) -> Self {
        let path = record.path_or_default();
        Self {
            id: record.id,
            name: record.name,
            path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupListResponse {
    pub groups: Vec<GroupResponse>,
    pub total: usize,
}

/// Request body for `POST /api/v1/groups`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupBody {
    pub name: String,
}

impl CreateGroupBody {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_entity_name(&self.name)
    }
}
