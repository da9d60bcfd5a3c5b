//! User handlers.
//!
//! Reads need only an authenticated caller. Mutations additionally require
//! the elevated role.
//!
//! - `GET /api/v1/users?search=` - list or search users
//! - `GET /api/v1/users/{id}` - get a user
//! - `POST /api/v1/users` - create user with password, roles, and groups
//! - `PUT /api/v1/users/{id}` - partial profile update
//! - `DELETE /api/v1/users/{id}` - delete a user
//! - `PUT /api/v1/users/{id}/password` - set a new password
//! - `GET /api/v1/users/{id}/roles` - realm roles mapped to the user
//! - `GET /api/v1/users/{id}/groups` - groups the user belongs to

use crate::auth::claims::IdentityContext;
use crate::errors::GatewayError;
use crate::handlers::{elevate, parse_body};
use crate::models::{
    CreateUserBody, GroupResponse, MessageResponse, PasswordResetBody, UserGroupsResponse,
    UserListResponse, UserResponse, UserRolesResponse, UserSearchQuery, UserUpdate,
};
use crate::routes::AppState;
use crate::services::orchestrator::{CreateUserOutcome, CreateUserRequest};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/users
#[instrument(skip_all, name = "gw.users.list")]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<UserListResponse>, GatewayError> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let users: Vec<UserResponse> = state
        .orchestrator
        .list_users(search)
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(UserListResponse {
        total: users.len(),
        users,
    }))
}

/// Handler for GET /api/v1/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, GatewayError> {
    let user = state.orchestrator.get_user(&user_id).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Handler for POST /api/v1/users
///
/// # Response
///
/// - 201 Created: user exists with the password set; role and group
///   results (assigned, skipped, failed) are in the body
/// - 400 Bad Request: invalid username, email, or password
/// - 403 Forbidden: caller lacks the elevated role
/// - 503 Service Unavailable: identity provider unreachable
#[instrument(skip_all, name = "gw.users.create")]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateUserOutcome>), GatewayError> {
    let grant = elevate(&state, &identity)?;

    let body: CreateUserBody = parse_body(&body)?;
    body.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let request = CreateUserRequest {
        profile: body.profile(),
        password: SecretString::from(body.password),
        role_names: body.roles,
        group_names: body.groups,
    };
    let outcome = state
        .orchestrator
        .create_user_complete(&grant, &request)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Handler for PUT /api/v1/users/{id}
#[instrument(skip_all, name = "gw.users.update")]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<Json<UserResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;

    let patch: UserUpdate = parse_body(&body)?;
    patch.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let updated = state
        .orchestrator
        .update_user_profile(&grant, &user_id, &patch)
        .await?;
    Ok(Json(UserResponse::from(updated)))
}

/// Handler for DELETE /api/v1/users/{id}
#[instrument(skip_all, name = "gw.users.delete")]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(user_id): Path<String>,
) -> Result<Json<MessageResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;
    state.orchestrator.delete_user(&grant, &user_id).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

/// Handler for PUT /api/v1/users/{id}/password
#[instrument(skip_all, name = "gw.users.reset_password")]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;

    let body: PasswordResetBody = parse_body(&body)?;
    body.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let password = SecretString::from(body.password);
    state
        .orchestrator
        .reset_password(&grant, &user_id, &password, body.temporary)
        .await?;
    Ok(Json(MessageResponse::new("Password reset successfully")))
}

/// Handler for GET /api/v1/users/{id}/roles
pub async fn get_user_roles(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserRolesResponse>, GatewayError> {
    let roles = state.orchestrator.user_roles(&user_id).await?;
    Ok(Json(UserRolesResponse { roles }))
}

/// Handler for GET /api/v1/users/{id}/groups
pub async fn get_user_groups(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserGroupsResponse>, GatewayError> {
    let groups = state
        .orchestrator
        .user_groups(&user_id)
        .await?
        .into_iter()
        .map(GroupResponse::from)
        .collect();
    Ok(Json(UserGroupsResponse { groups }))
}
