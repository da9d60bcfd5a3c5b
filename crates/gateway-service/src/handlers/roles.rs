//! Realm role handlers.
//!
//! - `GET /api/v1/roles` - list realm roles
//! - `POST /api/v1/roles` - create a role (elevated)
//! - `DELETE /api/v1/roles/{name}` - delete a role (elevated)
//! - `POST /api/v1/users/{id}/roles` - map roles to a user (elevated)
//! - `DELETE /api/v1/users/{id}/roles` - unmap roles from a user (elevated)

use crate::auth::claims::IdentityContext;
use crate::errors::GatewayError;
use crate::handlers::{elevate, parse_body};
use crate::models::{CreateRoleBody, MessageResponse, RoleChangeBody, RoleListResponse, RoleRecord};
use crate::routes::AppState;
use crate::services::orchestrator::RoleAssignment;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/roles
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoleListResponse>, GatewayError> {
    let roles = state.orchestrator.list_roles().await?;
    Ok(Json(RoleListResponse {
        total: roles.len(),
        roles,
    }))
}

/// Handler for POST /api/v1/roles
///
/// Creating a role that already exists returns the existing role.
#[instrument(skip_all, name = "gw.roles.create")]
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<RoleRecord>), GatewayError> {
    let grant = elevate(&state, &identity)?;

    let body: CreateRoleBody = parse_body(&body)?;
    body.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let role = state
        .orchestrator
        .create_role(&grant, body.name.trim(), body.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// Handler for DELETE /api/v1/roles/{name}
#[instrument(skip_all, name = "gw.roles.delete")]
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;
    state.orchestrator.delete_role(&grant, &name).await?;
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}

/// Handler for POST /api/v1/users/{id}/roles
///
/// Unknown role names are reported in `skipped`, not as an error.
#[instrument(skip_all, name = "gw.roles.assign")]
pub async fn assign_roles(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<Json<RoleAssignment>, GatewayError> {
    let grant = elevate(&state, &identity)?;

    let body: RoleChangeBody = parse_body(&body)?;
    body.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let assignment = state
        .orchestrator
        .assign_roles(&grant, &user_id, &body.roles)
        .await?;
    Ok(Json(assignment))
}

/// Handler for DELETE /api/v1/users/{id}/roles
#[instrument(skip_all, name = "gw.roles.remove")]
pub async fn remove_roles(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<Json<RoleAssignment>, GatewayError> {
    let grant = elevate(&state, &identity)?;

    let body: RoleChangeBody = parse_body(&body)?;
    body.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let removal = state
        .orchestrator
        .remove_roles(&grant, &user_id, &body.roles)
        .await?;
    Ok(Json(removal))
}
