//! Group handlers.
//!
//! - `GET /api/v1/groups` - list groups
//! - `POST /api/v1/groups` - create a group (elevated)
//! - `DELETE /api/v1/groups/{id}` - delete a group (elevated)
//! - `PUT /api/v1/users/{uid}/groups/{gid}` - add a member (elevated)
//! - `DELETE /api/v1/users/{uid}/groups/{gid}` - remove a member (elevated)

use crate::auth::claims::IdentityContext;
use crate::errors::GatewayError;
use crate::handlers::{elevate, parse_body};
use crate::models::{CreateGroupBody, GroupListResponse, GroupResponse, MessageResponse};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/groups
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GroupListResponse>, GatewayError> {
    let groups: Vec<GroupResponse> = state
        .orchestrator
        .list_groups()
        .await?
        .into_iter()
        .map(GroupResponse::from)
        .collect();
    Ok(Json(GroupListResponse {
        total: groups.len(),
        groups,
    }))
}

/// Handler for POST /api/v1/groups
#[instrument(skip_all, name = "gw.groups.create")]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<GroupResponse>), GatewayError> {
    let grant = elevate(&state, &identity)?;

    let body: CreateGroupBody = parse_body(&body)?;
    body.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let group = state
        .orchestrator
        .create_group(&grant, body.name.trim())
        .await?;
    Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

/// Handler for DELETE /api/v1/groups/{id}
#[instrument(skip_all, name = "gw.groups.delete")]
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path(group_id): Path<String>,
) -> Result<Json<MessageResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;
    state.orchestrator.delete_group(&grant, &group_id).await?;
    Ok(Json(MessageResponse::new("Group deleted successfully")))
}

/// Handler for PUT /api/v1/users/{uid}/groups/{gid}
#[instrument(skip_all, name = "gw.groups.add_member")]
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path((user_id, group_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;
    state
        .orchestrator
        .add_member(&grant, &user_id, &group_id)
        .await?;
    Ok(Json(MessageResponse::new("User added to group")))
}

/// Handler for DELETE /api/v1/users/{uid}/groups/{gid}
#[instrument(skip_all, name = "gw.groups.remove_member")]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<IdentityContext>,
    Path((user_id, group_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, GatewayError> {
    let grant = elevate(&state, &identity)?;
    state
        .orchestrator
        .remove_member(&grant, &user_id, &group_id)
        .await?;
    Ok(Json(MessageResponse::new("User removed from group")))
}
