//! HTTP request handlers for the gateway.

pub mod auth;
pub mod groups;
pub mod health;
pub mod metrics;
pub mod roles;
pub mod users;

pub use auth::{get_me, login, logout, refresh};
pub use groups::{add_member, create_group, delete_group, list_groups, remove_member};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use roles::{assign_roles, create_role, delete_role, list_roles, remove_roles};
pub use users::{
    create_user, delete_user, get_user, get_user_groups, get_user_roles, list_users,
    reset_password, update_user,
};

use crate::auth::claims::IdentityContext;
use crate::auth::guard::AdminGrant;
use crate::errors::GatewayError;
use crate::routes::AppState;
use serde::de::DeserializeOwned;

/// Deserialize a JSON body, answering 400 rather than axum's default 422.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "gw.handlers", error = %e, "Invalid request body");
        GatewayError::BadRequest("Invalid request body".to_string())
    })
}

/// Check the elevated role for a privileged operation.
pub(crate) fn elevate(
    state: &AppState,
    identity: &IdentityContext,
) -> Result<AdminGrant, GatewayError> {
    Ok(state
        .auth_service
        .authorize(identity, &state.config.elevated_role)?)
}
