//! Authentication middleware for protected routes.
//!
//! Reads the Authorization header, verifies the bearer token through
//! [`AuthService::authenticate`], and stores the resulting
//! [`IdentityContext`] in request extensions for downstream handlers.

use crate::errors::GatewayError;
use crate::services::auth_service::AuthService;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub auth_service: Arc<AuthService>,
}

/// Authentication middleware.
///
/// # Response
///
/// - 401 Unauthorized if the token is missing or fails verification
/// - 503 Service Unavailable if the realm key set cannot be fetched
/// - Otherwise continues with `IdentityContext` in extensions
#[instrument(skip_all, name = "gw.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let header = req.headers().get(AUTHORIZATION).map(|h| h.as_bytes());

    let identity = state
        .auth_service
        .authenticate_raw(header)
        .await
        .inspect_err(|e| {
            tracing::debug!(target: "gw.middleware.auth", reason = e.label(), "Request rejected");
        })?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
