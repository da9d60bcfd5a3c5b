//! Authentication handlers.
//!
//! - `POST /api/v1/auth/login` - password login (public)
//! - `POST /api/v1/auth/refresh` - refresh grant (public)
//! - `GET /api/v1/auth/me` - identity behind the bearer token
//! - `POST /api/v1/auth/logout` - acknowledgement; tokens are discarded client-side

use crate::auth::claims::IdentityContext;
use crate::errors::GatewayError;
use crate::handlers::parse_body;
use crate::models::{
    LoginRequest, MeResponse, MessageResponse, RefreshRequest, TokenResponse, UserSummary,
};
use crate::routes::AppState;
use crate::services::auth_service::LoginOutcome;
use axum::{body::Bytes, extract::State, Extension, Json};
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;

fn token_response(outcome: LoginOutcome) -> TokenResponse {
    let user = UserSummary::from(&outcome.identity);
    TokenResponse {
        access_token: outcome.access_token,
        refresh_token: outcome.refresh_token,
        token_type: outcome.token_type,
        expires_in: outcome.expires_in,
        user,
    }
}

/// Handler for POST /api/v1/auth/login
///
/// # Response
///
/// - 200 OK: tokens plus the verified user summary
/// - 400 Bad Request: missing username or password
/// - 401 Unauthorized: rejected credentials
/// - 503 Service Unavailable: identity provider unreachable
#[instrument(skip_all, name = "gw.auth.login")]
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, GatewayError> {
    let request: LoginRequest = parse_body(&body)?;
    request.validate().map_err(|e| GatewayError::BadRequest(e.to_string()))?;

    let password = SecretString::from(request.password);
    let outcome = state
        .auth_service
        .login(request.username.trim(), &password)
        .await?;

    Ok(Json(token_response(outcome)))
}

/// Handler for POST /api/v1/auth/refresh
#[instrument(skip_all, name = "gw.auth.refresh")]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TokenResponse>, GatewayError> {
    let request: RefreshRequest = parse_body(&body)?;
    if request.refresh_token.is_empty() {
        return Err(GatewayError::BadRequest(
            "Refresh token is required".to_string(),
        ));
    }

    let refresh_token = SecretString::from(request.refresh_token);
    let outcome = state.auth_service.refresh(&refresh_token).await?;

    Ok(Json(token_response(outcome)))
}

/// Handler for GET /api/v1/auth/me
pub async fn get_me(Extension(identity): Extension<IdentityContext>) -> Json<MeResponse> {
    Json(MeResponse::from(&identity))
}

/// Handler for POST /api/v1/auth/logout
///
/// Tokens are stateless; the client discards them.
pub async fn logout(Extension(identity): Extension<IdentityContext>) -> Json<MessageResponse> {
    tracing::info!(target: "gw.handlers.auth", username = ?identity.username(), "Logout");
    Json(MessageResponse::new("Logged out successfully"))
}
