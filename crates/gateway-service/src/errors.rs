//! Gateway error type and its HTTP mapping.
//!
//! Component errors (token verification, authorization, admin calls, token
//! issuance) keep their own variants for diagnostics and collapse into
//! [`GatewayError`] at the HTTP boundary. Client-facing messages are generic;
//! details are logged server-side.

use crate::auth::guard::AccessDenied;
use crate::auth::jwt::VerifyError;
use crate::services::admin_client::AdminError;
use crate::services::auth_service::AuthError;
use crate::services::token_client::TokenIssueError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic message for every token verification failure.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated, InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - NotFound: 404 Not Found
/// - BadRequest: 400 Bad Request
/// - Conflict: 409 Conflict
/// - ServiceUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad username/password or refresh token.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The identity provider could not be reached or refused our service credential.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Remote state diverged from an expected post-condition, or a response was malformed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Unauthenticated(_) | GatewayError::InvalidToken(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::NotFound(_) => 404,
            GatewayError::BadRequest(_) => 400,
            GatewayError::Conflict(_) => 409,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::Internal(_) => 500,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message, challenge) = match &self {
            GatewayError::Unauthenticated(reason) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                reason.clone(),
                Some("Bearer realm=\"iam-gateway\""),
            ),
            GatewayError::InvalidToken(reason) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                reason.clone(),
                Some("Bearer realm=\"iam-gateway\", error=\"invalid_token\""),
            ),
            GatewayError::Forbidden(reason) => {
                (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone(), None)
            }
            GatewayError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone(), None)
            }
            GatewayError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone(), None)
            }
            GatewayError::Conflict(reason) => {
                (StatusCode::CONFLICT, "CONFLICT", reason.clone(), None)
            }
            GatewayError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "gw.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Identity provider temporarily unavailable".to_string(),
                    None,
                )
            }
            GatewayError::Internal(detail) => {
                tracing::error!(target: "gw.errors", detail = %detail, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let Some(challenge) = challenge {
            if let Ok(header_value) = challenge.parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<VerifyError> for GatewayError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::KeysUnavailable(reason) => GatewayError::ServiceUnavailable(reason),
            _ => GatewayError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()),
        }
    }
}

impl From<AccessDenied> for GatewayError {
    fn from(err: AccessDenied) -> Self {
        GatewayError::Forbidden(format!("Requires the '{}' role", err.required))
    }
}

impl From<AdminError> for GatewayError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Unavailable(reason) => GatewayError::ServiceUnavailable(reason),
            AdminError::AdminAuthFailure(reason) => {
                GatewayError::ServiceUnavailable(format!("admin credential: {reason}"))
            }
            AdminError::NotFound(what) => GatewayError::NotFound(what),
            AdminError::Rejected { status: 400, .. } => {
                GatewayError::BadRequest("Request rejected by identity provider".to_string())
            }
            AdminError::Rejected { status: 409, .. } => {
                GatewayError::Conflict("Conflicts with existing identity provider state".to_string())
            }
            other @ (AdminError::Rejected { .. }
            | AdminError::EntityNotFoundAfterCreate { .. }
            | AdminError::MalformedResponse(_)) => GatewayError::Internal(other.to_string()),
        }
    }
}

impl From<TokenIssueError> for GatewayError {
    fn from(err: TokenIssueError) -> Self {
        match err {
            TokenIssueError::InvalidCredentials => {
                GatewayError::Unauthenticated("Invalid username or password".to_string())
            }
            TokenIssueError::InvalidRefreshToken => {
                GatewayError::Unauthenticated("Invalid or expired refresh token".to_string())
            }
            TokenIssueError::Unavailable(reason) => GatewayError::ServiceUnavailable(reason),
            TokenIssueError::MalformedResponse(detail) => GatewayError::Internal(detail),
            TokenIssueError::Rejected(status) => {
                GatewayError::Internal(format!("token endpoint returned status {status}"))
            }
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Issue(e) => e.into(),
            AuthError::Verify(e) => e.into(),
        }
    }
}
