//! Liveness endpoint.
//!
//! Does not call the identity provider; a slow realm must not get the
//! gateway restarted.

use crate::models::HealthResponse;
use axum::Json;

/// Handler for GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
