//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: the parameterized route table, everything else is `/other`
//! - `outcome`: one value per verification failure kind plus `success`
//! - `operation`: admin client operation names, fixed in code
//! - `kind`: `role` or `group`

use common::token_manager::{TokenRefreshCallback, TokenRefreshEvent};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Admin calls go over the network to the identity provider
        .set_buckets_for_metric(
            Matcher::Prefix("gw_admin_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set admin request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gw_admin_credential_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set credential refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures framework-level rejections (415, 422, 405) as well as handler
/// responses.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Replace id and name segments with placeholders.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health"
        | "/metrics"
        | "/api/v1/auth/login"
        | "/api/v1/auth/refresh"
        | "/api/v1/auth/me"
        | "/api/v1/auth/logout"
        | "/api/v1/users"
        | "/api/v1/roles"
        | "/api/v1/groups" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let normalized = match parts.as_slice() {
        ["api", "v1", "users", _] => "/api/v1/users/{id}",
        ["api", "v1", "users", _, "password"] => "/api/v1/users/{id}/password",
        ["api", "v1", "users", _, "roles"] => "/api/v1/users/{id}/roles",
        ["api", "v1", "users", _, "groups"] => "/api/v1/users/{id}/groups",
        ["api", "v1", "users", _, "groups", _] => "/api/v1/users/{id}/groups/{group_id}",
        ["api", "v1", "roles", _] => "/api/v1/roles/{name}",
        ["api", "v1", "groups", _] => "/api/v1/groups/{id}",
        _ => "/other",
    };
    normalized.to_string()
}

// ============================================================================
// Token Verification Metrics
// ============================================================================

/// Record a bearer token verification.
///
/// Metric: `gw_token_verifications_total`
/// Labels: `outcome` ("success" or a `VerifyError` label)
pub fn record_token_verification(outcome: &str) {
    counter!("gw_token_verifications_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a key set fetch.
///
/// Metric: `gw_jwks_refresh_total`
/// Labels: `status` ("success" or "error")
pub fn record_jwks_refresh(status: &str) {
    counter!("gw_jwks_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Admin Client Metrics
// ============================================================================

/// Record one admin REST call.
///
/// Metric: `gw_admin_request_duration_seconds`, `gw_admin_requests_total`
/// Labels: `operation`, `status`
///
/// Status: "success", "error", "auth_failure", "unavailable"
pub fn record_admin_request(operation: &str, status: &str, duration: Duration) {
    histogram!("gw_admin_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_admin_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an admin credential acquisition.
///
/// Metric: `gw_admin_credential_refresh_total`,
/// `gw_admin_credential_refresh_duration_seconds`,
/// `gw_admin_credential_refresh_failures_total` (on failure only)
///
/// Called from the `TokenRefreshCallback` wired in `main.rs`.
pub fn record_admin_credential_refresh(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("gw_admin_credential_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("gw_admin_credential_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);

    if let Some(err_type) = error_type {
        counter!("gw_admin_credential_refresh_failures_total",
            "error_type" => err_type.to_string()
        )
        .increment(1);
    }
}

/// Callback that feeds admin credential acquisitions into
/// [`record_admin_credential_refresh`].
pub fn credential_refresh_callback() -> TokenRefreshCallback {
    Arc::new(|event: TokenRefreshEvent| {
        let status = if event.success { "success" } else { "error" };
        record_admin_credential_refresh(status, event.error_category, event.duration);
    })
}

// ============================================================================
// Orchestration Metrics
// ============================================================================

/// Record a role or group name that was skipped because it does not exist.
///
/// Metric: `gw_assignment_skips_total`
/// Labels: `kind` ("role" or "group")
pub fn record_assignment_skip(kind: &str) {
    counter!("gw_assignment_skips_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}
