//! Middleware for the gateway.
//!
//! # Components
//!
//! - `auth` - bearer token authentication for protected routes
//! - `http_metrics` - request count and latency for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState};
pub use http_metrics::http_metrics_middleware;
