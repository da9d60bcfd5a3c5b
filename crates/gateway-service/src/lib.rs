//! IAM Gateway Library
//!
//! An HTTP gateway in front of a Keycloak realm. It:
//!
//! - Verifies bearer tokens against the realm's published key set
//! - Relays password and refresh grants for end users
//! - Gates privileged operations on a configured realm role
//! - Drives the admin REST surface for users, roles, and groups,
//!   including multi-step user provisioning
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> identity provider
//!                        |
//!                  auth/*.rs (key set, verifier, guard)
//! ```
//!
//! # Modules
//!
//! - `auth` - key set cache, token verification, role guard
//! - `bootstrap` - idempotent realm provisioning
//! - `config` - service configuration from environment
//! - `errors` - error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - bearer authentication and HTTP metrics
//! - `models` - admin representations and API bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - admin client, token client, auth service, orchestrator

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
