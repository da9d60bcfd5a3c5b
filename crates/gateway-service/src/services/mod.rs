//! Service layer for the gateway.
//!
//! # Components
//!
//! - `admin_client` - typed client for the identity provider's admin REST surface
//! - `token_client` - password and refresh grants against the realm token endpoint
//! - `auth_service` - login, refresh, authenticate, authorize
//! - `orchestrator` - multi-step user, role, and group administration

pub mod admin_client;
pub mod auth_service;
pub mod orchestrator;
pub mod token_client;

pub use admin_client::{AdminApi, AdminClient, AdminError};
pub use auth_service::{AuthError, AuthService, LoginOutcome};
pub use orchestrator::{CreateUserOutcome, CreateUserRequest, Orchestrator, RoleAssignment};
pub use token_client::{TokenClient, TokenIssueError, TokenIssuer};
// In-memory admin API for tests (exposed for integration tests)
#[allow(unused_imports)]
pub use admin_client::mock::MockAdminApi;
