//! Role-based authorization over a verified identity.
//!
//! Checks are exact, case-sensitive set membership with no remote calls. A
//! missing or empty role set denies.
//!
//! Privileged orchestrator operations take an [`AdminGrant`], and outside
//! this crate the only way to get one is a successful [`require_role`]. A
//! mutation therefore cannot be reached without exactly one passed check.

use crate::auth::claims::IdentityContext;
use thiserror::Error;

/// The identity lacks the required role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Access denied: role '{required}' is required")]
pub struct AccessDenied {
    pub required: String,
}

/// Evidence that a role check passed for one caller.
#[derive(Debug, Clone)]
pub struct AdminGrant {
    actor: String,
    role: String,
}

impl AdminGrant {
    /// Grant for in-process service flows (bootstrap seeding) that act with
    /// the gateway's own admin credential rather than an end-user token.
    pub(crate) fn service(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            role: "service".to_string(),
        }
    }

    /// Who the grant was issued to, for audit logging.
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Role that was checked.
    pub fn role(&self) -> &str {
        &self.role
    }
}

/// Whether `role` is present verbatim in the context's role set.
pub fn has_role(context: &IdentityContext, role: &str) -> bool {
    !role.is_empty() && context.roles().contains(role)
}

/// Require `role`, returning a grant on success.
///
/// # Errors
///
/// Returns `AccessDenied` when the role is absent, including when the role
/// set is empty.
pub fn require_role(context: &IdentityContext, role: &str) -> Result<AdminGrant, AccessDenied> {
    if has_role(context, role) {
        Ok(AdminGrant {
            actor: context.username().unwrap_or("unknown").to_string(),
            role: role.to_string(),
        })
    } else {
        tracing::debug!(
            target: "gw.auth.guard",
            username = ?context.username(),
            required = %role,
            role_count = context.roles().len(),
            "Role check denied"
        );
        Err(AccessDenied {
            required: role.to_string(),
        })
    }
}
