//! Multi-step administrative operations.
//!
//! Composes [`AdminApi`] calls in a fixed order. Every mutation requires an
//! [`AdminGrant`], so a privileged operation cannot start without a passed
//! role check.
//!
//! # Partial-failure policy for `create_user_complete`
//!
//! Creating the user and setting the password are mandatory: a failure
//! returns the error and nothing after it runs. Role and group assignment are
//! best-effort: names that do not exist are skipped, and remote failures are
//! recorded in the outcome. Nothing is rolled back.

use crate::auth::guard::AdminGrant;
use crate::models::{GroupRecord, NewUser, RoleRecord, UserRecord, UserUpdate};
use crate::observability::metrics;
use crate::services::admin_client::{AdminApi, AdminError};
use common::secret::SecretString;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Input for [`Orchestrator::create_user_complete`].
#[derive(Clone)]
pub struct CreateUserRequest {
    pub profile: NewUser,
    pub password: SecretString,
    pub role_names: Vec<String>,
    pub group_names: Vec<String>,
}

impl fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("profile", &self.profile)
            .field("password", &"[REDACTED]")
            .field("role_names", &self.role_names)
            .field("group_names", &self.group_names)
            .finish()
    }
}

/// Best-effort stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStage {
    Roles,
    Groups,
}

/// A recorded best-effort failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentFailure {
    pub stage: AssignmentStage,

    /// Group name for a single failed membership; `None` for stage-wide failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub message: String,
}

/// Result of [`Orchestrator::create_user_complete`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateUserOutcome {
    pub user_id: String,
    pub password_set: bool,
    pub assigned_roles: Vec<String>,
    pub skipped_roles: Vec<String>,
    pub joined_groups: Vec<String>,
    pub skipped_groups: Vec<String>,
    pub failures: Vec<AssignmentFailure>,
}

/// Result of a role assign or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleAssignment {
    /// Names that were sent in the mapping call.
    pub assigned: Vec<String>,

    /// Names that do not exist in the realm.
    pub skipped: Vec<String>,
}

/// Roles split into existing records and unknown names.
struct ResolvedRoles {
    found: Vec<RoleRecord>,
    skipped: Vec<String>,
}

pub struct Orchestrator {
    admin: Arc<dyn AdminApi>,
}

impl Orchestrator {
    pub fn new(admin: Arc<dyn AdminApi>) -> Self {
        Self { admin }
    }

    /// Look up each role name once, in request order.
    async fn resolve_roles(&self, names: &[String]) -> Result<ResolvedRoles, AdminError> {
        let mut seen = HashSet::new();
        let mut resolved = ResolvedRoles {
            found: Vec::new(),
            skipped: Vec::new(),
        };

        for name in names.iter().filter(|n| seen.insert(n.as_str())) {
            match self.admin.get_realm_role(name).await? {
                Some(role) => resolved.found.push(role),
                None => {
                    info!(target: "gw.orchestrator", role = %name, "Role does not exist, skipping");
                    metrics::record_assignment_skip("role");
                    resolved.skipped.push(name.clone());
                }
            }
        }
        Ok(resolved)
    }

    /// Create a user with password, roles, and groups.
    ///
    /// Re-running with the same request converges on the same user id.
    ///
    /// # Errors
    ///
    /// Returns the error from user creation or password setting. Role and
    /// group failures are reported in [`CreateUserOutcome::failures`].
    #[instrument(skip_all, fields(actor = %grant.actor(), username = %request.profile.username))]
    pub async fn create_user_complete(
        &self,
        grant: &AdminGrant,
        request: &CreateUserRequest,
    ) -> Result<CreateUserOutcome, AdminError> {
        let user_id = self.admin.create_user(&request.profile).await?;
        self.admin
            .reset_password(&user_id, &request.password, false)
            .await?;

        let mut outcome = CreateUserOutcome {
            user_id,
            password_set: true,
            ..Default::default()
        };

        if !request.role_names.is_empty() {
            self.assign_initial_roles(&request.role_names, &mut outcome)
                .await;
        }
        if !request.group_names.is_empty() {
            self.join_initial_groups(&request.group_names, &mut outcome)
                .await;
        }

        info!(
            target: "gw.orchestrator",
            actor = %grant.actor(),
            user_id = %outcome.user_id,
            assigned_roles = outcome.assigned_roles.len(),
            skipped_roles = outcome.skipped_roles.len(),
            joined_groups = outcome.joined_groups.len(),
            skipped_groups = outcome.skipped_groups.len(),
            failures = outcome.failures.len(),
            "User provisioned"
        );
        Ok(outcome)
    }

    async fn assign_initial_roles(&self, names: &[String], outcome: &mut CreateUserOutcome) {
        let resolved = match self.resolve_roles(names).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(target: "gw.orchestrator", user_id = %outcome.user_id, error = %e, "Role lookup failed");
                outcome.failures.push(AssignmentFailure {
                    stage: AssignmentStage::Roles,
                    target: None,
                    message: e.to_string(),
                });
                return;
            }
        };
        outcome.skipped_roles = resolved.skipped;

        if resolved.found.is_empty() {
            return;
        }
        match self
            .admin
            .add_realm_role_mappings(&outcome.user_id, &resolved.found)
            .await
        {
            Ok(()) => {
                outcome.assigned_roles = resolved.found.into_iter().map(|r| r.name).collect();
            }
            Err(e) => {
                warn!(target: "gw.orchestrator", user_id = %outcome.user_id, error = %e, "Role mapping failed");
                outcome.failures.push(AssignmentFailure {
                    stage: AssignmentStage::Roles,
                    target: None,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn join_initial_groups(&self, names: &[String], outcome: &mut CreateUserOutcome) {
        let groups = match self.admin.list_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(target: "gw.orchestrator", user_id = %outcome.user_id, error = %e, "Group listing failed");
                outcome.failures.push(AssignmentFailure {
                    stage: AssignmentStage::Groups,
                    target: None,
                    message: e.to_string(),
                });
                return;
            }
        };

        let mut seen = HashSet::new();
        for name in names.iter().filter(|n| seen.insert(n.as_str())) {
            let Some(group) = groups.iter().find(|g| &g.name == name) else {
                info!(target: "gw.orchestrator", group = %name, "Group does not exist, skipping");
                metrics::record_assignment_skip("group");
                outcome.skipped_groups.push(name.clone());
                continue;
            };

            match self
                .admin
                .add_user_to_group(&outcome.user_id, &group.id)
                .await
            {
                Ok(()) => outcome.joined_groups.push(name.clone()),
                Err(e) => {
                    warn!(target: "gw.orchestrator", group = %name, error = %e, "Group join failed");
                    outcome.failures.push(AssignmentFailure {
                        stage: AssignmentStage::Groups,
                        target: Some(name.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    /// Merge `patch` into the current user representation and write it back.
    ///
    /// # Errors
    ///
    /// `NotFound` if the user does not exist; otherwise the admin error.
    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id))]
    pub async fn update_user_profile(
        &self,
        grant: &AdminGrant,
        user_id: &str,
        patch: &UserUpdate,
    ) -> Result<UserRecord, AdminError> {
        let mut record = self.admin.get_user(user_id).await?;
        patch.apply_to(&mut record);
        self.admin.update_user(user_id, &record).await?;

        info!(target: "gw.orchestrator", actor = %grant.actor(), user_id = %user_id, "User updated");
        Ok(record)
    }

    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id))]
    pub async fn reset_password(
        &self,
        grant: &AdminGrant,
        user_id: &str,
        password: &SecretString,
        temporary: bool,
    ) -> Result<(), AdminError> {
        self.admin.reset_password(user_id, password, temporary).await?;
        info!(
            target: "gw.orchestrator",
            actor = %grant.actor(),
            user_id = %user_id,
            temporary,
            "Password reset"
        );
        Ok(())
    }

    /// Delete a user. Deleting an absent user succeeds.
    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id))]
    pub async fn delete_user(&self, grant: &AdminGrant, user_id: &str) -> Result<(), AdminError> {
        self.admin.delete_user(user_id).await?;
        info!(target: "gw.orchestrator", actor = %grant.actor(), user_id = %user_id, "User deleted");
        Ok(())
    }

    pub async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRecord>, AdminError> {
        self.admin.list_users(search).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserRecord, AdminError> {
        self.admin.get_user(user_id).await
    }

    pub async fn user_roles(&self, user_id: &str) -> Result<Vec<RoleRecord>, AdminError> {
        self.admin.get_user_realm_roles(user_id).await
    }

    pub async fn user_groups(&self, user_id: &str) -> Result<Vec<GroupRecord>, AdminError> {
        self.admin.get_user_groups(user_id).await
    }

    // ------------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------------

    pub async fn list_roles(&self) -> Result<Vec<RoleRecord>, AdminError> {
        self.admin.list_realm_roles().await
    }

    /// Create a role (or accept the existing one) and read it back.
    ///
    /// # Errors
    ///
    /// `EntityNotFoundAfterCreate` if the role cannot be read after creation.
    #[instrument(skip_all, fields(actor = %grant.actor(), role = %name))]
    pub async fn create_role(
        &self,
        grant: &AdminGrant,
        name: &str,
        description: Option<&str>,
    ) -> Result<RoleRecord, AdminError> {
        self.admin.create_realm_role(name, description).await?;
        let role = self.admin.get_realm_role(name).await?.ok_or_else(|| {
            AdminError::EntityNotFoundAfterCreate {
                kind: "role",
                name: name.to_string(),
            }
        })?;

        info!(target: "gw.orchestrator", actor = %grant.actor(), role = %name, "Role ensured");
        Ok(role)
    }

    /// Delete a role. Deleting an absent role succeeds.
    #[instrument(skip_all, fields(actor = %grant.actor(), role = %name))]
    pub async fn delete_role(&self, grant: &AdminGrant, name: &str) -> Result<(), AdminError> {
        self.admin.delete_realm_role(name).await?;
        info!(target: "gw.orchestrator", actor = %grant.actor(), role = %name, "Role deleted");
        Ok(())
    }

    /// Map existing roles to a user; unknown names are skipped.
    ///
    /// # Errors
    ///
    /// Any admin failure is returned; nothing is recorded as partial.
    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id))]
    pub async fn assign_roles(
        &self,
        grant: &AdminGrant,
        user_id: &str,
        names: &[String],
    ) -> Result<RoleAssignment, AdminError> {
        let resolved = self.resolve_roles(names).await?;
        if !resolved.found.is_empty() {
            self.admin
                .add_realm_role_mappings(user_id, &resolved.found)
                .await?;
        }

        let assignment = RoleAssignment {
            assigned: resolved.found.into_iter().map(|r| r.name).collect(),
            skipped: resolved.skipped,
        };
        info!(
            target: "gw.orchestrator",
            actor = %grant.actor(),
            user_id = %user_id,
            assigned = ?assignment.assigned,
            skipped = ?assignment.skipped,
            "Roles assigned"
        );
        Ok(assignment)
    }

    /// Unmap roles from a user; unknown names are skipped.
    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id))]
    pub async fn remove_roles(
        &self,
        grant: &AdminGrant,
        user_id: &str,
        names: &[String],
    ) -> Result<RoleAssignment, AdminError> {
        let resolved = self.resolve_roles(names).await?;
        if !resolved.found.is_empty() {
            self.admin
                .remove_realm_role_mappings(user_id, &resolved.found)
                .await?;
        }

        let assignment = RoleAssignment {
            assigned: resolved.found.into_iter().map(|r| r.name).collect(),
            skipped: resolved.skipped,
        };
        info!(
            target: "gw.orchestrator",
            actor = %grant.actor(),
            user_id = %user_id,
            removed = ?assignment.assigned,
            "Roles removed"
        );
        Ok(assignment)
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    pub async fn list_groups(&self) -> Result<Vec<GroupRecord>, AdminError> {
        self.admin.list_groups().await
    }

    /// Create a group (or accept the existing one) and read it back.
    #[instrument(skip_all, fields(actor = %grant.actor(), group = %name))]
    pub async fn create_group(
        &self,
        grant: &AdminGrant,
        name: &str,
    ) -> Result<GroupRecord, AdminError> {
        let group_id = self.admin.create_group(name).await?;
        let group = match self.admin.get_group(&group_id).await {
            Ok(group) => group,
            Err(AdminError::NotFound(_)) => {
                return Err(AdminError::EntityNotFoundAfterCreate {
                    kind: "group",
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(e),
        };

        info!(target: "gw.orchestrator", actor = %grant.actor(), group = %name, group_id = %group.id, "Group ensured");
        Ok(group)
    }

    /// Delete a group. Deleting an absent group succeeds.
    #[instrument(skip_all, fields(actor = %grant.actor(), group_id = %group_id))]
    pub async fn delete_group(&self, grant: &AdminGrant, group_id: &str) -> Result<(), AdminError> {
        self.admin.delete_group(group_id).await?;
        info!(target: "gw.orchestrator", actor = %grant.actor(), group_id = %group_id, "Group deleted");
        Ok(())
    }

    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id, group_id = %group_id))]
    pub async fn add_member(
        &self,
        grant: &AdminGrant,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), AdminError> {
        self.admin.add_user_to_group(user_id, group_id).await?;
        info!(
            target: "gw.orchestrator",
            actor = %grant.actor(),
            user_id = %user_id,
            group_id = %group_id,
            "Member added"
        );
        Ok(())
    }

    /// Remove a membership. Removing an absent membership succeeds.
    #[instrument(skip_all, fields(actor = %grant.actor(), user_id = %user_id, group_id = %group_id))]
    pub async fn remove_member(
        &self,
        grant: &AdminGrant,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), AdminError> {
        self.admin.remove_user_from_group(user_id, group_id).await?;
        info!(
            target: "gw.orchestrator",
            actor = %grant.actor(),
            user_id = %user_id,
            group_id = %group_id,
            "Member removed"
        );
        Ok(())
    }
}
