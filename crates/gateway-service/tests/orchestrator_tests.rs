//! Orchestrator integration tests.
//!
//! Multi-step provisioning against the in-memory admin API, including
//! partial failure and re-run convergence.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::secret::SecretString;
use gateway_service::auth::claims::IdentityContext;
use gateway_service::auth::guard::{require_role, AdminGrant};
use gateway_service::models::{NewUser, UserUpdate};
use gateway_service::services::orchestrator::{
    AssignmentStage, CreateUserRequest, Orchestrator,
};
use gateway_service::services::{AdminError, MockAdminApi};
use gw_test_utils::TestTokenBuilder;
use std::sync::Arc;

fn admin_grant() -> AdminGrant {
    let claims = TestTokenBuilder::new()
        .for_user("admin")
        .with_roles(&["realm-admin"])
        .build();
    let identity =
        IdentityContext::from_verified_claims(claims.as_object().cloned().unwrap()).unwrap();
    require_role(&identity, "realm-admin").unwrap()
}

fn request(username: &str, roles: &[&str], groups: &[&str]) -> CreateUserRequest {
    CreateUserRequest {
        profile: NewUser {
            email: Some(format!("{username}@example.com")),
            ..NewUser::new(username)
        },
        password: SecretString::from("password123".to_string()),
        role_names: roles.iter().map(ToString::to_string).collect(),
        group_names: groups.iter().map(ToString::to_string).collect(),
    }
}

async fn seeded_admin() -> Arc<MockAdminApi> {
    Arc::new(
        MockAdminApi::new()
            .with_role("viewer")
            .await
            .with_role("user-manager")
            .await
            .with_group("developers")
            .await
            .with_group("analysts")
            .await,
    )
}

// =============================================================================
// create_user_complete
// =============================================================================

#[tokio::test]
async fn test_full_provisioning() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());

    let outcome = orchestrator
        .create_user_complete(
            &admin_grant(),
            &request("john", &["viewer", "user-manager"], &["developers"]),
        )
        .await
        .unwrap();

    assert!(outcome.password_set);
    assert_eq!(outcome.assigned_roles, vec!["viewer", "user-manager"]);
    assert_eq!(outcome.joined_groups, vec!["developers"]);
    assert!(outcome.failures.is_empty());

    assert_eq!(
        admin.password_of(&outcome.user_id).await,
        Some(("password123".to_string(), false))
    );
    let roles = admin.roles_of(&outcome.user_id).await;
    assert!(roles.contains("viewer") && roles.contains("user-manager"));
    let developers = admin.group_id("developers").await.unwrap();
    assert!(admin.groups_of(&outcome.user_id).await.contains(&developers));
}

#[tokio::test]
async fn test_unknown_role_skipped_without_mapping_call() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());

    let outcome = orchestrator
        .create_user_complete(&admin_grant(), &request("ann", &["ghost-role"], &[]))
        .await
        .unwrap();

    assert_eq!(outcome.skipped_roles, vec!["ghost-role"]);
    assert!(outcome.assigned_roles.is_empty());
    assert!(outcome.failures.is_empty());
    assert_eq!(admin.call_count("add_realm_role_mappings").await, 0);
    assert!(admin.roles_of(&outcome.user_id).await.is_empty());
}

#[tokio::test]
async fn test_mixed_known_and_unknown_roles() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());

    let outcome = orchestrator
        .create_user_complete(
            &admin_grant(),
            &request("bea", &["viewer", "ghost-role"], &["developers", "ghost-group"]),
        )
        .await
        .unwrap();

    assert_eq!(outcome.assigned_roles, vec!["viewer"]);
    assert_eq!(outcome.skipped_roles, vec!["ghost-role"]);
    assert_eq!(outcome.joined_groups, vec!["developers"]);
    assert_eq!(outcome.skipped_groups, vec!["ghost-group"]);
    assert_eq!(admin.call_count("add_realm_role_mappings").await, 1);
}

#[tokio::test]
async fn test_password_failure_stops_before_assignments() {
    let admin = seeded_admin().await;
    admin
        .fail_on("reset_password", AdminError::Unavailable("down".to_string()))
        .await;
    let orchestrator = Orchestrator::new(admin.clone());

    let result = orchestrator
        .create_user_complete(&admin_grant(), &request("cat", &["viewer"], &["developers"]))
        .await;

    assert!(matches!(result, Err(AdminError::Unavailable(_))));
    assert_eq!(admin.call_count("get_realm_role").await, 0);
    assert_eq!(admin.call_count("list_groups").await, 0);
    assert_eq!(admin.call_count("add_user_to_group").await, 0);
}

#[tokio::test]
async fn test_create_failure_is_returned() {
    let admin = seeded_admin().await;
    admin
        .fail_on(
            "create_user",
            AdminError::AdminAuthFailure("admin credential rejected".to_string()),
        )
        .await;
    let orchestrator = Orchestrator::new(admin.clone());

    let result = orchestrator
        .create_user_complete(&admin_grant(), &request("dan", &[], &[]))
        .await;

    assert!(matches!(result, Err(AdminError::AdminAuthFailure(_))));
    assert_eq!(admin.call_count("reset_password").await, 0);
}

#[tokio::test]
async fn test_role_failure_still_returns_user_and_groups() {
    let admin = seeded_admin().await;
    admin
        .fail_on(
            "add_realm_role_mappings",
            AdminError::Unavailable("timeout".to_string()),
        )
        .await;
    let orchestrator = Orchestrator::new(admin.clone());

    let outcome = orchestrator
        .create_user_complete(&admin_grant(), &request("eve", &["viewer"], &["analysts"]))
        .await
        .unwrap();

    assert!(!outcome.user_id.is_empty());
    assert!(outcome.password_set);
    assert!(outcome.assigned_roles.is_empty());
    assert_eq!(outcome.joined_groups, vec!["analysts"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].stage, AssignmentStage::Roles);
}

#[tokio::test]
async fn test_group_failure_recorded_per_group() {
    let admin = seeded_admin().await;
    admin
        .fail_on(
            "add_user_to_group",
            AdminError::Rejected {
                operation: "add_user_to_group",
                status: 400,
            },
        )
        .await;
    let orchestrator = Orchestrator::new(admin.clone());

    let outcome = orchestrator
        .create_user_complete(
            &admin_grant(),
            &request("fay", &[], &["developers", "analysts"]),
        )
        .await
        .unwrap();

    assert!(outcome.joined_groups.is_empty());
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome
        .failures
        .iter()
        .all(|f| f.stage == AssignmentStage::Groups && f.target.is_some()));
}

#[tokio::test]
async fn test_rerun_converges_on_same_user() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());
    let req = request("gus", &["viewer"], &["developers"]);

    let first = orchestrator
        .create_user_complete(&admin_grant(), &req)
        .await
        .unwrap();
    let second = orchestrator
        .create_user_complete(&admin_grant(), &req)
        .await
        .unwrap();

    assert_eq!(first.user_id, second.user_id);
    assert_eq!(admin.user_count().await, 1);
    assert_eq!(admin.roles_of(&first.user_id).await.len(), 1);
    assert_eq!(admin.groups_of(&first.user_id).await.len(), 1);
}

// =============================================================================
// Single-entity operations
// =============================================================================

#[tokio::test]
async fn test_update_profile_merges_patch() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());
    let grant = admin_grant();
    let created = orchestrator
        .create_user_complete(&grant, &request("hal", &[], &[]))
        .await
        .unwrap();

    let patch = UserUpdate {
        first_name: Some("Hal".to_string()),
        enabled: Some(false),
        ..Default::default()
    };
    let updated = orchestrator
        .update_user_profile(&grant, &created.user_id, &patch)
        .await
        .unwrap();

    assert_eq!(updated.first_name.as_deref(), Some("Hal"));
    assert!(!updated.enabled);
    assert_eq!(updated.email.as_deref(), Some("hal@example.com"));
}

#[tokio::test]
async fn test_update_missing_user_is_not_found() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin);

    let result = orchestrator
        .update_user_profile(&admin_grant(), "nope", &UserUpdate::default())
        .await;
    assert!(matches!(result, Err(AdminError::NotFound(_))));
}

#[tokio::test]
async fn test_deleting_absent_entities_succeeds() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin);
    let grant = admin_grant();

    orchestrator.delete_user(&grant, "nope").await.unwrap();
    orchestrator.delete_role(&grant, "nope").await.unwrap();
    orchestrator.delete_group(&grant, "nope").await.unwrap();
    orchestrator
        .remove_member(&grant, "nope", "nope")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_role_and_group_read_back() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());
    let grant = admin_grant();

    let role = orchestrator
        .create_role(&grant, "auditor", Some("Audit access"))
        .await
        .unwrap();
    assert_eq!(role.name, "auditor");
    assert_eq!(role.description.as_deref(), Some("Audit access"));

    // Creating an existing role returns the existing record
    let again = orchestrator
        .create_role(&grant, "auditor", None)
        .await
        .unwrap();
    assert_eq!(again.id, role.id);

    let group = orchestrator.create_group(&grant, "ops").await.unwrap();
    assert_eq!(group.name, "ops");
    assert_eq!(admin.group_id("ops").await, Some(group.id));
}

#[tokio::test]
async fn test_assign_and_remove_roles_report_skips() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());
    let grant = admin_grant();
    let user = orchestrator
        .create_user_complete(&grant, &request("ivy", &[], &[]))
        .await
        .unwrap();

    let names = vec!["viewer".to_string(), "ghost".to_string()];
    let assigned = orchestrator
        .assign_roles(&grant, &user.user_id, &names)
        .await
        .unwrap();
    assert_eq!(assigned.assigned, vec!["viewer"]);
    assert_eq!(assigned.skipped, vec!["ghost"]);
    assert!(admin.roles_of(&user.user_id).await.contains("viewer"));

    let removed = orchestrator
        .remove_roles(&grant, &user.user_id, &names)
        .await
        .unwrap();
    assert_eq!(removed.assigned, vec!["viewer"]);
    assert!(admin.roles_of(&user.user_id).await.is_empty());
}

#[tokio::test]
async fn test_assign_only_unknown_roles_makes_no_mapping_call() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());

    let assignment = orchestrator
        .assign_roles(&admin_grant(), "user-1", &["ghost".to_string()])
        .await
        .unwrap();

    assert!(assignment.assigned.is_empty());
    assert_eq!(admin.call_count("add_realm_role_mappings").await, 0);
}

#[tokio::test]
async fn test_membership_add_and_remove() {
    let admin = seeded_admin().await;
    let orchestrator = Orchestrator::new(admin.clone());
    let grant = admin_grant();
    let user = orchestrator
        .create_user_complete(&grant, &request("joe", &[], &[]))
        .await
        .unwrap();
    let analysts = admin.group_id("analysts").await.unwrap();

    orchestrator
        .add_member(&grant, &user.user_id, &analysts)
        .await
        .unwrap();
    let groups = orchestrator.user_groups(&user.user_id).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "analysts");

    orchestrator
        .remove_member(&grant, &user.user_id, &analysts)
        .await
        .unwrap();
    assert!(orchestrator
        .user_groups(&user.user_id)
        .await
        .unwrap()
        .is_empty());
}
