//! Admin REST client integration tests.
//!
//! Runs `AdminClient` against a wiremock admin surface with a static
//! credential provider, covering the status policy: idempotent creates and
//! deletes, credential invalidation on 401, and outage classification.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::secret::SecretString;
use common::token_manager::mock::StaticCredentialProvider;
use gateway_service::models::{NewUser, RoleRecord};
use gateway_service::services::admin_client::{AdminApi, AdminClient, AdminError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REALM: &str = "iam";

async fn setup() -> (MockServer, AdminClient, Arc<StaticCredentialProvider>) {
    let server = MockServer::start().await;
    let credentials = Arc::new(StaticCredentialProvider::with_token("admin-token"));
    let client = AdminClient::new(
        &server.uri(),
        REALM.to_string(),
        credentials.clone(),
        Duration::from_secs(2),
    )
    .unwrap();
    (server, client, credentials)
}

fn users_path() -> String {
    format!("/admin/realms/{REALM}/users")
}

fn user_json(id: &str, username: &str) -> serde_json::Value {
    json!({
        "id": id,
        "username": username,
        "email": format!("{username}@example.com"),
        "enabled": true,
        "emailVerified": false,
        "createdTimestamp": 1_700_000_000_000_i64
    })
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_requests_carry_admin_bearer_credential() {
    let (server, client, credentials) = setup().await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .and(header("authorization", "Bearer admin-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u-1", "john")])))
        .expect(1)
        .mount(&server)
        .await;

    let users = client.list_users(None).await.unwrap();

    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "john");
    assert_eq!(credentials.call_count(), 1);
}

#[tokio::test]
async fn test_list_users_forwards_search() {
    let (server, client, _) = setup().await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .and(query_param("search", "jo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u-1", "john")])))
        .expect(1)
        .mount(&server)
        .await;

    let users = client.list_users(Some("jo")).await.unwrap();
    assert_eq!(users[0].id, "u-1");
}

#[tokio::test]
async fn test_create_user_returns_id_from_lookup() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(users_path()))
        .and(body_partial_json(json!({ "username": "alice", "enabled": true })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .and(query_param("username", "alice"))
        .and(query_param("exact", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u-42", "alice")])))
        .mount(&server)
        .await;

    let id = client.create_user(&NewUser::new("alice")).await.unwrap();
    assert_eq!(id, "u-42");
}

#[tokio::test]
async fn test_create_user_sends_verified_email_and_no_required_actions() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(users_path()))
        .and(body_json(json!({
            "username": "john",
            "email": "j@example.com",
            "enabled": true,
            "emailVerified": true,
            "requiredActions": []
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .and(query_param("username", "john"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u-9", "john")])))
        .mount(&server)
        .await;

    let profile = NewUser {
        email: Some("j@example.com".to_string()),
        ..NewUser::new("john")
    };
    let id = client.create_user(&profile).await.unwrap();
    assert_eq!(id, "u-9");
}

#[tokio::test]
async fn test_create_existing_user_converges_to_existing_id() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(users_path()))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "errorMessage": "User exists with same username"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .and(query_param("username", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u-7", "alice")])))
        .mount(&server)
        .await;

    let id = client.create_user(&NewUser::new("alice")).await.unwrap();
    assert_eq!(id, "u-7");
}

#[tokio::test]
async fn test_create_user_missing_after_create_is_post_condition_failure() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(users_path()))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = client.create_user(&NewUser::new("ghost")).await;
    assert!(matches!(
        result,
        Err(AdminError::EntityNotFoundAfterCreate { kind: "user", .. })
    ));
}

#[tokio::test]
async fn test_get_missing_user_is_not_found() {
    let (server, client, _) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/nope", users_path())))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(matches!(
        client.get_user("nope").await,
        Err(AdminError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_user_round_trips_unmodelled_fields() {
    let (server, client, _) = setup().await;
    let record: gateway_service::models::UserRecord =
        serde_json::from_value(user_json("u-1", "john")).unwrap();
    Mock::given(method("PUT"))
        .and(path(format!("{}/u-1", users_path())))
        .and(body_partial_json(json!({
            "username": "john",
            "createdTimestamp": 1_700_000_000_000_i64
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.update_user("u-1", &record).await.unwrap();
}

#[tokio::test]
async fn test_reset_password_sends_credential_representation() {
    let (server, client, _) = setup().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/u-1/reset-password", users_path())))
        .and(body_json(json!({
            "type": "password",
            "value": "s3cret",
            "temporary": false
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .reset_password("u-1", &SecretString::from("s3cret".to_string()), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_absent_user_succeeds() {
    let (server, client, _) = setup().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/gone", users_path())))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client.delete_user("gone").await.unwrap();
}

// =============================================================================
// Roles and groups
// =============================================================================

#[tokio::test]
async fn test_get_absent_role_is_none() {
    let (server, client, _) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/{REALM}/roles/ghost")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(client.get_realm_role("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn test_create_existing_role_succeeds() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/roles")))
        .and(body_json(json!({ "name": "viewer", "description": "Read-only access" })))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    client
        .create_realm_role("viewer", Some("Read-only access"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_role_mappings_post_full_representations() {
    let (server, client, _) = setup().await;
    let role = RoleRecord {
        id: "r-1".to_string(),
        name: "viewer".to_string(),
        description: None,
        composite: false,
    };
    Mock::given(method("POST"))
        .and(path(format!("{}/u-1/role-mappings/realm", users_path())))
        .and(body_json(json!([{ "id": "r-1", "name": "viewer", "composite": false }])))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.add_realm_role_mappings("u-1", &[role]).await.unwrap();
}

#[tokio::test]
async fn test_create_group_resolves_id_by_name() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/groups")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/{REALM}/groups")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "g-1", "name": "admins", "path": "/admins" },
            { "id": "g-2", "name": "developers", "path": "/developers" }
        ])))
        .mount(&server)
        .await;

    let id = client.create_group("developers").await.unwrap();
    assert_eq!(id, "g-2");
}

#[tokio::test]
async fn test_add_member_puts_membership() {
    let (server, client, _) = setup().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/u-1/groups/g-2", users_path())))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.add_user_to_group("u-1", "g-2").await.unwrap();
}

// =============================================================================
// Failure classification
// =============================================================================

#[tokio::test]
async fn test_unauthorized_invalidates_credential_without_retry() {
    let (server, client, credentials) = setup().await;
    Mock::given(method("GET"))
        .and(path(users_path()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.list_users(None).await;

    assert!(matches!(result, Err(AdminError::AdminAuthFailure(_))));
    assert_eq!(credentials.invalidation_count(), 1);
    assert_eq!(credentials.call_count(), 1);
}

#[tokio::test]
async fn test_credential_failure_sends_nothing() {
    let server = MockServer::start().await;
    let client = AdminClient::new(
        &server.uri(),
        REALM.to_string(),
        Arc::new(StaticCredentialProvider::failing()),
        Duration::from_secs(2),
    )
    .unwrap();

    let result = client.list_groups().await;

    assert!(matches!(result, Err(AdminError::AdminAuthFailure(_))));
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let (server, client, _) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/{REALM}/roles")))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(matches!(
        client.list_realm_roles().await,
        Err(AdminError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_unreachable_provider_is_unavailable() {
    let client = AdminClient::new(
        "http://127.0.0.1:1",
        REALM.to_string(),
        Arc::new(StaticCredentialProvider::with_token("admin-token")),
        Duration::from_secs(1),
    )
    .unwrap();

    assert!(matches!(
        client.list_users(None).await,
        Err(AdminError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_unexpected_client_error_is_rejected() {
    let (server, client, _) = setup().await;
    Mock::given(method("POST"))
        .and(path(format!("/admin/realms/{REALM}/roles")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorMessage": "invalid role name"
        })))
        .mount(&server)
        .await;

    let result = client.create_realm_role("bad name", None).await;
    assert_eq!(
        result.unwrap_err(),
        AdminError::Rejected {
            operation: "create_realm_role",
            status: 400
        }
    );
}

#[tokio::test]
async fn test_malformed_body_is_malformed_response() {
    let (server, client, _) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/realms/{REALM}/groups")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        client.list_groups().await,
        Err(AdminError::MalformedResponse(_))
    ));
}
