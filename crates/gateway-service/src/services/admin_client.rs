//! Admin REST client for the identity provider.
//!
//! Each method performs one remote mutation or read under
//! `{base}/admin/realms/{realm}`, authenticated with a credential from the
//! injected [`CredentialProvider`].
//!
//! # Status policy
//!
//! - Duplicate creates (409) and deletes of absent entities (404) succeed.
//! - A 401 invalidates the cached credential and fails the call with
//!   `AdminAuthFailure`; the next call re-acquires. There is no retry.
//! - Transport errors, timeouts, and 5xx are `Unavailable`.
//! - Any other unexpected status is `Rejected`.

use crate::models::{
    ClientSettings, GroupRecord, NewUser, RealmSettings, RoleRecord, UserRecord,
};
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use common::token_manager::CredentialProvider;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Admin client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    /// No usable admin credential, or the surface rejected it.
    #[error("admin authentication failed: {0}")]
    AdminAuthFailure(String),

    /// A create reported success but the entity could not be read back.
    #[error("{kind} '{name}' not found after create")]
    EntityNotFoundAfterCreate { kind: &'static str, name: String },

    #[error("{0}")]
    NotFound(String),

    /// Transport failure, timeout, or 5xx.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// Unexpected 4xx.
    #[error("{operation} rejected with status {status}")]
    Rejected { operation: &'static str, status: u16 },

    #[error("malformed admin response: {0}")]
    MalformedResponse(String),
}

/// Remote entity operations used by the orchestrator and bootstrap.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRecord>, AdminError>;

    /// Exact username lookup (case-insensitive, as the provider lowercases usernames).
    async fn find_user_by_username(&self, username: &str)
        -> Result<Option<UserRecord>, AdminError>;

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, AdminError>;

    /// Create a user, or find the existing one, and return its id.
    async fn create_user(&self, profile: &NewUser) -> Result<String, AdminError>;

    /// Replace the user representation.
    async fn update_user(&self, user_id: &str, record: &UserRecord) -> Result<(), AdminError>;

    async fn delete_user(&self, user_id: &str) -> Result<(), AdminError>;

    async fn reset_password(
        &self,
        user_id: &str,
        password: &SecretString,
        temporary: bool,
    ) -> Result<(), AdminError>;

    async fn list_realm_roles(&self) -> Result<Vec<RoleRecord>, AdminError>;

    /// `None` when the role does not exist.
    async fn get_realm_role(&self, name: &str) -> Result<Option<RoleRecord>, AdminError>;

    async fn create_realm_role(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), AdminError>;

    async fn delete_realm_role(&self, name: &str) -> Result<(), AdminError>;

    async fn get_user_realm_roles(&self, user_id: &str) -> Result<Vec<RoleRecord>, AdminError>;

    async fn add_realm_role_mappings(
        &self,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<(), AdminError>;

    async fn remove_realm_role_mappings(
        &self,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<(), AdminError>;

    async fn list_groups(&self) -> Result<Vec<GroupRecord>, AdminError>;

    async fn get_group(&self, group_id: &str) -> Result<GroupRecord, AdminError>;

    /// Create a group, or find the existing one, and return its id.
    async fn create_group(&self, name: &str) -> Result<String, AdminError>;

    async fn delete_group(&self, group_id: &str) -> Result<(), AdminError>;

    async fn get_user_groups(&self, user_id: &str) -> Result<Vec<GroupRecord>, AdminError>;

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), AdminError>;

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str)
        -> Result<(), AdminError>;

    /// Create the realm if absent. Returns whether it was created.
    async fn ensure_realm(&self, settings: &RealmSettings) -> Result<bool, AdminError>;

    /// Create the client if absent. Returns whether it was created.
    async fn ensure_client(&self, settings: &ClientSettings) -> Result<bool, AdminError>;
}

/// Operation name (metrics label) and the entity it targets.
#[derive(Debug, Clone, Copy)]
struct Operation {
    name: &'static str,
    entity: &'static str,
}

impl Operation {
    const fn new(name: &'static str, entity: &'static str) -> Self {
        Self { name, entity }
    }
}

const LIST_USERS: Operation = Operation::new("list_users", "User");
const FIND_USER: Operation = Operation::new("find_user_by_username", "User");
const GET_USER: Operation = Operation::new("get_user", "User");
const CREATE_USER: Operation = Operation::new("create_user", "User");
const UPDATE_USER: Operation = Operation::new("update_user", "User");
const DELETE_USER: Operation = Operation::new("delete_user", "User");
const RESET_PASSWORD: Operation = Operation::new("reset_password", "User");
const LIST_ROLES: Operation = Operation::new("list_realm_roles", "Role");
const GET_ROLE: Operation = Operation::new("get_realm_role", "Role");
const CREATE_ROLE: Operation = Operation::new("create_realm_role", "Role");
const DELETE_ROLE: Operation = Operation::new("delete_realm_role", "Role");
const USER_ROLES: Operation = Operation::new("get_user_realm_roles", "User");
const ADD_ROLE_MAPPINGS: Operation = Operation::new("add_realm_role_mappings", "User");
const REMOVE_ROLE_MAPPINGS: Operation = Operation::new("remove_realm_role_mappings", "User");
const LIST_GROUPS: Operation = Operation::new("list_groups", "Group");
const GET_GROUP: Operation = Operation::new("get_group", "Group");
const CREATE_GROUP: Operation = Operation::new("create_group", "Group");
const DELETE_GROUP: Operation = Operation::new("delete_group", "Group");
const USER_GROUPS: Operation = Operation::new("get_user_groups", "User");
const ADD_TO_GROUP: Operation = Operation::new("add_user_to_group", "User or group");
const REMOVE_FROM_GROUP: Operation = Operation::new("remove_user_from_group", "User or group");
const GET_REALM: Operation = Operation::new("get_realm", "Realm");
const CREATE_REALM: Operation = Operation::new("create_realm", "Realm");
const FIND_CLIENT: Operation = Operation::new("find_client", "Client");
const CREATE_CLIENT: Operation = Operation::new("create_client", "Client");

/// HTTP implementation of [`AdminApi`].
#[derive(Clone)]
pub struct AdminClient {
    client: Client,

    /// Identity provider base URL.
    base_url: Url,

    realm: String,

    credentials: Arc<dyn CredentialProvider>,
}

impl AdminClient {
    /// Create a client for `realm` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if `base_url` is not an absolute http(s) URL.
    pub fn new(
        base_url: &str,
        realm: String,
        credentials: Arc<dyn CredentialProvider>,
        http_timeout: Duration,
    ) -> Result<Self, AdminError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                error!(target: "gw.admin", url = %base_url, "Invalid identity provider URL");
                AdminError::Unavailable("invalid identity provider URL".to_string())
            })?;

        let client = Client::builder()
            .timeout(http_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|e| {
                warn!(target: "gw.admin", error = %e, "Failed to build HTTP client with custom config, using defaults");
                Client::new()
            });

        Ok(Self {
            client,
            base_url,
            realm,
            credentials,
        })
    }

    /// `{base}/admin/realms` followed by `segments`, each percent-encoded.
    fn admin_url(&self, segments: &[&str]) -> Result<Url, AdminError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AdminError::Unavailable("invalid identity provider URL".to_string()))?
            .pop_if_empty()
            .extend(["admin", "realms"])
            .extend(segments);
        Ok(url)
    }

    /// `{base}/admin/realms/{realm}` followed by `segments`.
    fn realm_url(&self, segments: &[&str]) -> Result<Url, AdminError> {
        let mut all = Vec::with_capacity(segments.len() + 1);
        all.push(self.realm.as_str());
        all.extend_from_slice(segments);
        self.admin_url(&all)
    }

    /// Authenticate and send `request`, returning the response when its
    /// status is in `accepted`.
    async fn execute(
        &self,
        op: Operation,
        request: RequestBuilder,
        accepted: &[StatusCode],
    ) -> Result<Response, AdminError> {
        let start = Instant::now();
        let result = self.send(op, request, accepted).await;

        let status = match &result {
            Ok(_) => "success",
            Err(AdminError::AdminAuthFailure(_)) => "auth_failure",
            Err(AdminError::Unavailable(_)) => "unavailable",
            Err(_) => "error",
        };
        metrics::record_admin_request(op.name, status, start.elapsed());
        result
    }

    async fn send(
        &self,
        op: Operation,
        request: RequestBuilder,
        accepted: &[StatusCode],
    ) -> Result<Response, AdminError> {
        let token = self.credentials.access_token().await.map_err(|e| {
            error!(target: "gw.admin", operation = op.name, error = %e, "Failed to obtain admin credential");
            AdminError::AdminAuthFailure(e.to_string())
        })?;

        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gw.admin", operation = op.name, error = %e, "Admin request failed");
                AdminError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if accepted.contains(&status) {
            debug!(target: "gw.admin", operation = op.name, status = %status, "Admin request completed");
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!(target: "gw.admin", operation = op.name, "Admin credential rejected, invalidating");
                self.credentials.invalidate().await;
                Err(AdminError::AdminAuthFailure(
                    "admin credential rejected".to_string(),
                ))
            }
            StatusCode::NOT_FOUND => Err(AdminError::NotFound(format!("{} not found", op.entity))),
            s if s.is_server_error() => {
                warn!(target: "gw.admin", operation = op.name, status = %s, "Identity provider returned server error");
                Err(AdminError::Unavailable(format!("status {s}")))
            }
            s => {
                let body = response.text().await.unwrap_or_default();
                warn!(target: "gw.admin", operation = op.name, status = %s, body = %body, "Unexpected admin response");
                Err(AdminError::Rejected {
                    operation: op.name,
                    status: s.as_u16(),
                })
            }
        }
    }

    async fn parse<T: DeserializeOwned>(op: Operation, response: Response) -> Result<T, AdminError> {
        response.json().await.map_err(|e| {
            error!(target: "gw.admin", operation = op.name, error = %e, "Failed to parse admin response");
            AdminError::MalformedResponse(format!("{}: {e}", op.name))
        })
    }
}

#[async_trait]
impl AdminApi for AdminClient {
    #[instrument(skip(self))]
    async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRecord>, AdminError> {
        let mut request = self.client.get(self.realm_url(&["users"])?);
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            request = request.query(&[("search", search)]);
        }
        let response = self.execute(LIST_USERS, request, &[StatusCode::OK]).await?;
        Self::parse(LIST_USERS, response).await
    }

    #[instrument(skip(self))]
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, AdminError> {
        let request = self
            .client
            .get(self.realm_url(&["users"])?)
            .query(&[("username", username), ("exact", "true")]);
        let response = self.execute(FIND_USER, request, &[StatusCode::OK]).await?;
        let users: Vec<UserRecord> = Self::parse(FIND_USER, response).await?;

        Ok(users
            .into_iter()
            .find(|user| user.username.eq_ignore_ascii_case(username)))
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: &str) -> Result<UserRecord, AdminError> {
        let request = self.client.get(self.realm_url(&["users", user_id])?);
        let response = self.execute(GET_USER, request, &[StatusCode::OK]).await?;
        Self::parse(GET_USER, response).await
    }

    #[instrument(skip(self, profile), fields(username = %profile.username))]
    async fn create_user(&self, profile: &NewUser) -> Result<String, AdminError> {
        let request = self.client.post(self.realm_url(&["users"])?).json(profile);
        let response = self
            .execute(CREATE_USER, request, &[StatusCode::CREATED, StatusCode::CONFLICT])
            .await?;
        if response.status() == StatusCode::CONFLICT {
            info!(target: "gw.admin", username = %profile.username, "User already exists");
        }

        match self.find_user_by_username(&profile.username).await? {
            Some(user) => Ok(user.id),
            None => {
                error!(target: "gw.admin", username = %profile.username, "User not found after create");
                Err(AdminError::EntityNotFoundAfterCreate {
                    kind: "user",
                    name: profile.username.clone(),
                })
            }
        }
    }

    #[instrument(skip(self, record))]
    async fn update_user(&self, user_id: &str, record: &UserRecord) -> Result<(), AdminError> {
        let request = self
            .client
            .put(self.realm_url(&["users", user_id])?)
            .json(record);
        self.execute(UPDATE_USER, request, &[StatusCode::NO_CONTENT])
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, user_id: &str) -> Result<(), AdminError> {
        let request = self.client.delete(self.realm_url(&["users", user_id])?);
        self.execute(
            DELETE_USER,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self, password))]
    async fn reset_password(
        &self,
        user_id: &str,
        password: &SecretString,
        temporary: bool,
    ) -> Result<(), AdminError> {
        let credential = serde_json::json!({
            "type": "password",
            "value": password.expose_secret(),
            "temporary": temporary,
        });
        let request = self
            .client
            .put(self.realm_url(&["users", user_id, "reset-password"])?)
            .json(&credential);
        self.execute(RESET_PASSWORD, request, &[StatusCode::NO_CONTENT])
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn list_realm_roles(&self) -> Result<Vec<RoleRecord>, AdminError> {
        let request = self.client.get(self.realm_url(&["roles"])?);
        let response = self.execute(LIST_ROLES, request, &[StatusCode::OK]).await?;
        Self::parse(LIST_ROLES, response).await
    }

    #[instrument(skip(self))]
    async fn get_realm_role(&self, name: &str) -> Result<Option<RoleRecord>, AdminError> {
        let request = self.client.get(self.realm_url(&["roles", name])?);
        let response = self
            .execute(GET_ROLE, request, &[StatusCode::OK, StatusCode::NOT_FOUND])
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(GET_ROLE, response).await.map(Some)
    }

    #[instrument(skip(self, description))]
    async fn create_realm_role(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), AdminError> {
        let mut body = serde_json::json!({ "name": name });
        if let Some(description) = description {
            body["description"] = serde_json::Value::from(description);
        }
        let request = self.client.post(self.realm_url(&["roles"])?).json(&body);
        let response = self
            .execute(CREATE_ROLE, request, &[StatusCode::CREATED, StatusCode::CONFLICT])
            .await?;
        if response.status() == StatusCode::CONFLICT {
            info!(target: "gw.admin", role = %name, "Role already exists");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_realm_role(&self, name: &str) -> Result<(), AdminError> {
        let request = self.client.delete(self.realm_url(&["roles", name])?);
        self.execute(
            DELETE_ROLE,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn get_user_realm_roles(&self, user_id: &str) -> Result<Vec<RoleRecord>, AdminError> {
        let request = self
            .client
            .get(self.realm_url(&["users", user_id, "role-mappings", "realm"])?);
        let response = self.execute(USER_ROLES, request, &[StatusCode::OK]).await?;
        Self::parse(USER_ROLES, response).await
    }

    #[instrument(skip(self, roles), fields(role_count = roles.len()))]
    async fn add_realm_role_mappings(
        &self,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<(), AdminError> {
        let request = self
            .client
            .post(self.realm_url(&["users", user_id, "role-mappings", "realm"])?)
            .json(roles);
        self.execute(
            ADD_ROLE_MAPPINGS,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::CONFLICT],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self, roles), fields(role_count = roles.len()))]
    async fn remove_realm_role_mappings(
        &self,
        user_id: &str,
        roles: &[RoleRecord],
    ) -> Result<(), AdminError> {
        let request = self
            .client
            .delete(self.realm_url(&["users", user_id, "role-mappings", "realm"])?)
            .json(roles);
        self.execute(
            REMOVE_ROLE_MAPPINGS,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn list_groups(&self) -> Result<Vec<GroupRecord>, AdminError> {
        let request = self.client.get(self.realm_url(&["groups"])?);
        let response = self.execute(LIST_GROUPS, request, &[StatusCode::OK]).await?;
        Self::parse(LIST_GROUPS, response).await
    }

    #[instrument(skip(self))]
    async fn get_group(&self, group_id: &str) -> Result<GroupRecord, AdminError> {
        let request = self.client.get(self.realm_url(&["groups", group_id])?);
        let response = self.execute(GET_GROUP, request, &[StatusCode::OK]).await?;
        Self::parse(GET_GROUP, response).await
    }

    #[instrument(skip(self))]
    async fn create_group(&self, name: &str) -> Result<String, AdminError> {
        let request = self
            .client
            .post(self.realm_url(&["groups"])?)
            .json(&serde_json::json!({ "name": name }));
        let response = self
            .execute(CREATE_GROUP, request, &[StatusCode::CREATED, StatusCode::CONFLICT])
            .await?;
        if response.status() == StatusCode::CONFLICT {
            info!(target: "gw.admin", group = %name, "Group already exists");
        }

        match self
            .list_groups()
            .await?
            .into_iter()
            .find(|group| group.name == name)
        {
            Some(group) => Ok(group.id),
            None => {
                error!(target: "gw.admin", group = %name, "Group not found after create");
                Err(AdminError::EntityNotFoundAfterCreate {
                    kind: "group",
                    name: name.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete_group(&self, group_id: &str) -> Result<(), AdminError> {
        let request = self.client.delete(self.realm_url(&["groups", group_id])?);
        self.execute(
            DELETE_GROUP,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn get_user_groups(&self, user_id: &str) -> Result<Vec<GroupRecord>, AdminError> {
        let request = self
            .client
            .get(self.realm_url(&["users", user_id, "groups"])?);
        let response = self.execute(USER_GROUPS, request, &[StatusCode::OK]).await?;
        Self::parse(USER_GROUPS, response).await
    }

    #[instrument(skip(self))]
    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), AdminError> {
        let request = self
            .client
            .put(self.realm_url(&["users", user_id, "groups", group_id])?);
        self.execute(
            ADD_TO_GROUP,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::CONFLICT],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<(), AdminError> {
        let request = self
            .client
            .delete(self.realm_url(&["users", user_id, "groups", group_id])?);
        self.execute(
            REMOVE_FROM_GROUP,
            request,
            &[StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
        )
        .await
        .map(|_| ())
    }

    #[instrument(skip(self, settings), fields(realm = %settings.realm))]
    async fn ensure_realm(&self, settings: &RealmSettings) -> Result<bool, AdminError> {
        let request = self.client.get(self.admin_url(&[settings.realm.as_str()])?);
        let response = self
            .execute(GET_REALM, request, &[StatusCode::OK, StatusCode::NOT_FOUND])
            .await?;
        if response.status() == StatusCode::OK {
            info!(target: "gw.admin", realm = %settings.realm, "Realm already exists");
            return Ok(false);
        }

        let request = self.client.post(self.admin_url(&[])?).json(settings);
        let response = self
            .execute(CREATE_REALM, request, &[StatusCode::CREATED, StatusCode::CONFLICT])
            .await?;
        let created = response.status() == StatusCode::CREATED;
        info!(target: "gw.admin", realm = %settings.realm, created, "Realm ensured");
        Ok(created)
    }

    #[instrument(skip(self, settings), fields(client_id = %settings.client_id))]
    async fn ensure_client(&self, settings: &ClientSettings) -> Result<bool, AdminError> {
        let request = self
            .client
            .get(self.realm_url(&["clients"])?)
            .query(&[("clientId", settings.client_id.as_str())]);
        let response = self.execute(FIND_CLIENT, request, &[StatusCode::OK]).await?;
        let existing: Vec<serde_json::Value> = Self::parse(FIND_CLIENT, response).await?;
        if !existing.is_empty() {
            info!(target: "gw.admin", client_id = %settings.client_id, "Client already exists");
            return Ok(false);
        }

        let request = self.client.post(self.realm_url(&["clients"])?).json(settings);
        let response = self
            .execute(
                CREATE_CLIENT,
                request,
                &[StatusCode::CREATED, StatusCode::CONFLICT],
            )
            .await?;
        let created = response.status() == StatusCode::CREATED;
        info!(target: "gw.admin", client_id = %settings.client_id, created, "Client ensured");
        Ok(created)
    }
}

/// In-memory admin API for tests.
///
/// Models the provider's idempotence rules (duplicate create converges,
/// absent delete succeeds) and records every call by operation name.
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, HashMap};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct State {
        next_id: u64,
        users: BTreeMap<String, UserRecord>,
        passwords: HashMap<String, (String, bool)>,
        roles: BTreeMap<String, RoleRecord>,
        groups: BTreeMap<String, GroupRecord>,
        user_roles: HashMap<String, BTreeSet<String>>,
        memberships: HashMap<String, BTreeSet<String>>,
        failures: HashMap<&'static str, AdminError>,
        calls: Vec<&'static str>,
        realms: BTreeSet<String>,
        clients: BTreeSet<String>,
    }

    impl State {
        fn begin(&mut self, operation: &'static str) -> Result<(), AdminError> {
            self.calls.push(operation);
            match self.failures.get(operation) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn allocate_id(&mut self, prefix: &str) -> String {
            self.next_id += 1;
            format!("{prefix}-{}", self.next_id)
        }

        fn user_exists(&self, user_id: &str) -> Result<(), AdminError> {
            if self.users.contains_key(user_id) {
                Ok(())
            } else {
                Err(AdminError::NotFound("User not found".to_string()))
            }
        }
    }

    /// In-memory [`AdminApi`].
    #[derive(Default)]
    pub struct MockAdminApi {
        state: Mutex<State>,
    }

    impl MockAdminApi {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a realm role.
        pub async fn with_role(self, name: &str) -> Self {
            {
                let mut state = self.state.lock().await;
                let id = state.allocate_id("role");
                state.roles.insert(
                    name.to_string(),
                    RoleRecord {
                        id,
                        name: name.to_string(),
                        description: None,
                        composite: false,
                    },
                );
            }
            self
        }

        /// Seed a group.
        pub async fn with_group(self, name: &str) -> Self {
            {
                let mut state = self.state.lock().await;
                let id = state.allocate_id("group");
                state.groups.insert(
                    id.clone(),
                    GroupRecord {
                        id,
                        name: name.to_string(),
                        path: Some(format!("/{name}")),
                    },
                );
            }
            self
        }

        /// Make every call to `operation` fail with `error`.
        pub async fn fail_on(&self, operation: &'static str, error: AdminError) {
            self.state.lock().await.failures.insert(operation, error);
        }

        /// Operation names in call order.
        pub async fn calls(&self) -> Vec<&'static str> {
            self.state.lock().await.calls.clone()
        }

        pub async fn call_count(&self, operation: &str) -> usize {
            self.state
                .lock()
                .await
                .calls
                .iter()
                .filter(|c| **c == operation)
                .count()
        }

        /// Stored password and temporary flag for a user.
        pub async fn password_of(&self, user_id: &str) -> Option<(String, bool)> {
            self.state.lock().await.passwords.get(user_id).cloned()
        }

        /// Role names mapped to a user.
        pub async fn roles_of(&self, user_id: &str) -> BTreeSet<String> {
            self.state
                .lock()
                .await
                .user_roles
                .get(user_id)
                .cloned()
                .unwrap_or_default()
        }

        /// Group ids a user belongs to.
        pub async fn groups_of(&self, user_id: &str) -> BTreeSet<String> {
            self.state
                .lock()
                .await
                .memberships
                .get(user_id)
                .cloned()
                .unwrap_or_default()
        }

        pub async fn user_count(&self) -> usize {
            self.state.lock().await.users.len()
        }

        pub async fn group_id(&self, name: &str) -> Option<String> {
            self.state
                .lock()
                .await
                .groups
                .values()
                .find(|g| g.name == name)
                .map(|g| g.id.clone())
        }

        pub async fn has_realm(&self, realm: &str) -> bool {
            self.state.lock().await.realms.contains(realm)
        }

        pub async fn has_client(&self, client_id: &str) -> bool {
            self.state.lock().await.clients.contains(client_id)
        }
    }

    #[async_trait]
    impl AdminApi for MockAdminApi {
        async fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("list_users")?;
            let needle = search.unwrap_or_default().to_lowercase();
            Ok(state
                .users
                .values()
                .filter(|u| {
                    needle.is_empty()
                        || u.username.to_lowercase().contains(&needle)
                        || u
                            .email
                            .as_deref()
                            .is_some_and(|e| e.to_lowercase().contains(&needle))
                })
                .cloned()
                .collect())
        }

        async fn find_user_by_username(
            &self,
            username: &str,
        ) -> Result<Option<UserRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("find_user_by_username")?;
            Ok(state
                .users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(username))
                .cloned())
        }

        async fn get_user(&self, user_id: &str) -> Result<UserRecord, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("get_user")?;
            state
                .users
                .get(user_id)
                .cloned()
                .ok_or_else(|| AdminError::NotFound("User not found".to_string()))
        }

        async fn create_user(&self, profile: &NewUser) -> Result<String, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("create_user")?;
            if let Some(existing) = state
                .users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(&profile.username))
            {
                return Ok(existing.id.clone());
            }
            let id = state.allocate_id("user");
            state.users.insert(
                id.clone(),
                UserRecord {
                    id: id.clone(),
                    username: profile.username.to_lowercase(),
                    email: profile.email.clone(),
                    first_name: profile.first_name.clone(),
                    last_name: profile.last_name.clone(),
                    enabled: profile.enabled,
                    email_verified: profile.email_verified,
                    extra: serde_json::Map::new(),
                },
            );
            Ok(id)
        }

        async fn update_user(&self, user_id: &str, record: &UserRecord) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("update_user")?;
            state.user_exists(user_id)?;
            state.users.insert(user_id.to_string(), record.clone());
            Ok(())
        }

        async fn delete_user(&self, user_id: &str) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("delete_user")?;
            state.users.remove(user_id);
            state.passwords.remove(user_id);
            state.user_roles.remove(user_id);
            state.memberships.remove(user_id);
            Ok(())
        }

        async fn reset_password(
            &self,
            user_id: &str,
            password: &SecretString,
            temporary: bool,
        ) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("reset_password")?;
            state.user_exists(user_id)?;
            state.passwords.insert(
                user_id.to_string(),
                (password.expose_secret().to_string(), temporary),
            );
            Ok(())
        }

        async fn list_realm_roles(&self) -> Result<Vec<RoleRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("list_realm_roles")?;
            Ok(state.roles.values().cloned().collect())
        }

        async fn get_realm_role(&self, name: &str) -> Result<Option<RoleRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("get_realm_role")?;
            Ok(state.roles.get(name).cloned())
        }

        async fn create_realm_role(
            &self,
            name: &str,
            description: Option<&str>,
        ) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("create_realm_role")?;
            if !state.roles.contains_key(name) {
                let id = state.allocate_id("role");
                state.roles.insert(
                    name.to_string(),
                    RoleRecord {
                        id,
                        name: name.to_string(),
                        description: description.map(ToString::to_string),
                        composite: false,
                    },
                );
            }
            Ok(())
        }

        async fn delete_realm_role(&self, name: &str) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("delete_realm_role")?;
            state.roles.remove(name);
            for roles in state.user_roles.values_mut() {
                roles.remove(name);
            }
            Ok(())
        }

        async fn get_user_realm_roles(&self, user_id: &str) -> Result<Vec<RoleRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("get_user_realm_roles")?;
            state.user_exists(user_id)?;
            let names = state.user_roles.get(user_id).cloned().unwrap_or_default();
            Ok(names
                .iter()
                .filter_map(|name| state.roles.get(name).cloned())
                .collect())
        }

        async fn add_realm_role_mappings(
            &self,
            user_id: &str,
            roles: &[RoleRecord],
        ) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("add_realm_role_mappings")?;
            state.user_exists(user_id)?;
            if let Some(missing) = roles.iter().find(|r| !state.roles.contains_key(&r.name)) {
                return Err(AdminError::NotFound(format!("Role {} not found", missing.name)));
            }
            state
                .user_roles
                .entry(user_id.to_string())
                .or_default()
                .extend(roles.iter().map(|r| r.name.clone()));
            Ok(())
        }

        async fn remove_realm_role_mappings(
            &self,
            user_id: &str,
            roles: &[RoleRecord],
        ) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("remove_realm_role_mappings")?;
            if let Some(mapped) = state.user_roles.get_mut(user_id) {
                for role in roles {
                    mapped.remove(&role.name);
                }
            }
            Ok(())
        }

        async fn list_groups(&self) -> Result<Vec<GroupRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("list_groups")?;
            Ok(state.groups.values().cloned().collect())
        }

        async fn get_group(&self, group_id: &str) -> Result<GroupRecord, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("get_group")?;
            state
                .groups
                .get(group_id)
                .cloned()
                .ok_or_else(|| AdminError::NotFound("Group not found".to_string()))
        }

        async fn create_group(&self, name: &str) -> Result<String, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("create_group")?;
            if let Some(existing) = state.groups.values().find(|g| g.name == name) {
                return Ok(existing.id.clone());
            }
            let id = state.allocate_id("group");
            state.groups.insert(
                id.clone(),
                GroupRecord {
                    id: id.clone(),
                    name: name.to_string(),
                    path: Some(format!("/{name}")),
                },
            );
            Ok(id)
        }

        async fn delete_group(&self, group_id: &str) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("delete_group")?;
            state.groups.remove(group_id);
            for groups in state.memberships.values_mut() {
                groups.remove(group_id);
            }
            Ok(())
        }

        async fn get_user_groups(&self, user_id: &str) -> Result<Vec<GroupRecord>, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("get_user_groups")?;
            state.user_exists(user_id)?;
            let ids = state.memberships.get(user_id).cloned().unwrap_or_default();
            Ok(ids
                .iter()
                .filter_map(|id| state.groups.get(id).cloned())
                .collect())
        }

        async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("add_user_to_group")?;
            state.user_exists(user_id)?;
            if !state.groups.contains_key(group_id) {
                return Err(AdminError::NotFound("Group not found".to_string()));
            }
            state
                .memberships
                .entry(user_id.to_string())
                .or_default()
                .insert(group_id.to_string());
            Ok(())
        }

        async fn remove_user_from_group(
            &self,
            user_id: &str,
            group_id: &str,
        ) -> Result<(), AdminError> {
            let mut state = self.state.lock().await;
            state.begin("remove_user_from_group")?;
            if let Some(groups) = state.memberships.get_mut(user_id) {
                groups.remove(group_id);
            }
            Ok(())
        }

        async fn ensure_realm(&self, settings: &RealmSettings) -> Result<bool, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("ensure_realm")?;
            Ok(state.realms.insert(settings.realm.clone()))
        }

        async fn ensure_client(&self, settings: &ClientSettings) -> Result<bool, AdminError> {
            let mut state = self.state.lock().await;
            state.begin("ensure_client")?;
            Ok(state.clients.insert(settings.client_id.clone()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockAdminApi;
    use super::*;
    use common::token_manager::mock::StaticCredentialProvider;

    fn client_for(base_url: &str) -> AdminClient {
        AdminClient::new(
            base_url,
            "iam".to_string(),
            Arc::new(StaticCredentialProvider::with_token("admin-token")),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    // =========================================================================
    // URL construction
    // =========================================================================

    #[test]
    fn test_realm_url_encodes_segments() {
        let client = client_for("http://localhost:8080");
        assert_eq!(
            client.realm_url(&["roles", "team lead"]).unwrap().as_str(),
            "http://localhost:8080/admin/realms/iam/roles/team%20lead"
        );
        assert_eq!(
            client.admin_url(&[]).unwrap().as_str(),
            "http://localhost:8080/admin/realms"
        );
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let client = client_for("http://localhost:8080/auth/");
        assert_eq!(
            client.realm_url(&["users"]).unwrap().as_str(),
            "http://localhost:8080/auth/admin/realms/iam/users"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = AdminClient::new(
            "not a url",
            "iam".to_string(),
            Arc::new(StaticCredentialProvider::with_token("t")),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AdminError::Unavailable(_))));
    }

    // =========================================================================
    // Mock behavior
    // =========================================================================

    #[tokio::test]
    async fn test_mock_create_user_is_idempotent() {
        let mock = MockAdminApi::new();
        let first = mock.create_user(&NewUser::new("Alice")).await.unwrap();
        let second = mock.create_user(&NewUser::new("alice")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_mock_failure_injection_and_call_log() {
        let mock = MockAdminApi::new().with_role("viewer").await;
        mock.fail_on("list_groups", AdminError::Unavailable("down".to_string()))
            .await;

        assert!(mock.get_realm_role("viewer").await.unwrap().is_some());
        assert!(mock.get_realm_role("ghost").await.unwrap().is_none());
        assert!(matches!(
            mock.list_groups().await,
            Err(AdminError::Unavailable(_))
        ));
        assert_eq!(
            mock.calls().await,
            vec!["get_realm_role", "get_realm_role", "list_groups"]
        );
    }

    #[tokio::test]
    async fn test_mock_deletes_of_absent_entities_succeed() {
        let mock = MockAdminApi::new();
        mock.delete_user("nope").await.unwrap();
        mock.delete_realm_role("nope").await.unwrap();
        mock.delete_group("nope").await.unwrap();
        mock.remove_user_from_group("u", "g").await.unwrap();
    }
}
