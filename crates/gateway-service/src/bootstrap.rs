//! Realm provisioning for development and first deployment.
//!
//! Brings a fresh identity provider to the state the gateway expects: the
//! realm, the end-user client, the standard roles and groups, and two seed
//! users. Every step tolerates existing state, so running it again
//! converges instead of failing.

use crate::auth::guard::AdminGrant;
use crate::config::Config;
use crate::models::{ClientSettings, NewUser, RealmSettings};
use crate::services::admin_client::{AdminApi, AdminError};
use crate::services::orchestrator::{CreateUserOutcome, CreateUserRequest, Orchestrator};
use common::secret::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Actor recorded in audit logs for bootstrap mutations.
const BOOTSTRAP_ACTOR: &str = "bootstrap";

pub const DEFAULT_READY_ATTEMPTS: u32 = 30;
pub const DEFAULT_READY_INTERVAL: Duration = Duration::from_secs(2);

/// Per-attempt timeout for the readiness probe.
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("identity provider not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error(transparent)]
    Admin(#[from] AdminError),
}

/// Where and how long to wait for the identity provider.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub url: String,
    pub attempts: u32,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SeedRole {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SeedUser {
    pub profile: NewUser,
    pub password: SecretString,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

/// Everything bootstrap creates, in creation order.
#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    /// `None` skips the readiness wait.
    pub readiness: Option<ReadinessProbe>,
    pub realm: RealmSettings,
    pub client: ClientSettings,
    pub roles: Vec<SeedRole>,
    pub groups: Vec<String>,
    pub users: Vec<SeedUser>,
}

impl BootstrapPlan {
    /// Standard development realm for `config`.
    ///
    /// The client is public unless a client secret is configured.
    pub fn standard(
        config: &Config,
        admin_password: SecretString,
        user_password: SecretString,
    ) -> Self {
        let seed_user = |username: &str, first: &str, last: &str| {
            let mut profile = NewUser::new(username);
            profile.email = Some(format!("{username}@example.com"));
            profile.first_name = Some(first.to_string());
            profile.last_name = Some(last.to_string());
            profile
        };

        Self {
            readiness: Some(ReadinessProbe {
                url: format!("{}/health/ready", config.keycloak_url),
                attempts: DEFAULT_READY_ATTEMPTS,
                interval: DEFAULT_READY_INTERVAL,
            }),
            realm: RealmSettings {
                realm: config.realm.clone(),
                enabled: true,
                display_name: "IAM Realm".to_string(),
                access_token_lifespan: 300,
                sso_session_idle_timeout: 1800,
                sso_session_max_lifespan: 36_000,
            },
            client: ClientSettings {
                client_id: config.client_id.clone(),
                enabled: true,
                public_client: config.client_secret.is_none(),
                direct_access_grants_enabled: true,
                standard_flow_enabled: true,
                redirect_uris: vec!["http://localhost:3000/*".to_string()],
                web_origins: vec!["http://localhost:3000".to_string()],
                secret: config
                    .client_secret
                    .as_ref()
                    .map(|s| s.expose_secret().to_string()),
            },
            roles: vec![
                SeedRole {
                    name: "realm-admin".to_string(),
                    description: "Full realm administration".to_string(),
                },
                SeedRole {
                    name: "user-manager".to_string(),
                    description: "Manage users".to_string(),
                },
                SeedRole {
                    name: "viewer".to_string(),
                    description: "Read-only access".to_string(),
                },
            ],
            groups: vec![
                "admins".to_string(),
                "developers".to_string(),
                "analysts".to_string(),
            ],
            users: vec![
                SeedUser {
                    profile: seed_user("admin", "Admin", "User"),
                    password: admin_password,
                    roles: vec!["realm-admin".to_string()],
                    groups: vec!["admins".to_string()],
                },
                SeedUser {
                    profile: seed_user("john", "John", "Doe"),
                    password: user_password,
                    roles: vec!["user-manager".to_string()],
                    groups: vec!["developers".to_string()],
                },
            ],
        }
    }
}

/// What a bootstrap run did.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub realm_created: bool,
    pub client_created: bool,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub users: Vec<CreateUserOutcome>,
}

/// Poll the readiness URL until it answers 200.
///
/// # Errors
///
/// `NotReady` once every attempt has failed.
#[instrument(skip_all, fields(url = %probe.url))]
pub async fn wait_for_ready(probe: &ReadinessProbe) -> Result<(), BootstrapError> {
    let client = reqwest::Client::builder()
        .timeout(READY_PROBE_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!(target: "gw.bootstrap", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        });

    for attempt in 1..=probe.attempts {
        match client.get(&probe.url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(target: "gw.bootstrap", attempt, "Identity provider is ready");
                return Ok(());
            }
            Ok(response) => {
                debug!(target: "gw.bootstrap", attempt, status = %response.status(), "Not ready yet");
            }
            Err(e) => {
                debug!(target: "gw.bootstrap", attempt, error = %e, "Not reachable yet");
            }
        }

        if attempt < probe.attempts {
            tokio::time::sleep(probe.interval).await;
        }
    }

    warn!(target: "gw.bootstrap", attempts = probe.attempts, "Identity provider never became ready");
    Err(BootstrapError::NotReady {
        attempts: probe.attempts,
    })
}

/// Apply `plan`.
///
/// Role and group assignment for seed users is best-effort; anything that
/// did not apply is in the corresponding [`CreateUserOutcome`].
///
/// # Errors
///
/// Returns the first readiness, realm, client, role, group, or user creation
/// failure.
#[instrument(skip_all, fields(realm = %plan.realm.realm))]
pub async fn run(
    orchestrator: &Orchestrator,
    admin: &dyn AdminApi,
    plan: &BootstrapPlan,
) -> Result<BootstrapReport, BootstrapError> {
    if let Some(probe) = &plan.readiness {
        wait_for_ready(probe).await?;
    }

    let grant = AdminGrant::service(BOOTSTRAP_ACTOR);
    let mut report = BootstrapReport {
        realm_created: admin.ensure_realm(&plan.realm).await?,
        ..Default::default()
    };
    info!(target: "gw.bootstrap", created = report.realm_created, "Realm ensured");

    report.client_created = admin.ensure_client(&plan.client).await?;
    info!(
        target: "gw.bootstrap",
        client_id = %plan.client.client_id,
        created = report.client_created,
        "Client ensured"
    );

    for role in &plan.roles {
        let record = orchestrator
            .create_role(&grant, &role.name, Some(&role.description))
            .await?;
        report.roles.push(record.name);
    }

    for name in &plan.groups {
        let group = orchestrator.create_group(&grant, name).await?;
        report.groups.push(group.name);
    }

    for seed in &plan.users {
        let request = CreateUserRequest {
            profile: seed.profile.clone(),
            password: seed.password.clone(),
            role_names: seed.roles.clone(),
            group_names: seed.groups.clone(),
        };
        let outcome = orchestrator.create_user_complete(&grant, &request).await?;
        if !outcome.failures.is_empty() {
            warn!(
                target: "gw.bootstrap",
                username = %seed.profile.username,
                failures = outcome.failures.len(),
                "Seed user provisioned with failures"
            );
        }
        report.users.push(outcome);
    }

    info!(
        target: "gw.bootstrap",
        roles = report.roles.len(),
        groups = report.groups.len(),
        users = report.users.len(),
        "Bootstrap complete"
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::admin_client::mock::MockAdminApi;
    use std::collections::HashMap;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        let vars: HashMap<String, String> = [
            ("KEYCLOAK_URL", "http://keycloak:8080"),
            ("KEYCLOAK_REALM", "iam"),
            ("KEYCLOAK_CLIENT_ID", "iam-frontend"),
            ("KEYCLOAK_ADMIN_USER", "admin"),
            ("KEYCLOAK_ADMIN_PASSWORD", "admin"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Config::from_vars(&vars).unwrap()
    }

    fn offline_plan() -> BootstrapPlan {
        let mut plan = BootstrapPlan::standard(
            &test_config(),
            SecretString::from("admin123"),
            SecretString::from("password123"),
        );
        plan.readiness = None;
        plan
    }

    // =========================================================================
    // Plan
    // =========================================================================

    #[test]
    fn test_standard_plan_contents() {
        let plan = BootstrapPlan::standard(
            &test_config(),
            SecretString::from("a"),
            SecretString::from("b"),
        );

        let probe = plan.readiness.as_ref().unwrap();
        assert_eq!(probe.url, "http://keycloak:8080/health/ready");
        assert_eq!(probe.attempts, 30);
        assert_eq!(probe.interval, Duration::from_secs(2));

        assert_eq!(plan.realm.realm, "iam");
        assert_eq!(plan.realm.access_token_lifespan, 300);
        assert_eq!(plan.realm.sso_session_idle_timeout, 1800);

        assert!(plan.client.public_client);
        assert!(plan.client.direct_access_grants_enabled);
        assert!(plan.client.secret.is_none());
        assert_eq!(plan.client.redirect_uris, vec!["http://localhost:3000/*"]);

        let roles: Vec<&str> = plan.roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(roles, vec!["realm-admin", "user-manager", "viewer"]);
        assert_eq!(plan.groups, vec!["admins", "developers", "analysts"]);

        let admin = plan.users.first().unwrap();
        assert_eq!(admin.profile.username, "admin");
        assert_eq!(admin.roles, vec!["realm-admin"]);
        assert_eq!(admin.groups, vec!["admins"]);
    }

    #[test]
    fn test_confidential_client_when_secret_configured() {
        let mut config = test_config();
        config.client_secret = Some(SecretString::from("cs"));
        let plan =
            BootstrapPlan::standard(&config, SecretString::from("a"), SecretString::from("b"));

        assert!(!plan.client.public_client);
        assert_eq!(plan.client.secret.as_deref(), Some("cs"));
    }

    // =========================================================================
    // Run
    // =========================================================================

    #[tokio::test]
    async fn test_run_provisions_everything() {
        let admin = Arc::new(MockAdminApi::new());
        let orchestrator = Orchestrator::new(admin.clone());

        let report = run(&orchestrator, admin.as_ref(), &offline_plan())
            .await
            .unwrap();

        assert!(report.realm_created);
        assert!(report.client_created);
        assert_eq!(report.roles.len(), 3);
        assert_eq!(report.groups.len(), 3);
        assert_eq!(report.users.len(), 2);
        assert!(report.users.iter().all(|u| u.failures.is_empty()));

        let admin_user = report.users.first().unwrap();
        assert!(admin.roles_of(&admin_user.user_id).await.contains("realm-admin"));
        assert_eq!(
            admin.password_of(&admin_user.user_id).await,
            Some(("admin123".to_string(), false))
        );
    }

    #[tokio::test]
    async fn test_second_run_converges() {
        let admin = Arc::new(MockAdminApi::new());
        let orchestrator = Orchestrator::new(admin.clone());
        let plan = offline_plan();

        let first = run(&orchestrator, admin.as_ref(), &plan).await.unwrap();
        let second = run(&orchestrator, admin.as_ref(), &plan).await.unwrap();

        assert!(!second.realm_created);
        assert!(!second.client_created);
        let first_ids: Vec<&str> = first.users.iter().map(|u| u.user_id.as_str()).collect();
        let second_ids: Vec<&str> = second.users.iter().map(|u| u.user_id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(admin.user_count().await, 2);
    }

    #[tokio::test]
    async fn test_realm_failure_stops_run() {
        let admin = Arc::new(MockAdminApi::new());
        admin
            .fail_on("ensure_realm", AdminError::Unavailable("down".to_string()))
            .await;
        let orchestrator = Orchestrator::new(admin.clone());

        let err = run(&orchestrator, admin.as_ref(), &offline_plan())
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Admin(AdminError::Unavailable(_))));
        assert_eq!(admin.call_count("ensure_client").await, 0);
    }

    // =========================================================================
    // Readiness
    // =========================================================================

    #[tokio::test]
    async fn test_wait_for_ready_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let probe = ReadinessProbe {
            url: format!("{}/health/ready", server.uri()),
            attempts: 3,
            interval: Duration::from_millis(10),
        };
        wait_for_ready(&probe).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_ready_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/ready"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let probe = ReadinessProbe {
            url: format!("{}/health/ready", server.uri()),
            attempts: 3,
            interval: Duration::from_millis(10),
        };
        let err = wait_for_ready(&probe).await.unwrap_err();
        assert!(matches!(err, BootstrapError::NotReady { attempts: 3 }));
    }
}
