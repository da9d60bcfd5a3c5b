//! Realm bootstrap
//!
//! Provisions the realm, client, roles, groups, and seed users the gateway
//! expects. Safe to run repeatedly.

use common::secret::SecretString;
use common::token_manager::PasswordGrantProvider;
use gateway_service::bootstrap::{self, BootstrapPlan};
use gateway_service::config::Config;
use gateway_service::services::admin_client::AdminClient;
use gateway_service::services::orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADMIN_SEED_PASSWORD: &str = "admin123";
const DEFAULT_USER_SEED_PASSWORD: &str = "password123";

fn seed_password(var: &str, default: &str) -> SecretString {
    SecretString::from(std::env::var(var).unwrap_or_else(|_| default.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gw=info,common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().inspect_err(|e| {
        error!("Failed to load configuration: {}", e);
    })?;

    let credentials = PasswordGrantProvider::new(config.admin_grant_config())?;
    let admin = Arc::new(AdminClient::new(
        &config.keycloak_url,
        config.realm.clone(),
        Arc::new(credentials),
        config.http_timeout,
    )?);
    let orchestrator = Orchestrator::new(admin.clone());

    let plan = BootstrapPlan::standard(
        &config,
        seed_password("BOOTSTRAP_ADMIN_PASSWORD", DEFAULT_ADMIN_SEED_PASSWORD),
        seed_password("BOOTSTRAP_USER_PASSWORD", DEFAULT_USER_SEED_PASSWORD),
    );

    let report = bootstrap::run(&orchestrator, admin.as_ref(), &plan)
        .await
        .inspect_err(|e| {
            error!("Bootstrap failed: {}", e);
        })?;

    info!(
        realm = %config.realm,
        realm_created = report.realm_created,
        client_created = report.client_created,
        users = report.users.len(),
        "Realm ready"
    );
    for seed in &plan.users {
        info!(username = %seed.profile.username, roles = ?seed.roles, "Seed user available");
    }

    Ok(())
}
