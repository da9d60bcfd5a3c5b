//! IAM Gateway
//!
//! Serves the gateway HTTP API in front of a Keycloak realm.

use common::token_manager::PasswordGrantProvider;
use gateway_service::config::Config;
use gateway_service::observability::metrics::{credential_refresh_callback, init_metrics_recorder};
use gateway_service::routes::{self, AppState};
use gateway_service::services::admin_client::AdminClient;
use gateway_service::services::token_client::TokenClient;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DRAIN_SECONDS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting IAM Gateway");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        keycloak_url = %config.keycloak_url,
        realm = %config.realm,
        bind_address = %config.bind_address,
        verify_audience = config.verify_audience,
        "Configuration loaded successfully"
    );

    // Install before anything records
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    // Admin credential is acquired lazily on the first admin call
    let credentials = PasswordGrantProvider::new(config.admin_grant_config())
        .map_err(|e| {
            error!("Failed to build admin credential provider: {}", e);
            e
        })?
        .with_refresh_callback(credential_refresh_callback());

    let admin = AdminClient::new(
        &config.keycloak_url,
        config.realm.clone(),
        Arc::new(credentials),
        config.http_timeout,
    )
    .map_err(|e| {
        error!("Failed to build admin client: {}", e);
        e
    })?;

    let issuer = TokenClient::new(
        config.token_url(),
        config.client_id.clone(),
        config.client_secret.clone(),
        config.http_timeout,
    );

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config, Arc::new(issuer), Arc::new(admin)));
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("IAM Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("IAM Gateway shutdown complete");

    Ok(())
}

/// Plain text by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gateway_service=info,gw=info,common=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Drain period after a shutdown signal, from `GW_DRAIN_SECONDS`.
fn drain_period() -> Duration {
    let secs = std::env::var("GW_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_DRAIN_SECONDS);
    Duration::from_secs(secs)
}

/// Resolves on SIGINT or SIGTERM, after in-flight logins and admin calls
/// have had the drain period to finish.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let received = tokio::select! {
        sig = interrupt => sig,
        sig = terminate => sig,
    };

    let drain = drain_period();
    if drain.is_zero() {
        info!(signal = received, "Shutting down gateway without drain");
        return;
    }
    warn!(signal = received, drain_secs = drain.as_secs(), "Shutting down gateway, draining requests");
    tokio::time::sleep(drain).await;
    info!("Drain period complete");
}
