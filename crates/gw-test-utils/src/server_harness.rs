//! Test server harness
//!
//! Builds the real gateway router against a [`MockAuthority`] and an
//! injected admin API, either for in-process `oneshot` calls or bound to a
//! random local port.

use crate::mock_authority::{MockAuthority, TEST_CLIENT_ID};
use axum::Router;
use gateway_service::config::Config;
use gateway_service::routes::{build_routes, AppState};
use gateway_service::services::admin_client::AdminApi;
use gateway_service::services::token_client::TokenClient;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Gateway configuration pointing at `keycloak_url`, with short timeouts.
pub fn test_config(keycloak_url: &str, realm: &str) -> Config {
    let vars: HashMap<String, String> = [
        ("KEYCLOAK_URL", keycloak_url),
        ("KEYCLOAK_REALM", realm),
        ("KEYCLOAK_CLIENT_ID", TEST_CLIENT_ID),
        ("KEYCLOAK_ADMIN_USER", "admin"),
        ("KEYCLOAK_ADMIN_PASSWORD", "admin"),
        ("HTTP_TIMEOUT_SECONDS", "2"),
        ("BIND_ADDRESS", "127.0.0.1:0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Config::from_vars(&vars).expect("test config should be valid")
}

/// Application state wired to `authority` for tokens and `admin` for
/// administration.
pub fn test_state(authority: &MockAuthority, admin: Arc<dyn AdminApi>) -> Arc<AppState> {
    let config = test_config(&authority.uri(), authority.realm());
    let issuer = TokenClient::new(
        config.token_url(),
        config.client_id.clone(),
        config.client_secret.clone(),
        Duration::from_secs(2),
    );
    Arc::new(AppState::new(config, Arc::new(issuer), admin))
}

/// Full router for `oneshot` tests.
///
/// The metrics handle is standalone; nothing is installed globally.
pub fn test_router(authority: &MockAuthority, admin: Arc<dyn AdminApi>) -> Router {
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    build_routes(test_state(authority, admin), metrics_handle)
}

/// Gateway bound to a random local port.
///
/// # Example
/// ```rust,ignore
/// let authority = MockAuthority::start().await;
/// let server = TestGatewayServer::spawn(&authority, Arc::new(MockAdminApi::new())).await?;
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestGatewayServer {
    pub async fn spawn(
        authority: &MockAuthority,
        admin: Arc<dyn AdminApi>,
    ) -> Result<Self, anyhow::Error> {
        let app = test_router(authority, admin);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
