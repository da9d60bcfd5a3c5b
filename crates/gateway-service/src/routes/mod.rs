//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::jwks::KeySetCache;
use crate::auth::jwt::{TokenVerifier, VerifierSettings};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::services::admin_client::AdminApi;
use crate::services::auth_service::AuthService;
use crate::services::orchestrator::Orchestrator;
use crate::services::token_client::TokenIssuer;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    /// Login, refresh, token verification, and role checks.
    pub auth_service: Arc<AuthService>,

    /// User, role, and group administration.
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the verifier, auth service, and orchestrator for `config`.
    ///
    /// The key set cache starts empty and fills on the first verification.
    pub fn new(config: Config, issuer: Arc<dyn TokenIssuer>, admin: Arc<dyn AdminApi>) -> Self {
        let keys = Arc::new(KeySetCache::new(config.jwks_url(), config.http_timeout));
        let verifier = Arc::new(TokenVerifier::new(
            keys,
            VerifierSettings::from_config(&config),
        ));

        Self {
            auth_service: Arc::new(AuthService::new(verifier, issuer)),
            orchestrator: Arc::new(Orchestrator::new(admin)),
            config,
        }
    }
}

/// Build the CORS layer from the configured origins.
///
/// Origins that are not valid header values are dropped with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(target: "gw.routes", origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public, unversioned
/// - `/metrics` - Prometheus metrics - public, unversioned
/// - `/api/v1/auth/login`, `/api/v1/auth/refresh` - public
/// - everything else under `/api/v1` - requires a bearer token; mutations
///   additionally check the elevated role in the handler
/// - TraceLayer for request logging
/// - 30 second request timeout
/// - CORS for the configured browser origins
/// - HTTP metrics middleware (outermost)
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        auth_service: state.auth_service.clone(),
    });
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/auth/login", post(handlers::login))
        .route("/api/v1/auth/refresh", post(handlers::refresh))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::get_me))
        .route("/api/v1/auth/logout", post(handlers::logout))
        // Users
        .route(
            "/api/v1/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/api/v1/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route("/api/v1/users/:id/password", put(handlers::reset_password))
        .route(
            "/api/v1/users/:id/roles",
            get(handlers::get_user_roles)
                .post(handlers::assign_roles)
                .delete(handlers::remove_roles),
        )
        .route("/api/v1/users/:id/groups", get(handlers::get_user_groups))
        .route(
            "/api/v1/users/:id/groups/:group_id",
            put(handlers::add_member).delete(handlers::remove_member),
        )
        // Roles
        .route(
            "/api/v1/roles",
            get(handlers::list_roles).post(handlers::create_role),
        )
        .route("/api/v1/roles/:name", delete(handlers::delete_role))
        // Groups
        .route(
            "/api/v1/groups",
            get(handlers::list_groups).post(handlers::create_group),
        )
        .route("/api/v1/groups/:id", delete(handlers::delete_group))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. TraceLayer
    // 3. CorsLayer answers preflight before auth runs
    // 4. http_metrics_middleware (outermost), sees every response
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(http_metrics_middleware))
}
