//! HTTP routes for the chat service.
//!
//! Defines the Axum router and application state.

use crate::auth::JwtValidator;
use crate::config::Config;
use crate::handlers;
use crate::hub::HubHandle;
use crate::services::{ChatService, IdentityResolver};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, used by the readiness probe.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Handle to the running hub.
    pub hub: HubHandle,

    /// Persistence use cases handed to each session.
    pub chat: ChatService,

    /// Display name lookup for authenticated sessions.
    pub identity: Arc<dyn IdentityResolver>,

    pub jwt_validator: Arc<JwtValidator>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/ready` - Readiness probe (checks DB and hub)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/chat/ws` - Chat connection upgrade
/// - TraceLayer for request logging
/// - 30 second request timeout (upgraded connections are not affected)
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/chat/ws", get(handlers::chat_upgrade))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    public_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
