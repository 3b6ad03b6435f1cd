//! Health check handlers.
//!
//! - `/health`: liveness, returns OK while the process is running
//! - `/ready`: readiness, checks the database and the hub loop

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does not check dependencies. Failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Returns 200 if the database answers and the hub is running, 503 otherwise.
/// Error text is generic; the cause is logged.
#[tracing::instrument(skip_all, name = "chat.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        tracing::warn!(target: "chat.handlers", error = %e, "Readiness check failed: database error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("unhealthy"),
                hub: None,
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    if !state.hub.is_running() {
        tracing::warn!(target: "chat.handlers", "Readiness check failed: hub is not running");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("healthy"),
                hub: Some("stopped"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            hub: Some("running"),
            error: None,
        }),
    )
}
