//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns healthy if the process is running
//! - `/ready`: Readiness probe - checks the lock store is reachable

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

/// Liveness probe handler.
///
/// Does NOT check dependencies: failure means the process is hung.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        instance_id: state.config.instance_id.clone(),
        lock_store: None,
    })
}

/// Readiness probe handler.
///
/// Returns 200 if the lock store answers, 503 otherwise. An instance that
/// cannot reach the store denies every admission, so it should not receive
/// traffic.
#[tracing::instrument(skip_all, name = "admission.health.readiness")]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.controller.check_store().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                instance_id: state.config.instance_id.clone(),
                lock_store: Some("healthy".to_string()),
            }),
        ),
        Err(e) => {
            // Log actual error server-side for operators
            tracing::warn!(target: "admission.health", error = %e, "Readiness check failed: lock store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    instance_id: state.config.instance_id.clone(),
                    lock_store: Some("unhealthy".to_string()),
                }),
            )
        }
    }
}
