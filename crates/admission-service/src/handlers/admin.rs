//! Operational endpoints.
//!
//! `POST /internal/sweep` lets an external scheduler (cron job, k8s CronJob)
//! reclaim expired tickets when the in-process sweeper is disabled. Sweeping
//! is idempotent, so concurrent runs from several instances are harmless.

use crate::errors::AdmissionError;
use crate::models::SweepResponse;
use crate::observability::metrics::record_error;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /internal/sweep
///
/// Removes tickets older than the configured maximum age.
#[instrument(skip_all, name = "admission.admin.sweep")]
pub async fn sweep_tickets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, AdmissionError> {
    match state.controller.sweep_stale().await {
        Ok(removed) => {
            tracing::info!(target: "admission.handlers.admin", removed = removed, "On-demand sweep complete");
            Ok(Json(SweepResponse { removed }))
        }
        Err(e) => {
            record_error("sweep", e.error_type(), e.status_code());
            Err(e)
        }
    }
}
