//! Ticket sweeper background task.
//!
//! Each pass makes two deletions:
//!
//! - `InProgress` tickets older than the in-progress max age. These belong to
//!   attaches that were granted but never confirmed or aborted (the instance
//!   died mid-attach), and are reclaimed within minutes.
//! - Any ticket older than the maximum ticket age.
//!
//! Both horizons exceed the worst-case attach time, so a running attach never
//! loses its ticket.
//!
//! Sweeping is idempotent, so every instance may run the sweeper.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered, after finishing
//! any sweep already in progress.

use crate::config::Config;
use crate::services::AdmissionController;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Configuration for the ticket sweeper.
#[derive(Debug, Clone)]
pub struct TicketSweeperConfig {
    /// Time between sweeps.
    pub interval: Duration,
}

impl TicketSweeperConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.sweep_interval_seconds),
        }
    }
}

/// Start the ticket sweeper background task.
///
/// Runs `sweep_stale` on the controller once per interval until the
/// cancellation token is triggered. Sweep failures are logged and the loop
/// continues.
#[instrument(skip_all, name = "admission.task.ticket_sweeper")]
pub async fn start_ticket_sweeper(
    controller: Arc<AdmissionController>,
    config: TicketSweeperConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "admission.task.ticket_sweeper",
        interval_seconds = config.interval.as_secs(),
        max_ticket_age_seconds = controller.policy().max_ticket_age.as_secs(),
        in_progress_max_age_seconds = controller.policy().in_progress_max_age.as_secs(),
        "Starting ticket sweeper task"
    );

    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&controller).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "admission.task.ticket_sweeper",
                    "Ticket sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "admission.task.ticket_sweeper", "Ticket sweeper stopped");
}

/// Run a single sweep iteration.
pub(crate) async fn run_sweep(controller: &AdmissionController) {
    match controller.sweep_stale().await {
        Ok(count) if count > 0 => {
            tracing::warn!(
                target: "admission.task.ticket_sweeper",
                swept_count = count,
                "Reclaimed stale admission tickets"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(
                target: "admission.task.ticket_sweeper",
                error = %e,
                "Failed to sweep stale tickets"
            );
        }
    }
}
