//! Agent connect flow.
//!
//! Brackets the attach operation with an admission ticket:
//!
//! 1. Request admission; a denial returns immediately with no side effects
//! 2. Attach the agent, retrying transient failures with linear backoff
//! 3. On success confirm the ticket, on failure abort it
//!
//! Steps 2 and 3 run on their own task once admission is granted, so a
//! caller that goes away (client disconnect, request timeout) cannot cancel
//! the attach between grant and confirm/abort. If the process itself dies
//! there, the `InProgress` ticket keeps blocking the meeting until the
//! abandoned-attach sweep reclaims it.

use crate::config::{self, Config};
use crate::errors::AdmissionError;
use crate::models::{AdmissionDecision, DenialReason};
use crate::observability::metrics::record_attach;
use crate::services::admission_controller::AdmissionController;
use crate::services::agent_attacher::{AgentAttacher, AttachError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, Instrument, Span};

/// Base delay between attach attempts; attempt `n` waits `n * backoff`.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(config::ATTACH_RETRY_BACKOFF_MS);

/// Result of a connect request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The agent is attached and the ticket confirmed.
    Attached,

    /// Admission was denied; nothing was attempted.
    Denied(DenialReason),
}

/// Attach tuning.
#[derive(Debug, Clone, Copy)]
pub struct AttachPolicy {
    /// Timeout of a single attach attempt.
    pub timeout: Duration,

    /// Total attempts on transient failure (1 = no retry).
    pub max_attempts: u32,

    pub retry_backoff: Duration,
}

impl AttachPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.attach_timeout(),
            max_attempts: config.attach_max_attempts,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Connects agents to meetings at most once.
#[derive(Clone)]
pub struct AgentConnectService {
    controller: Arc<AdmissionController>,
    attacher: Arc<dyn AgentAttacher>,
    policy: AttachPolicy,
}

impl AgentConnectService {
    pub fn new(
        controller: Arc<AdmissionController>,
        attacher: Arc<dyn AgentAttacher>,
        policy: AttachPolicy,
    ) -> Self {
        Self {
            controller,
            attacher,
            policy,
        }
    }

    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }

    /// Connect `owner_id` to the meeting `resource_key`.
    ///
    /// # Returns
    ///
    /// - `ConnectOutcome::Attached` once the agent is attached
    /// - `ConnectOutcome::Denied` when another attach is in progress or done,
    ///   or admission could not be decided safely
    ///
    /// # Errors
    ///
    /// - `AdmissionError::AttachFailed` - attach failed; the ticket was aborted
    /// - `AdmissionError::Internal` - the attach task did not finish
    #[instrument(skip_all, fields(resource_key = %resource_key, owner_id = %owner_id))]
    pub async fn connect_agent(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<ConnectOutcome, AdmissionError> {
        if let AdmissionDecision::Denied(reason) = self
            .controller
            .request_admission(resource_key, owner_id)
            .await
        {
            return Ok(ConnectOutcome::Denied(reason));
        }

        let service = self.clone();
        let key = resource_key.to_string();
        let owner = owner_id.to_string();
        let bracket = tokio::spawn(
            async move { service.attach_and_settle(&key, &owner).await }.instrument(Span::current()),
        );

        bracket.await.map_err(|e| {
            tracing::error!(
                target: "admission.service.connect",
                resource_key = %resource_key,
                error = %e,
                "Attach task did not complete"
            );
            AdmissionError::Internal
        })?
    }

    /// Attach an admitted agent, then confirm or abort its ticket.
    async fn attach_and_settle(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<ConnectOutcome, AdmissionError> {
        let start = Instant::now();
        let (result, attempts) = self.attach_with_retry(resource_key, owner_id).await;

        match result {
            Ok(()) => {
                record_attach("success", attempts, start.elapsed());

                if let Err(e) = self.controller.confirm_admission(resource_key).await {
                    // The agent is in the call; the unconfirmed ticket still
                    // blocks re-admission until it is released or swept.
                    tracing::error!(
                        target: "admission.service.connect",
                        resource_key = %resource_key,
                        error = %e,
                        "Agent attached but ticket could not be confirmed"
                    );
                }

                tracing::info!(
                    target: "admission.service.connect",
                    resource_key = %resource_key,
                    owner_id = %owner_id,
                    attempts = attempts,
                    "Agent attached"
                );
                Ok(ConnectOutcome::Attached)
            }
            Err(failure) => {
                record_attach(failure.status_label(), attempts, start.elapsed());

                tracing::warn!(
                    target: "admission.service.connect",
                    resource_key = %resource_key,
                    owner_id = %owner_id,
                    attempts = attempts,
                    error = %failure,
                    "Agent attach failed, aborting admission"
                );

                if let Err(e) = self.controller.abort_admission(resource_key).await {
                    tracing::error!(
                        target: "admission.service.connect",
                        resource_key = %resource_key,
                        error = %e,
                        "Failed to abort admission; ticket left for the sweep"
                    );
                }

                Err(AdmissionError::AttachFailed(failure.to_string()))
            }
        }
    }

    /// Run attach attempts until success, a permanent failure, or the
    /// attempt budget is spent. Returns the result and attempts made.
    async fn attach_with_retry(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> (Result<(), AttachFailure>, u32) {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let failure = match tokio::time::timeout(
                self.policy.timeout,
                self.attacher.attach(resource_key, owner_id),
            )
            .await
            {
                Ok(Ok(())) => return (Ok(()), attempt),
                Ok(Err(e)) => AttachFailure::Attach(e),
                Err(_) => AttachFailure::Timeout(self.policy.timeout),
            };

            if !failure.is_retryable() || attempt >= max_attempts {
                return (Err(failure), attempt);
            }

            tracing::debug!(
                target: "admission.service.connect",
                resource_key = %resource_key,
                attempt = attempt,
                error = %failure,
                "Retrying agent attach"
            );

            tokio::time::sleep(self.policy.retry_backoff * attempt).await;
            attempt += 1;
        }
    }
}

#[derive(Debug)]
enum AttachFailure {
    Attach(AttachError),
    Timeout(Duration),
}

impl AttachFailure {
    fn is_retryable(&self) -> bool {
        match self {
            AttachFailure::Attach(e) => e.is_retryable(),
            AttachFailure::Timeout(_) => true,
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            AttachFailure::Attach(e) => e.kind(),
            AttachFailure::Timeout(_) => "timeout",
        }
    }
}

impl std::fmt::Display for AttachFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachFailure::Attach(e) => write!(f, "{e}"),
            AttachFailure::Timeout(limit) => {
                write!(f, "attach timed out after {}s", limit.as_secs())
            }
        }
    }
}
