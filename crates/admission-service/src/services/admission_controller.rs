//! Admission Controller.
//!
//! Decides whether a caller may start attaching an agent to a meeting, and
//! exposes the lifecycle transitions of the resulting ticket.
//!
//! # Decision Flow
//!
//! 1. Rate limiter: a recent allowed attempt denies with `rate_limited`
//!    without touching the store
//! 2. Fast-path read: an existing ticket denies with `already_admitted`
//! 3. Atomic insert: losing the insert denies with `lost_race`
//! 4. Winning the insert grants admission
//!
//! Any store error along the way denies with `store_unavailable`. The
//! controller fails closed: a grant is only ever produced by a successful
//! atomic insert, so the at-most-one guarantee rests on the store alone.
//!
//! # Ticket Lifecycle
//!
//! ```text
//! (absent) --grant--> InProgress --confirm--> Completed --release--> (absent)
//!                         |                                   ^
//!                         +------------abort------------------+
//! InProgress --sweep (issued_at older than in-progress max age)--> (absent)
//! any state  --sweep (issued_at older than max age)--> (absent)
//! ```
//!
//! Both sweep horizons are longer than the worst-case attach time
//! (`Config::attach_budget`), so a sweep never deletes the ticket of an attach
//! that is still running.

use crate::config::Config;
use crate::errors::AdmissionError;
use crate::models::{AdmissionDecision, AdmissionTicket, DenialReason};
use crate::observability::metrics::{record_admission_decision, record_tickets_swept};
use crate::repositories::LockStore;
use crate::services::rate_limiter::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Tunables for admission decisions.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    /// Minimum interval between allowed attempts for one meeting.
    pub min_interval: Duration,

    /// Age after which any ticket is reclaimed by the sweep.
    pub max_ticket_age: Duration,

    /// Age after which an unconfirmed ticket is reclaimed by the sweep.
    pub in_progress_max_age: Duration,
}

impl AdmissionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.admission_min_interval(),
            max_ticket_age: config.ticket_max_age(),
            in_progress_max_age: config.in_progress_max_age(),
        }
    }
}

/// At-most-once admission over a shared lock store.
pub struct AdmissionController {
    store: Arc<dyn LockStore>,
    limiter: RateLimiter,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    /// Create a controller.
    ///
    /// # Arguments
    ///
    /// * `store` - Lock store shared with every other instance
    /// * `limiter` - Process-local rate limiter
    /// * `policy` - Rate limit interval and ticket expiry
    pub fn new(store: Arc<dyn LockStore>, limiter: RateLimiter, policy: AdmissionPolicy) -> Self {
        Self {
            store,
            limiter,
            policy,
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Decide whether `owner_id` may be attached to `resource_key`.
    ///
    /// On `Granted` the caller holds the ticket and must eventually call
    /// `confirm_admission` or `abort_admission`.
    #[instrument(skip_all, fields(resource_key = %resource_key, owner_id = %owner_id))]
    pub async fn request_admission(&self, resource_key: &str, owner_id: &str) -> AdmissionDecision {
        let decision = self.decide(resource_key, owner_id).await;
        record_admission_decision(decision.outcome_label());

        match decision {
            AdmissionDecision::Granted => tracing::info!(
                target: "admission.service.controller",
                resource_key = %resource_key,
                owner_id = %owner_id,
                "Admission granted"
            ),
            AdmissionDecision::Denied(DenialReason::StoreUnavailable) => tracing::warn!(
                target: "admission.service.controller",
                resource_key = %resource_key,
                owner_id = %owner_id,
                "Admission denied: lock store unavailable"
            ),
            AdmissionDecision::Denied(reason) => tracing::info!(
                target: "admission.service.controller",
                resource_key = %resource_key,
                owner_id = %owner_id,
                reason = %reason,
                "Admission denied"
            ),
        }

        decision
    }

    async fn decide(&self, resource_key: &str, owner_id: &str) -> AdmissionDecision {
        if !self
            .limiter
            .allow(resource_key, self.policy.min_interval)
            .await
        {
            return AdmissionDecision::Denied(DenialReason::RateLimited);
        }

        // Fast path only; the insert below is what actually decides
        match self.store.get(resource_key).await {
            Ok(Some(_)) => return AdmissionDecision::Denied(DenialReason::AlreadyAdmitted),
            Ok(None) => {}
            Err(_) => return AdmissionDecision::Denied(DenialReason::StoreUnavailable),
        }

        match self.store.try_acquire(resource_key, owner_id).await {
            Ok(true) => AdmissionDecision::Granted,
            Ok(false) => AdmissionDecision::Denied(DenialReason::LostRace),
            Err(_) => AdmissionDecision::Denied(DenialReason::StoreUnavailable),
        }
    }

    /// Mark the agent as attached.
    #[instrument(skip_all, fields(resource_key = %resource_key))]
    pub async fn confirm_admission(&self, resource_key: &str) -> Result<(), AdmissionError> {
        self.store.mark_completed(resource_key).await?;

        tracing::info!(
            target: "admission.service.controller",
            resource_key = %resource_key,
            "Admission confirmed"
        );
        Ok(())
    }

    /// Give up a granted admission after a failed attach.
    #[instrument(skip_all, fields(resource_key = %resource_key))]
    pub async fn abort_admission(&self, resource_key: &str) -> Result<(), AdmissionError> {
        self.store.release(resource_key).await?;
        self.limiter.forget(resource_key).await;

        tracing::info!(
            target: "admission.service.controller",
            resource_key = %resource_key,
            "Admission aborted"
        );
        Ok(())
    }

    /// Release the ticket when the meeting ends or the agent leaves.
    ///
    /// Idempotent. The meeting becomes admissible again immediately.
    #[instrument(skip_all, fields(resource_key = %resource_key))]
    pub async fn release_admission(&self, resource_key: &str) -> Result<(), AdmissionError> {
        self.store.release(resource_key).await?;
        self.limiter.forget(resource_key).await;

        tracing::info!(
            target: "admission.service.controller",
            resource_key = %resource_key,
            "Admission released"
        );
        Ok(())
    }

    /// Release the ticket only if it was issued to `owner_id`.
    ///
    /// The owner check and the delete are one store operation, so a ticket
    /// re-issued to someone else in between is never removed. Returns whether
    /// a ticket was released.
    #[instrument(skip_all, fields(resource_key = %resource_key, owner_id = %owner_id))]
    pub async fn release_if_owner(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<bool, AdmissionError> {
        let released = self.store.release_if_owner(resource_key, owner_id).await?;

        if released {
            self.limiter.forget(resource_key).await;
            tracing::info!(
                target: "admission.service.controller",
                resource_key = %resource_key,
                owner_id = %owner_id,
                "Admission released by owner"
            );
        }
        Ok(released)
    }

    /// Reclaim tickets issued more than `max_age` ago, in any state.
    #[instrument(skip_all, fields(max_age_seconds = max_age.as_secs()))]
    pub async fn sweep_expired(&self, max_age: Duration) -> Result<u64, AdmissionError> {
        let removed = self.store.sweep_expired(max_age).await?;
        record_tickets_swept(removed);
        Ok(removed)
    }

    /// Reclaim `InProgress` tickets issued more than `max_age` ago.
    #[instrument(skip_all, fields(max_age_seconds = max_age.as_secs()))]
    pub async fn sweep_abandoned(&self, max_age: Duration) -> Result<u64, AdmissionError> {
        let removed = self.store.sweep_abandoned(max_age).await?;
        record_tickets_swept(removed);
        Ok(removed)
    }

    /// Sweep with the configured horizons: abandoned attaches first, then
    /// anything past the maximum ticket age.
    pub async fn sweep_stale(&self) -> Result<u64, AdmissionError> {
        let abandoned = self.sweep_abandoned(self.policy.in_progress_max_age).await?;
        let expired = self.sweep_expired(self.policy.max_ticket_age).await?;
        Ok(abandoned + expired)
    }

    /// Current ticket for a meeting, if any.
    pub async fn ticket(&self, resource_key: &str) -> Result<Option<AdmissionTicket>, AdmissionError> {
        self.store.get(resource_key).await
    }

    /// Verify the lock store is reachable.
    pub async fn check_store(&self) -> Result<(), AdmissionError> {
        self.store.ping().await
    }
}
