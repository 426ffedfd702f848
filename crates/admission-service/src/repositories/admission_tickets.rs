//! Admission tickets repository.
//!
//! Durable registry of per-meeting admission tickets. Uniqueness of
//! `resource_key` is enforced by the table's primary key, and tickets are
//! only ever created through a single `INSERT ... ON CONFLICT DO NOTHING`,
//! so two concurrent callers always get a strict winner and loser.
//!
//! # Failure Semantics
//!
//! Every operation returns `Err` when the database cannot be reached. Callers
//! must treat an error from `try_acquire` as "not acquired": if the insert
//! committed but the response was lost, the orphaned ticket is reclaimed by
//! the sweep rather than risking a second admission.
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - Timestamps come from the database clock, never from the calling process

use crate::errors::AdmissionError;
use crate::models::{AdmissionTicket, TicketState};
use crate::observability::metrics::record_store_operation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Store of admission tickets, shared by every service instance.
///
/// `release` and `mark_completed` are idempotent: calling them for a key with
/// no ticket is not an error.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically create an `InProgress` ticket if none exists for the key.
    ///
    /// Returns `Ok(true)` iff this call created the ticket.
    async fn try_acquire(&self, resource_key: &str, owner_id: &str)
        -> Result<bool, AdmissionError>;

    /// Transition the ticket to `Completed`. No-op if absent.
    async fn mark_completed(&self, resource_key: &str) -> Result<(), AdmissionError>;

    /// Delete the ticket unconditionally. No-op if absent.
    async fn release(&self, resource_key: &str) -> Result<(), AdmissionError>;

    /// Delete the ticket only if it was issued to `owner_id`, in one step.
    ///
    /// Returns `Ok(true)` iff a ticket was deleted.
    async fn release_if_owner(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<bool, AdmissionError>;

    /// Read the ticket without side effects.
    async fn get(&self, resource_key: &str) -> Result<Option<AdmissionTicket>, AdmissionError>;

    /// Delete every ticket issued more than `max_age` ago, regardless of state.
    ///
    /// Returns the number of tickets removed.
    async fn sweep_expired(&self, max_age: Duration) -> Result<u64, AdmissionError>;

    /// Delete `InProgress` tickets issued more than `max_age` ago.
    ///
    /// Reclaims admissions whose holder vanished between grant and
    /// confirm/abort. `max_age` must exceed the longest legitimate attach.
    async fn sweep_abandoned(&self, max_age: Duration) -> Result<u64, AdmissionError>;

    /// Verify the store is reachable.
    async fn ping(&self) -> Result<(), AdmissionError>;
}

/// Postgres-backed lock store.
#[derive(Clone)]
pub struct PgLockStore {
    pool: PgPool,
    /// Recorded as `issued_by` on tickets created through this store.
    instance_id: String,
}

impl PgLockStore {
    /// Create a store over an existing pool.
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    /// * `instance_id` - ID of this service instance (audit trail)
    pub fn new(pool: PgPool, instance_id: impl Into<String>) -> Self {
        Self {
            pool,
            instance_id: instance_id.into(),
        }
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Run a query, recording its latency and outcome.
async fn timed<T, F>(operation: &'static str, query: F) -> Result<T, AdmissionError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = query.await;
    let status = if result.is_ok() { "success" } else { "error" };
    record_store_operation(operation, status, start.elapsed());

    result.map_err(|e| {
        tracing::warn!(
            target: "admission.repository.tickets",
            operation = operation,
            error = %e,
            "Lock store operation failed"
        );
        AdmissionError::from(e)
    })
}

#[async_trait]
impl LockStore for PgLockStore {
    #[instrument(skip_all, fields(resource_key = %resource_key, owner_id = %owner_id))]
    async fn try_acquire(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<bool, AdmissionError> {
        // The primary key on resource_key makes the conflicting insert a no-op
        // instead of a race; RETURNING yields a row only for the winner.
        let inserted: Option<(String,)> = timed(
            "try_acquire",
            sqlx::query_as(
                r#"
                INSERT INTO admission_tickets (resource_key, owner_id, state, issued_by)
                VALUES ($1, $2, 'in_progress', $3)
                ON CONFLICT (resource_key) DO NOTHING
                RETURNING resource_key
                "#,
            )
            .bind(resource_key)
            .bind(owner_id)
            .bind(&self.instance_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(inserted.is_some())
    }

    #[instrument(skip_all, fields(resource_key = %resource_key))]
    async fn mark_completed(&self, resource_key: &str) -> Result<(), AdmissionError> {
        let result = timed(
            "mark_completed",
            sqlx::query(
                r#"
                UPDATE admission_tickets
                SET state = 'completed',
                    updated_at = NOW()
                WHERE resource_key = $1
                  AND state = 'in_progress'
                "#,
            )
            .bind(resource_key)
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                target: "admission.repository.tickets",
                resource_key = %resource_key,
                "No in-progress ticket to complete"
            );
        }

        Ok(())
    }

    #[instrument(skip_all, fields(resource_key = %resource_key))]
    async fn release(&self, resource_key: &str) -> Result<(), AdmissionError> {
        let result = timed(
            "release",
            sqlx::query(
                r#"
                DELETE FROM admission_tickets
                WHERE resource_key = $1
                "#,
            )
            .bind(resource_key)
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(
                target: "admission.repository.tickets",
                resource_key = %resource_key,
                "Released admission ticket"
            );
        }

        Ok(())
    }

    #[instrument(skip_all, fields(resource_key = %resource_key, owner_id = %owner_id))]
    async fn release_if_owner(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<bool, AdmissionError> {
        let result = timed(
            "release_if_owner",
            sqlx::query(
                r#"
                DELETE FROM admission_tickets
                WHERE resource_key = $1 AND owner_id = $2
                "#,
            )
            .bind(resource_key)
            .bind(owner_id)
            .execute(&self.pool),
        )
        .await?;

        let released = result.rows_affected() > 0;
        if released {
            tracing::info!(
                target: "admission.repository.tickets",
                resource_key = %resource_key,
                owner_id = %owner_id,
                "Released admission ticket for its owner"
            );
        }

        Ok(released)
    }

    #[instrument(skip_all, fields(resource_key = %resource_key))]
    async fn get(&self, resource_key: &str) -> Result<Option<AdmissionTicket>, AdmissionError> {
        let row: Option<TicketRow> = timed(
            "get",
            sqlx::query_as(
                r#"
                SELECT resource_key, owner_id, state, issued_at, updated_at, issued_by
                FROM admission_tickets
                WHERE resource_key = $1
                "#,
            )
            .bind(resource_key)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(TicketRow::into_ticket).transpose()
    }

    #[instrument(skip_all, fields(max_age_seconds = max_age.as_secs()))]
    async fn sweep_expired(&self, max_age: Duration) -> Result<u64, AdmissionError> {
        let result = timed(
            "sweep",
            sqlx::query(
                r#"
                DELETE FROM admission_tickets
                WHERE issued_at < NOW() - ($1 || ' seconds')::INTERVAL
                "#,
            )
            .bind(max_age.as_secs_f64().to_string())
            .execute(&self.pool),
        )
        .await?;

        let count = result.rows_affected();

        if count > 0 {
            tracing::info!(
                target: "admission.repository.tickets",
                max_age_seconds = max_age.as_secs(),
                count = count,
                "Swept expired admission tickets"
            );
        }

        Ok(count)
    }

    #[instrument(skip_all, fields(max_age_seconds = max_age.as_secs()))]
    async fn sweep_abandoned(&self, max_age: Duration) -> Result<u64, AdmissionError> {
        let result = timed(
            "sweep_abandoned",
            sqlx::query(
                r#"
                DELETE FROM admission_tickets
                WHERE state = 'in_progress'
                  AND issued_at < NOW() - ($1 || ' seconds')::INTERVAL
                "#,
            )
            .bind(max_age.as_secs_f64().to_string())
            .execute(&self.pool),
        )
        .await?;

        let count = result.rows_affected();

        if count > 0 {
            tracing::warn!(
                target: "admission.repository.tickets",
                max_age_seconds = max_age.as_secs(),
                count = count,
                "Swept abandoned in-progress admission tickets"
            );
        }

        Ok(count)
    }

    async fn ping(&self) -> Result<(), AdmissionError> {
        timed("ping", sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct TicketRow {
    resource_key: String,
    owner_id: String,
    state: String,
    issued_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    issued_by: String,
}

impl TicketRow {
    fn into_ticket(self) -> Result<AdmissionTicket, AdmissionError> {
        let state = TicketState::parse(&self.state).ok_or_else(|| {
            tracing::error!(
                target: "admission.repository.tickets",
                resource_key = %self.resource_key,
                state = %self.state,
                "Unknown ticket state in database"
            );
            AdmissionError::Database(format!("unknown ticket state '{}'", self.state))
        })?;

        Ok(AdmissionTicket {
            resource_key: self.resource_key,
            owner_id: self.owner_id,
            state,
            issued_at: self.issued_at,
            updated_at: self.updated_at,
            issued_by: self.issued_by,
        })
    }
}
