//! In-process lock store.
//!
//! Linearizable within one process: all mutations happen under a single
//! mutex. Used by the test harness and for running the service locally
//! without Postgres. It does not coordinate across processes.

use crate::errors::AdmissionError;
use crate::models::{AdmissionTicket, TicketState};
use crate::repositories::LockStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Lock store backed by a `HashMap`.
///
/// Cloning shares the underlying map, so a test can keep a handle for
/// inspection after handing the store to a controller.
#[derive(Clone, Default)]
pub struct InMemoryLockStore {
    tickets: Arc<Mutex<HashMap<String, AdmissionTicket>>>,
    unavailable: Arc<AtomicBool>,
    instance_id: Arc<str>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self {
            instance_id: Arc::from("in-memory"),
            ..Default::default()
        }
    }

    /// Insert a ticket as-is, bypassing the acquire path.
    ///
    /// Lets tests seed tickets with an arbitrary `issued_at`.
    pub async fn insert_ticket(&self, ticket: AdmissionTicket) {
        self.tickets
            .lock()
            .await
            .insert(ticket.resource_key.clone(), ticket);
    }

    /// Make every subsequent operation fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of tickets currently held.
    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }

    /// Remove tickets older than `max_age` that match `filter`.
    async fn sweep_where<F>(&self, max_age: Duration, filter: F) -> Result<u64, AdmissionError>
    where
        F: Fn(&AdmissionTicket) -> bool,
    {
        self.check_available()?;

        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| AdmissionError::Database(format!("invalid max age: {e}")))?;
        let cutoff = Utc::now() - max_age;

        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        tickets.retain(|_, ticket| ticket.issued_at >= cutoff || !filter(ticket));
        Ok((before - tickets.len()) as u64)
    }

    fn check_available(&self) -> Result<(), AdmissionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdmissionError::Database(
                "lock store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<bool, AdmissionError> {
        self.check_available()?;

        let mut tickets = self.tickets.lock().await;
        if tickets.contains_key(resource_key) {
            return Ok(false);
        }

        let now = Utc::now();
        tickets.insert(
            resource_key.to_string(),
            AdmissionTicket {
                resource_key: resource_key.to_string(),
                owner_id: owner_id.to_string(),
                state: TicketState::InProgress,
                issued_at: now,
                updated_at: now,
                issued_by: self.instance_id.to_string(),
            },
        );
        Ok(true)
    }

    async fn mark_completed(&self, resource_key: &str) -> Result<(), AdmissionError> {
        self.check_available()?;

        if let Some(ticket) = self.tickets.lock().await.get_mut(resource_key) {
            if ticket.state == TicketState::InProgress {
                ticket.state = TicketState::Completed;
                ticket.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn release(&self, resource_key: &str) -> Result<(), AdmissionError> {
        self.check_available()?;
        self.tickets.lock().await.remove(resource_key);
        Ok(())
    }

    async fn release_if_owner(
        &self,
        resource_key: &str,
        owner_id: &str,
    ) -> Result<bool, AdmissionError> {
        self.check_available()?;

        let mut tickets = self.tickets.lock().await;
        let is_owner = tickets
            .get(resource_key)
            .is_some_and(|ticket| ticket.owner_id == owner_id);
        if is_owner {
            tickets.remove(resource_key);
        }
        Ok(is_owner)
    }

    async fn get(&self, resource_key: &str) -> Result<Option<AdmissionTicket>, AdmissionError> {
        self.check_available()?;
        Ok(self.tickets.lock().await.get(resource_key).cloned())
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<u64, AdmissionError> {
        self.sweep_where(max_age, |_| true).await
    }

    async fn sweep_abandoned(&self, max_age: Duration) -> Result<u64, AdmissionError> {
        self.sweep_where(max_age, |ticket| ticket.state == TicketState::InProgress)
            .await
    }

    async fn ping(&self) -> Result<(), AdmissionError> {
        self.check_available()
    }
}
