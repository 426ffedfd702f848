//! Per-meeting admission rate limiter.
//!
//! Suppresses bursts of admission attempts for the same meeting (duplicate
//! webhook deliveries, double-clicks) before they reach the lock store.
//!
//! The limiter is process-local and advisory. Two instances each allow one
//! attempt for the same meeting; the lock store decides between them. It
//! never contributes to the at-most-one guarantee, so losing its state on
//! restart is harmless.

use crate::observability::metrics::set_rate_limiter_entries;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct LimiterState {
    /// Last allowed attempt per meeting.
    entries: HashMap<String, Instant>,
    last_purge: Instant,
}

/// Minimum-interval limiter keyed by meeting.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    /// Entries older than this are purged.
    horizon: Duration,
}

impl RateLimiter {
    /// Create a limiter whose entries are kept for `horizon`.
    pub fn new(horizon: Duration) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                entries: HashMap::new(),
                last_purge: Instant::now(),
            }),
            horizon,
        }
    }

    /// Returns `false` if an attempt for `resource_key` was allowed less than
    /// `min_interval` ago. Otherwise records now and returns `true`.
    ///
    /// A zero `min_interval` disables throttling.
    pub async fn allow(&self, resource_key: &str, min_interval: Duration) -> bool {
        if min_interval.is_zero() {
            return true;
        }

        let now = Instant::now();
        let mut state = self.state.lock().await;

        if now.duration_since(state.last_purge) >= self.horizon / 2 {
            let horizon = self.horizon;
            state
                .entries
                .retain(|_, last| now.duration_since(*last) < horizon);
            state.last_purge = now;
            set_rate_limiter_entries(state.entries.len());
        }

        if let Some(last) = state.entries.get(resource_key) {
            if now.duration_since(*last) < min_interval {
                return false;
            }
        }

        state.entries.insert(resource_key.to_string(), now);
        true
    }

    /// Drop the entry for `resource_key`, making it immediately allowable.
    pub async fn forget(&self, resource_key: &str) {
        self.state.lock().await.entries.remove(resource_key);
    }

    /// Number of tracked meetings.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_INTERVAL: Duration = Duration::from_secs(5);
    const HORIZON: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_second_attempt_within_interval_is_denied() {
        let limiter = RateLimiter::new(HORIZON);

        assert!(limiter.allow("m1", MIN_INTERVAL).await);
        assert!(!limiter.allow("m1", MIN_INTERVAL).await);

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert!(!limiter.allow("m1", MIN_INTERVAL).await);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.allow("m1", MIN_INTERVAL).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_attempt_does_not_extend_window() {
        let limiter = RateLimiter::new(HORIZON);

        assert!(limiter.allow("m1", MIN_INTERVAL).await);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(!limiter.allow("m1", MIN_INTERVAL).await);

        // Measured from the allowed attempt, not the denied one
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.allow("m1", MIN_INTERVAL).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(HORIZON);

        assert!(limiter.allow("m1", MIN_INTERVAL).await);
        assert!(limiter.allow("m2", MIN_INTERVAL).await);
        assert!(!limiter.allow("m1", MIN_INTERVAL).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables_throttling() {
        let limiter = RateLimiter::new(HORIZON);

        for _ in 0..5 {
            assert!(limiter.allow("m1", Duration::ZERO).await);
        }
        assert!(limiter.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_makes_key_allowable() {
        let limiter = RateLimiter::new(HORIZON);

        assert!(limiter.allow("m1", MIN_INTERVAL).await);
        limiter.forget("m1").await;
        assert!(limiter.allow("m1", MIN_INTERVAL).await);

        // Forgetting an unknown key is a no-op
        limiter.forget("unknown").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_older_than_horizon_are_purged() {
        let limiter = RateLimiter::new(HORIZON);

        assert!(limiter.allow("m1", MIN_INTERVAL).await);
        assert!(limiter.allow("m2", MIN_INTERVAL).await);
        assert_eq!(limiter.len().await, 2);

        tokio::time::advance(HORIZON + Duration::from_secs(1)).await;

        // Purge runs inside allow; only the fresh entry remains
        assert!(limiter.allow("m3", MIN_INTERVAL).await);
        assert_eq!(limiter.len().await, 1);
    }
}
