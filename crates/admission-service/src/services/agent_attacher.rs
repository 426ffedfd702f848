//! Agent connector client.
//!
//! Attaching an agent to a call is a multi-second operation performed by an
//! external agent connector. This module hides it behind `AgentAttacher` so
//! the connect flow can be exercised against a mock.
//!
//! # Security
//!
//! - Timeouts prevent hanging connections
//! - Response bodies are logged server-side only

use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

/// Connect timeout for the agent connector.
const CONNECTOR_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Attach failure, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    /// Network failure, timeout, or connector overload.
    #[error("transient attach failure: {0}")]
    Transient(String),

    /// The connector rejected the request; retrying will not help.
    #[error("permanent attach failure: {0}")]
    Permanent(String),
}

impl AttachError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttachError::Transient(_))
    }

    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttachError::Transient(_) => "transient",
            AttachError::Permanent(_) => "permanent",
        }
    }
}

/// Attaches an agent to a meeting's call.
#[async_trait::async_trait]
pub trait AgentAttacher: Send + Sync {
    /// Attach `owner_id` to the call of `resource_key`.
    async fn attach(&self, resource_key: &str, owner_id: &str) -> Result<(), AttachError>;
}

#[derive(Debug, Serialize)]
struct AttachRequest<'a> {
    meeting_id: &'a str,
    agent_id: &'a str,
}

/// HTTP client for the agent connector.
#[derive(Clone)]
pub struct HttpAgentAttacher {
    client: Client,
    base_url: String,
}

impl HttpAgentAttacher {
    /// Create a new connector client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the agent connector (e.g., "http://localhost:8090")
    /// * `request_timeout` - Upper bound for a single attach request
    ///
    /// # Errors
    ///
    /// Returns `AttachError::Permanent` if the HTTP client cannot be built.
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self, AttachError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(CONNECTOR_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                tracing::error!(target: "admission.services.agent_attacher", error = %e, "Failed to build HTTP client");
                AttachError::Permanent("failed to build HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn attach_url(&self) -> String {
        format!("{}/api/v1/agents/connect", self.base_url)
    }
}

/// Map a non-success connector status to an attach error.
fn classify_status(status: StatusCode) -> AttachError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        AttachError::Transient(format!("agent connector returned {status}"))
    } else {
        AttachError::Permanent(format!("agent connector returned {status}"))
    }
}

#[async_trait::async_trait]
impl AgentAttacher for HttpAgentAttacher {
    #[instrument(skip(self), fields(resource_key = %resource_key, owner_id = %owner_id))]
    async fn attach(&self, resource_key: &str, owner_id: &str) -> Result<(), AttachError> {
        let response = self
            .client
            .post(self.attach_url())
            .json(&AttachRequest {
                meeting_id: resource_key,
                agent_id: owner_id,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "admission.services.agent_attacher", error = %e, "Agent connector request failed");
                AttachError::Transient("agent connector unreachable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            target: "admission.services.agent_attacher",
            status = %status,
            body = %body,
            "Agent connector rejected attach"
        );
        Err(classify_status(status))
    }
}

/// Mock attacher module for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed,
        /// Fail transiently this many times, then succeed.
        FailTransient(usize),
        FailPermanent,
        /// Never complete.
        Hang,
    }

    /// Mock attacher for unit and integration tests.
    pub struct MockAttacher {
        behavior: Behavior,
        delay: Duration,
        call_count: AtomicUsize,
    }

    impl MockAttacher {
        fn with_behavior(behavior: Behavior) -> Self {
            Self {
                behavior,
                delay: Duration::ZERO,
                call_count: AtomicUsize::new(0),
            }
        }

        /// Always attaches.
        pub fn succeeding() -> Self {
            Self::with_behavior(Behavior::Succeed)
        }

        /// Fails transiently `failures` times, then attaches.
        pub fn failing_transient(failures: usize) -> Self {
            Self::with_behavior(Behavior::FailTransient(failures))
        }

        /// Always fails transiently.
        pub fn unavailable() -> Self {
            Self::with_behavior(Behavior::FailTransient(usize::MAX))
        }

        /// Always fails permanently.
        pub fn rejecting() -> Self {
            Self::with_behavior(Behavior::FailPermanent)
        }

        /// Never completes.
        pub fn hanging() -> Self {
            Self::with_behavior(Behavior::Hang)
        }

        /// Sleep this long inside every call.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AgentAttacher for MockAttacher {
        async fn attach(&self, _resource_key: &str, _owner_id: &str) -> Result<(), AttachError> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::FailTransient(failures) if call < failures => Err(
                    AttachError::Transient("mock connector unavailable".to_string()),
                ),
                Behavior::FailTransient(_) => Ok(()),
                Behavior::FailPermanent => Err(AttachError::Permanent(
                    "mock connector rejected agent".to_string(),
                )),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE).is_retryable());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR).is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT).is_retryable());

        assert!(!classify_status(StatusCode::BAD_REQUEST).is_retryable());
        assert!(!classify_status(StatusCode::NOT_FOUND).is_retryable());
        assert!(!classify_status(StatusCode::CONFLICT).is_retryable());
    }

    #[test]
    fn test_attach_url_strips_trailing_slash() {
        let attacher =
            HttpAgentAttacher::new("http://connector:8090/".to_string(), Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            attacher.attach_url(),
            "http://connector:8090/api/v1/agents/connect"
        );
    }

    #[test]
    fn test_attach_request_serialization() {
        let json = serde_json::to_value(AttachRequest {
            meeting_id: "m1",
            agent_id: "agent-1",
        })
        .unwrap();
        assert_eq!(json["meeting_id"], "m1");
        assert_eq!(json["agent_id"], "agent-1");
    }

    #[tokio::test]
    async fn test_unreachable_connector_is_transient() {
        // Port 9 (discard) on localhost is not listening
        let attacher =
            HttpAgentAttacher::new("http://127.0.0.1:9".to_string(), Duration::from_secs(2))
                .unwrap();
        let err = attacher.attach("m1", "agent-1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
