//! Admission service models.
//!
//! Contains the admission ticket record, admission decisions, and the
//! request/response payloads of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a meeting or agent identifier (`VARCHAR(256)` columns).
pub const MAX_ID_LENGTH: usize = 256;

/// Whether `value` is usable as a meeting or agent identifier.
pub fn is_valid_id(value: &str) -> bool {
    !value.trim().is_empty() && value.len() <= MAX_ID_LENGTH
}

/// Lifecycle state of an admission ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// The attach operation has been granted and is running.
    InProgress,

    /// The agent is attached to the meeting.
    Completed,
}

impl TicketState {
    /// Returns the string stored in the `admission_tickets.state` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::InProgress => "in_progress",
            TicketState::Completed => "completed",
        }
    }

    /// Parses the stored column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(TicketState::InProgress),
            "completed" => Some(TicketState::Completed),
            _ => None,
        }
    }
}

/// Durable record of an in-flight or completed agent admission.
///
/// At most one ticket exists per `resource_key`; the lock store enforces
/// this, not the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionTicket {
    /// Meeting identifier (unique key).
    pub resource_key: String,

    /// Agent the ticket was issued for. Informational only.
    pub owner_id: String,

    /// Current lifecycle state.
    pub state: TicketState,

    /// When the ticket was created.
    pub issued_at: DateTime<Utc>,

    /// When the ticket last changed state.
    pub updated_at: DateTime<Utc>,

    /// Service instance that won the insert.
    pub issued_by: String,
}

/// Why an admission request was denied.
///
/// Denials are ordinary results, not errors. Callers must not retry
/// `AlreadyAdmitted` or `LostRace` without a release having happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Another attempt for the same key was allowed moments ago.
    RateLimited,

    /// A ticket already exists (in progress or completed).
    AlreadyAdmitted,

    /// Another caller won the atomic insert.
    LostRace,

    /// The lock store could not be reached; admission failed closed.
    StoreUnavailable,
}

impl DenialReason {
    /// Bounded label value for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::RateLimited => "rate_limited",
            DenialReason::AlreadyAdmitted => "already_admitted",
            DenialReason::LostRace => "lost_race",
            DenialReason::StoreUnavailable => "store_unavailable",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `request_admission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The caller now holds the ticket and must confirm or abort it.
    Granted,

    /// The caller must not attach the agent.
    Denied(DenialReason),
}

impl AdmissionDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AdmissionDecision::Granted)
    }

    /// Bounded label value for metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            AdmissionDecision::Granted => "granted",
            AdmissionDecision::Denied(reason) => reason.as_str(),
        }
    }
}

// ============================================================================
// HTTP API Models
// ============================================================================

/// Liveness / readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy".
    pub status: String,

    /// Instance identifier from configuration.
    pub instance_id: String,

    /// Lock store connectivity (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_store: Option<String>,
}

/// Request body for `POST /api/v1/meetings/:meeting_id/agent`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectAgentRequest {
    /// Agent to attach. Falls back to the configured default agent.
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Response body for a successful agent connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAgentResponse {
    pub meeting_id: String,
    pub agent_id: String,
    pub status: String,
}

/// Response body for webhook ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// Dispatch outcome ("connected", "denied", "released", "ignored").
    pub outcome: String,

    /// Denial reason when `outcome == "denied"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
}

/// Response body for an on-demand sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub removed: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_state_round_trips_column_value() {
        for state in [TicketState::InProgress, TicketState::Completed] {
            assert_eq!(TicketState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TicketState::parse("released"), None);
    }

    #[test]
    fn test_denial_reason_serializes_snake_case() {
        let json = serde_json::to_string(&DenialReason::AlreadyAdmitted).unwrap();
        assert_eq!(json, "\"already_admitted\"");
        assert_eq!(DenialReason::LostRace.to_string(), "lost_race");
    }

    #[test]
    fn test_decision_outcome_labels() {
        assert_eq!(AdmissionDecision::Granted.outcome_label(), "granted");
        assert_eq!(
            AdmissionDecision::Denied(DenialReason::RateLimited).outcome_label(),
            "rate_limited"
        );
        assert!(AdmissionDecision::Granted.is_granted());
        assert!(!AdmissionDecision::Denied(DenialReason::StoreUnavailable).is_granted());
    }

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id("m1"));
        assert!(is_valid_id(&"x".repeat(MAX_ID_LENGTH)));
        assert!(!is_valid_id(&"x".repeat(MAX_ID_LENGTH + 1)));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("   "));
    }

    #[test]
    fn test_webhook_response_omits_reason_when_absent() {
        let response = WebhookResponse {
            outcome: "ignored".to_string(),
            reason: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["outcome"], "ignored");
        assert!(json.get("reason").is_none());
    }
}
