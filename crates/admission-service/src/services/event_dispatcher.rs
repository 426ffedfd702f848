//! Video platform event dispatcher.
//!
//! Translates webhook notifications into admission operations:
//!
//! | event type                        | action                                  |
//! |-----------------------------------|-----------------------------------------|
//! | `call.session_started`            | connect the agent                       |
//! | `call.session_ended`, `call.ended`| release the ticket                      |
//! | `call.session_participant_left`   | release if the agent itself left        |
//! | anything else                     | acknowledged and ignored                |
//!
//! Duplicate and reordered deliveries need no deduplication here: a repeated
//! session start is denied by the controller, and release is idempotent.
//!
//! Identifiers taken from the payload go through the same checks as the agent
//! API, so an oversized meeting id is a bad request rather than a store error.

use crate::errors::AdmissionError;
use crate::models::{is_valid_id, DenialReason};
use crate::observability::metrics::record_webhook_event;
use crate::services::agent_connect::{AgentConnectService, ConnectOutcome};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Inbound webhook notification.
///
/// Only the fields needed for dispatch are modelled; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,

    /// Call identifier in `<type>:<id>` form.
    #[serde(default)]
    pub call_cid: Option<String>,

    #[serde(default)]
    pub call: Option<CallInfo>,

    /// Present on participant events.
    #[serde(default)]
    pub participant: Option<ParticipantInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallInfo {
    #[serde(default)]
    pub cid: Option<String>,

    /// Application data attached when the call was created.
    #[serde(default)]
    pub custom: Option<CallCustomData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallCustomData {
    #[serde(default, alias = "meetingId")]
    pub meeting_id: Option<String>,

    #[serde(default, alias = "agentId")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantInfo {
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: String,
}

impl WebhookEvent {
    fn custom(&self) -> Option<&CallCustomData> {
        self.call.as_ref().and_then(|call| call.custom.as_ref())
    }

    /// Meeting identifier: the call's custom `meeting_id`, else the id part
    /// of the call cid.
    pub fn resource_key(&self) -> Option<String> {
        if let Some(meeting_id) = self
            .custom()
            .and_then(|custom| custom.meeting_id.as_deref())
            .filter(|id| !id.is_empty())
        {
            return Some(meeting_id.to_string());
        }

        let cid = self
            .call_cid
            .as_deref()
            .or_else(|| self.call.as_ref().and_then(|call| call.cid.as_deref()))?;

        let id = match cid.split_once(':') {
            Some((_, id)) => id,
            None => cid,
        };

        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    /// Agent named in the call's custom data.
    pub fn agent_id(&self) -> Option<&str> {
        self.custom()
            .and_then(|custom| custom.agent_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// User that left, for participant events.
    pub fn participant_user_id(&self) -> Option<&str> {
        self.participant
            .as_ref()
            .and_then(|p| p.user.as_ref())
            .map(|user| user.id.as_str())
    }
}

/// Event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStarted,
    SessionEnded,
    ParticipantLeft,
    Other,
}

impl EventKind {
    pub fn classify(kind: &str) -> Self {
        match kind {
            "call.session_started" => EventKind::SessionStarted,
            "call.session_ended" | "call.ended" => EventKind::SessionEnded,
            "call.session_participant_left" => EventKind::ParticipantLeft,
            _ => EventKind::Other,
        }
    }

    /// Bounded label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::SessionEnded => "session_ended",
            EventKind::ParticipantLeft => "participant_left",
            EventKind::Other => "other",
        }
    }
}

/// What dispatching an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The agent was attached.
    Connected,

    /// Admission was denied; the agent was not attached.
    Denied(DenialReason),

    /// The meeting's ticket was released.
    Released,

    /// The event needs no action.
    Ignored,
}

impl DispatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Connected => "connected",
            DispatchOutcome::Denied(_) => "denied",
            DispatchOutcome::Released => "released",
            DispatchOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("event does not identify a meeting")]
    MissingResourceKey,

    #[error("invalid {0} in event")]
    InvalidIdentifier(&'static str),

    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

impl From<DispatchError> for AdmissionError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MissingResourceKey => {
                AdmissionError::BadRequest("Event does not identify a meeting".to_string())
            }
            DispatchError::InvalidIdentifier(kind) => {
                AdmissionError::BadRequest(format!("Invalid {kind}"))
            }
            DispatchError::Admission(e) => e,
        }
    }
}

/// Routes webhook events to the connect service and admission controller.
pub struct EventDispatcher {
    connect: Arc<AgentConnectService>,
    default_agent_id: String,
}

impl EventDispatcher {
    /// Create a dispatcher.
    ///
    /// * `default_agent_id` - Agent attached when the event does not name one
    pub fn new(connect: Arc<AgentConnectService>, default_agent_id: String) -> Self {
        Self {
            connect,
            default_agent_id,
        }
    }

    /// Dispatch one event.
    ///
    /// # Errors
    ///
    /// - `DispatchError::MissingResourceKey` - actionable event without a meeting id
    /// - `DispatchError::InvalidIdentifier` - meeting or agent id is malformed or too long
    /// - `DispatchError::Admission` - attach failed or the store failed on release
    #[instrument(skip_all, fields(event_type = %event.kind))]
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<DispatchOutcome, DispatchError> {
        let kind = EventKind::classify(&event.kind);
        let result = self.dispatch_kind(kind, event).await;

        let outcome_label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        record_webhook_event(kind.label(), outcome_label);

        result
    }

    async fn dispatch_kind(
        &self,
        kind: EventKind,
        event: &WebhookEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        if kind == EventKind::Other {
            tracing::debug!(
                target: "admission.service.dispatcher",
                event_type = %event.kind,
                "Ignoring event"
            );
            return Ok(DispatchOutcome::Ignored);
        }

        let resource_key = event.resource_key().ok_or_else(|| {
            tracing::warn!(
                target: "admission.service.dispatcher",
                event_type = %event.kind,
                "Event has no meeting identifier"
            );
            DispatchError::MissingResourceKey
        })?;
        require_valid_id(&resource_key, "meeting_id")?;

        match kind {
            EventKind::SessionStarted => {
                let owner_id = event.agent_id().unwrap_or(&self.default_agent_id);
                require_valid_id(owner_id, "agent_id")?;
                match self.connect.connect_agent(&resource_key, owner_id).await? {
                    ConnectOutcome::Attached => Ok(DispatchOutcome::Connected),
                    ConnectOutcome::Denied(reason) => Ok(DispatchOutcome::Denied(reason)),
                }
            }
            EventKind::SessionEnded => {
                self.connect
                    .controller()
                    .release_admission(&resource_key)
                    .await?;
                Ok(DispatchOutcome::Released)
            }
            EventKind::ParticipantLeft => self.on_participant_left(&resource_key, event).await,
            EventKind::Other => Ok(DispatchOutcome::Ignored),
        }
    }

    /// Release only when the participant that left is the admitted agent.
    async fn on_participant_left(
        &self,
        resource_key: &str,
        event: &WebhookEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(user_id) = event.participant_user_id() else {
            return Ok(DispatchOutcome::Ignored);
        };

        let released = self
            .connect
            .controller()
            .release_if_owner(resource_key, user_id)
            .await?;

        if !released {
            return Ok(DispatchOutcome::Ignored);
        }

        tracing::info!(
            target: "admission.service.dispatcher",
            resource_key = %resource_key,
            owner_id = %user_id,
            "Agent left the call"
        );
        Ok(DispatchOutcome::Released)
    }
}

fn require_valid_id(value: &str, kind: &'static str) -> Result<(), DispatchError> {
    if is_valid_id(value) {
        Ok(())
    } else {
        tracing::warn!(
            target: "admission.service.dispatcher",
            field = kind,
            length = value.len(),
            "Event carries an invalid identifier"
        );
        Err(DispatchError::InvalidIdentifier(kind))
    }
}
