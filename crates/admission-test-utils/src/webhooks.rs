//! Webhook payload builders.
//!
//! Payloads mirror what the video platform sends: an event `type`, the
//! `call_cid`, and for call events a `call` object carrying the meeting's
//! custom data.

use admission_service::handlers::webhooks::{sign, SIGNATURE_HEADER};
use serde_json::{json, Value};

/// `call.session_started` for meeting `meeting_id`.
///
/// The meeting id is carried in `call.custom.meeting_id`; the call cid uses a
/// different id so tests prove the custom field wins.
pub fn session_started(meeting_id: &str, agent_id: Option<&str>) -> Value {
    let mut custom = json!({ "meeting_id": meeting_id });
    if let Some(agent_id) = agent_id {
        custom["agent_id"] = json!(agent_id);
    }

    json!({
        "type": "call.session_started",
        "call_cid": format!("default:call-{meeting_id}"),
        "call": {
            "cid": format!("default:call-{meeting_id}"),
            "custom": custom,
        },
        "session_id": "session-1",
        "created_at": "2026-03-01T12:00:00Z",
    })
}

/// `call.session_ended` identified only by call cid.
pub fn session_ended(meeting_id: &str) -> Value {
    json!({
        "type": "call.session_ended",
        "call_cid": format!("default:{meeting_id}"),
        "session_id": "session-1",
        "created_at": "2026-03-01T13:00:00Z",
    })
}

/// `call.session_participant_left` for `user_id`.
pub fn participant_left(meeting_id: &str, user_id: &str) -> Value {
    json!({
        "type": "call.session_participant_left",
        "call_cid": format!("default:{meeting_id}"),
        "participant": {
            "user": { "id": user_id },
            "user_session_id": "user-session-1",
        },
        "created_at": "2026-03-01T12:30:00Z",
    })
}

/// Any event type the dispatcher does not act on.
pub fn other_event(event_type: &str) -> Value {
    json!({
        "type": event_type,
        "created_at": "2026-03-01T12:00:00Z",
    })
}

/// Serialize `payload` and compute its signature header.
///
/// Returns `(body, (header name, header value))`.
pub fn signed(secret: &str, payload: &Value) -> (Vec<u8>, (&'static str, String)) {
    let body = serde_json::to_vec(payload).expect("payload serializes");
    let signature = sign(secret.as_bytes(), &body);
    (body, (SIGNATURE_HEADER, signature))
}
