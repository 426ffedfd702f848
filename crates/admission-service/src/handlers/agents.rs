//! Agent connection handlers.
//!
//! Implements the synchronous user-facing path:
//!
//! - `POST /api/v1/meetings/:meeting_id/agent` - Connect an agent now
//! - `DELETE /api/v1/meetings/:meeting_id/agent` - Release the meeting's ticket
//! - `GET /api/v1/meetings/:meeting_id/admission` - Inspect the ticket
//!
//! End-user authentication happens upstream of this service.

use crate::errors::AdmissionError;
use crate::models::{is_valid_id, AdmissionTicket, ConnectAgentRequest, ConnectAgentResponse};
use crate::observability::metrics::record_error;
use crate::routes::AppState;
use crate::services::ConnectOutcome;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

fn validate_id(kind: &str, value: &str) -> Result<(), AdmissionError> {
    if !is_valid_id(value) {
        return Err(AdmissionError::BadRequest(format!("Invalid {kind}")));
    }
    Ok(())
}

fn recorded<T>(operation: &'static str, result: Result<T, AdmissionError>) -> Result<T, AdmissionError> {
    result.map_err(|e| {
        record_error(operation, e.error_type(), e.status_code());
        e
    })
}

// ============================================================================
// Handler: POST /api/v1/meetings/:meeting_id/agent
// ============================================================================

/// Handler for POST /api/v1/meetings/:meeting_id/agent
///
/// Attaches an agent unless one is already attached or being attached.
///
/// # Response
///
/// - 200 with `{"status":"attached"}` once the agent is in the call
/// - 409 when an agent is already admitted or another request won the race
/// - 429 when attempts for this meeting are too frequent
/// - 503 when admission cannot be decided safely
/// - 502 when the agent connector failed
#[instrument(skip_all, name = "admission.agents.connect", fields(meeting_id = %meeting_id))]
pub async fn connect_agent(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    request: Option<Json<ConnectAgentRequest>>,
) -> Result<Json<ConnectAgentResponse>, AdmissionError> {
    let agent_id = request
        .and_then(|Json(body)| body.agent_id)
        .unwrap_or_else(|| state.config.default_agent_id.clone());

    recorded(
        "connect_agent",
        connect(&state, meeting_id, agent_id).await,
    )
}

async fn connect(
    state: &AppState,
    meeting_id: String,
    agent_id: String,
) -> Result<Json<ConnectAgentResponse>, AdmissionError> {
    validate_id("meeting id", &meeting_id)?;
    validate_id("agent id", &agent_id)?;

    match state.connect.connect_agent(&meeting_id, &agent_id).await? {
        ConnectOutcome::Attached => Ok(Json(ConnectAgentResponse {
            meeting_id,
            agent_id,
            status: "attached".to_string(),
        })),
        ConnectOutcome::Denied(reason) => Err(AdmissionError::Denied(reason)),
    }
}

// ============================================================================
// Handler: DELETE /api/v1/meetings/:meeting_id/agent
// ============================================================================

/// Handler for DELETE /api/v1/meetings/:meeting_id/agent
///
/// Idempotent: answers 204 whether or not a ticket existed.
#[instrument(skip_all, name = "admission.agents.disconnect", fields(meeting_id = %meeting_id))]
pub async fn disconnect_agent(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
) -> Result<StatusCode, AdmissionError> {
    recorded("disconnect_agent", disconnect(&state, &meeting_id).await)
}

async fn disconnect(state: &AppState, meeting_id: &str) -> Result<StatusCode, AdmissionError> {
    validate_id("meeting id", meeting_id)?;
    state.controller.release_admission(meeting_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Handler: GET /api/v1/meetings/:meeting_id/admission
// ============================================================================

/// Handler for GET /api/v1/meetings/:meeting_id/admission
#[instrument(skip_all, name = "admission.agents.ticket", fields(meeting_id = %meeting_id))]
pub async fn get_admission(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
) -> Result<Json<AdmissionTicket>, AdmissionError> {
    recorded("get_admission", lookup(&state, &meeting_id).await)
}

async fn lookup(state: &AppState, meeting_id: &str) -> Result<Json<AdmissionTicket>, AdmissionError> {
    validate_id("meeting id", meeting_id)?;
    state
        .controller
        .ticket(meeting_id)
        .await?
        .map(Json)
        .ok_or_else(|| AdmissionError::NotFound("No admission for this meeting".to_string()))
}
