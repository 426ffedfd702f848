//! Video platform webhook handler.
//!
//! `POST /api/v1/webhooks/video`
//!
//! # Security
//!
//! When a webhook secret is configured, every request must carry
//! `x-signature: hex(HMAC-SHA256(secret, raw body))`. The signature is
//! checked with `ring::hmac::verify` (constant time) before the body is
//! parsed. Requests with a missing or invalid signature are rejected with
//! 401 and never dispatched.

use crate::errors::AdmissionError;
use crate::models::WebhookResponse;
use crate::observability::metrics::record_error;
use crate::routes::AppState;
use crate::services::event_dispatcher::{DispatchOutcome, WebhookEvent};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use ring::hmac;
use std::sync::Arc;
use tracing::instrument;

/// Header carrying the hex-encoded body signature.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Verify `signature` (hex, optionally prefixed `sha256=`) over `body`.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let provided = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, body, &provided).is_ok()
}

/// Compute the signature a sender would attach to `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hex::encode(hmac::sign(&key, body).as_ref())
}

fn check_signature(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), AdmissionError> {
    let Some(secret) = state.config.webhook_secret_bytes() else {
        return Ok(());
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!(target: "admission.handlers.webhooks", "Webhook without signature");
            AdmissionError::Unauthorized("Missing webhook signature".to_string())
        })?;

    if !verify_signature(secret, body, signature) {
        tracing::warn!(target: "admission.handlers.webhooks", "Webhook signature mismatch");
        return Err(AdmissionError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    Ok(())
}

/// Handler for POST /api/v1/webhooks/video
///
/// Always answers 200 for events that were understood, including denials
/// and ignored event types, so the platform does not redeliver them.
#[instrument(skip_all, name = "admission.webhooks.video")]
pub async fn handle_video_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AdmissionError> {
    process_webhook(&state, &headers, &body).await.map_err(|e| {
        record_error("webhook", e.error_type(), e.status_code());
        e
    })
}

async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookResponse>, AdmissionError> {
    check_signature(state, headers, body)?;

    let event: WebhookEvent = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "admission.handlers.webhooks", error = %e, "Malformed webhook payload");
        AdmissionError::BadRequest("Malformed webhook payload".to_string())
    })?;

    let outcome = state.dispatcher.dispatch(&event).await?;

    Ok(Json(WebhookResponse {
        outcome: outcome.label().to_string(),
        reason: match outcome {
            DispatchOutcome::Denied(reason) => Some(reason),
            _ => None,
        },
    }))
}
