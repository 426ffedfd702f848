//! Metrics definitions for the admission service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `admission_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion. Meeting and agent
//! identifiers are never used as label values.
//! - `outcome`: granted + 4 denial reasons
//! - `operation`: lock store operations (get, try_acquire, mark_completed, release, sweep, ping)
//! - `status`: success / error (plus timeout / transient / permanent for attach)
//! - `kind`: webhook event classification (session_started, session_ended, participant_left, other)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Lock store round trips are expected to be single-digit milliseconds
        .set_buckets_for_metric(
            Matcher::Prefix("admission_store_operation".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set store operation buckets: {e}"))?
        // Agent attach is a multi-second operation
        .set_buckets_for_metric(
            Matcher::Prefix("admission_attach".to_string()),
            &[0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 20.000, 30.000, 60.000],
        )
        .map_err(|e| format!("Failed to set attach buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("admission_http_request".to_string()),
            &[0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 5.000, 30.000],
        )
        .map_err(|e| format!("Failed to set HTTP buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Admission Metrics
// ============================================================================

/// Record an admission decision.
///
/// Metric: `admission_decisions_total`
/// Labels: `outcome` (granted, rate_limited, already_admitted, lost_race, store_unavailable)
pub fn record_admission_decision(outcome: &'static str) {
    counter!("admission_decisions_total", "outcome" => outcome).increment(1);
}

/// Record a lock store operation.
///
/// Metric: `admission_store_operation_duration_seconds`, `admission_store_operations_total`
/// Labels: `operation`, `status`
pub fn record_store_operation(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("admission_store_operation_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("admission_store_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record tickets reclaimed by a sweep.
///
/// Metric: `admission_tickets_swept_total`
pub fn record_tickets_swept(count: u64) {
    counter!("admission_tickets_swept_total").increment(count);
}

/// Record an agent attach attempt sequence.
///
/// Metric: `admission_attach_total`, `admission_attach_duration_seconds`, `admission_attach_attempts`
/// Labels: `status` (success, transient, permanent, timeout)
pub fn record_attach(status: &'static str, attempts: u32, duration: Duration) {
    counter!("admission_attach_total", "status" => status).increment(1);

    histogram!("admission_attach_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    histogram!("admission_attach_attempts").record(f64::from(attempts));
}

/// Record a webhook event after dispatch.
///
/// Metric: `admission_webhook_events_total`
/// Labels: `kind`, `outcome`
pub fn record_webhook_event(kind: &'static str, outcome: &'static str) {
    counter!("admission_webhook_events_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the number of live rate limiter entries.
///
/// Metric: `admission_rate_limiter_entries`
pub fn set_rate_limiter_entries(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("admission_rate_limiter_entries").set(count as f64);
}

/// Record an HTTP request.
///
/// Metric: `admission_http_request_duration_seconds`, `admission_http_requests_total`
/// Labels: `method`, `endpoint` (route template, never the raw path), `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let status = categorize_status_code(status_code);

    histogram!("admission_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("admission_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Record an error returned from an HTTP handler.
///
/// Metric: `admission_errors_total`
/// Labels: `operation`, `error_type`, `status_code`
pub fn record_error(operation: &'static str, error_type: &'static str, status_code: u16) {
    counter!("admission_errors_total",
        "operation" => operation,
        "error_type" => error_type,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}
