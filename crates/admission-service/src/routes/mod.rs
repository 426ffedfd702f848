//! HTTP routes for the admission service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{AdmissionController, AgentConnectService, EventDispatcher};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Slack added to the request timeout on top of the attach budget.
const REQUEST_TIMEOUT_SLACK_SECS: u64 = 10;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Admission decisions and ticket lifecycle.
    pub controller: Arc<AdmissionController>,

    /// Admission + attach bracket used by the synchronous API.
    pub connect: Arc<AgentConnectService>,

    /// Webhook event routing.
    pub dispatcher: Arc<EventDispatcher>,
}

/// Request timeout long enough for every attach attempt plus backoff.
///
/// The attach itself runs detached from the request, so this only bounds how
/// long a caller waits for its answer.
pub fn request_timeout(config: &Config) -> Duration {
    config.attach_budget() + Duration::from_secs(REQUEST_TIMEOUT_SLACK_SECS)
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe
/// - `/ready` - Readiness probe (lock store ping)
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/v1/webhooks/video` - Video platform webhooks
/// - `/api/v1/meetings/:meeting_id/agent` - Connect / release an agent
/// - `/api/v1/meetings/:meeting_id/admission` - Ticket inspection
/// - `/internal/sweep` - On-demand sweep for external schedulers
/// - TraceLayer for request logging
/// - HTTP metrics middleware
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let timeout = request_timeout(&state.config);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/webhooks/video", post(handlers::handle_video_webhook))
        .route(
            "/api/v1/meetings/:meeting_id/agent",
            post(handlers::connect_agent).delete(handlers::disconnect_agent),
        )
        .route(
            "/api/v1/meetings/:meeting_id/admission",
            get(handlers::get_admission),
        )
        .route("/internal/sweep", post(handlers::sweep_tickets))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_request_timeout_covers_all_attach_attempts() {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/admission".to_string(),
            ),
            ("ATTACH_TIMEOUT_SECONDS".to_string(), "30".to_string()),
            ("ATTACH_MAX_ATTEMPTS".to_string(), "3".to_string()),
            ("WEBHOOK_VERIFY".to_string(), "false".to_string()),
        ]);
        let config = Config::from_vars(&vars).expect("valid config");

        assert!(request_timeout(&config) > Duration::from_secs(90));
        assert!(request_timeout(&config) > config.attach_budget());
    }
}
