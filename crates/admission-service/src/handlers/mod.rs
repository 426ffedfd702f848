//! HTTP request handlers for the admission service.

pub mod admin;
pub mod agents;
pub mod health;
pub mod metrics;
pub mod webhooks;

pub use admin::sweep_tickets;
pub use agents::{connect_agent, disconnect_agent, get_admission};
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use webhooks::handle_video_webhook;
