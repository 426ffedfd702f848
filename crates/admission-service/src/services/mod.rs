//! Service layer for the admission service.
//!
//! # Components
//!
//! - `rate_limiter` - Process-local per-meeting attempt throttle
//! - `admission_controller` - At-most-once admission decisions over the lock store
//! - `agent_attacher` - HTTP client for the agent connector
//! - `agent_connect` - Admission + attach + confirm/abort bracket
//! - `event_dispatcher` - Webhook event routing

pub mod admission_controller;
pub mod agent_attacher;
pub mod agent_connect;
pub mod event_dispatcher;
pub mod rate_limiter;

pub use admission_controller::{AdmissionController, AdmissionPolicy};
pub use agent_attacher::{AgentAttacher, AttachError, HttpAgentAttacher};
pub use agent_connect::{AgentConnectService, AttachPolicy, ConnectOutcome};
pub use event_dispatcher::{DispatchError, DispatchOutcome, EventDispatcher, WebhookEvent};
pub use rate_limiter::RateLimiter;
