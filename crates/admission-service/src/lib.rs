//! Agent Admission Service Library
//!
//! This library provides at-most-once admission control for attaching a
//! single AI agent participant to a meeting. Several independent entry points
//! race to attach the agent:
//!
//! - Video platform webhooks (at-least-once, possibly duplicated or reordered)
//! - A synchronous "connect agent" API call made by a user
//!
//! All of them funnel through one [`services::AdmissionController`], whose
//! only synchronization primitive is the lock store's atomic conditional
//! insert. Nothing held in process memory is load-bearing for correctness.
//!
//! # Architecture
//!
//! The service follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//!                                   tasks/*.rs (background sweep)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers (webhooks, agent API, health)
//! - `middleware` - HTTP metrics middleware
//! - `models` - Admission tickets, decisions, API payloads
//! - `observability` - Prometheus metrics
//! - `repositories` - Lock store trait and its Postgres / in-memory implementations
//! - `routes` - Axum router setup
//! - `services` - Rate limiter, admission controller, attach bracket, event dispatcher
//! - `tasks` - Background ticket sweeper

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
