//! Observability for the admission service.
//!
//! Provides Prometheus metric definitions and recorder setup.

pub mod metrics;
