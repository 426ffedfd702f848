//! Repository layer for the admission service.
//!
//! The lock store is the only shared mutable state in the system. Every
//! service instance talks to the same store, so correctness never depends on
//! which instance handles a request.
//!
//! - `admission_tickets` - `LockStore` trait and the Postgres implementation
//! - `in_memory` - single-process implementation for tests and local runs

pub mod admission_tickets;
pub mod in_memory;

pub use admission_tickets::{LockStore, PgLockStore};
pub use in_memory::InMemoryLockStore;
