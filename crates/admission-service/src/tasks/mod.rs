//! Background tasks for the admission service.
//!
//! # Tasks
//!
//! - `ticket_sweeper` - Reclaims tickets older than the maximum ticket age

pub mod ticket_sweeper;

pub use ticket_sweeper::{start_ticket_sweeper, TicketSweeperConfig};
