//! # Admission Test Utilities
//!
//! Shared test utilities for the admission service.
//!
//! This crate provides:
//! - Server test harness (`TestAdmissionServer` for E2E tests)
//! - Webhook payload builders and signing helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use admission_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let server = TestAdmissionServer::spawn().await?;
//!
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/api/v1/webhooks/video", server.url()))
//!         .json(&webhooks::session_started("m1", None))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod webhooks;

// Re-export commonly used items
pub use server_harness::*;
