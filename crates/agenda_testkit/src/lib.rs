//! # Agenda Testkit
//!
//! Test utilities for Agenda nodes.
//!
//! This crate provides:
//! - Nodes on ephemeral loopback ports, alone or as mutual peers
//! - Polling helpers for eventually-consistent assertions
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agenda_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn replicates() {
//!     let (a, b) = TestNode::mutual_pair().await;
//!     a.client().await.add("carol", "555-2").await.unwrap();
//!     eventually(|| b.store().get("carol").is_some()).await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
