//! # Agenda Store
//!
//! The node-local contact directory.
//!
//! This crate provides:
//! - `DirectoryStore`, a name → phone mapping guarded by a single lock
//! - `Snapshot`, a full point-in-time copy of the directory
//! - `StoreError` for rejected mutations
//!
//! ## Invariants
//!
//! - Names are unique keys
//! - Every check-then-act sequence runs under one lock acquisition
//! - The lock is never held across I/O; callers receive owned copies
//! - A rejected mutation leaves the directory unchanged
//!
//! This is a pure in-memory crate with no I/O operations.
//!
//! ```
//! use agenda_store::{DirectoryStore, StoreError};
//!
//! let store = DirectoryStore::new();
//! store.add("bob", "555-1").unwrap();
//!
//! let err = store.add("bob", "555-9").unwrap_err();
//! assert!(matches!(err, StoreError::DuplicateName { .. }));
//! assert_eq!(store.get("bob").as_deref(), Some("555-1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod directory;
mod error;

pub use directory::{ContactEntry, DirectoryStore, Snapshot};
pub use error::{StoreError, StoreResult};
