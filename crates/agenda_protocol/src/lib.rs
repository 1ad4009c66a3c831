//! # Agenda Protocol
//!
//! Wire types and framing shared by Agenda clients and nodes.
//!
//! This crate provides:
//! - `SyncMessage`, the tagged request record used on both the client and
//!   the peer port
//! - `Mutation`, the validated form of an add/remove/update request
//! - `Response`, the client-facing reply
//! - CBOR encoding/decoding (`encode`, `decode`)
//! - Length-prefixed async framing (`read_frame`, `write_frame`)
//!
//! ## Frame layout
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────┐
//! │ 4 bytes (BE)  │  CBOR payload                    │
//! │ payload len   │  SyncMessage / Response / map    │
//! └───────────────┴──────────────────────────────────┘
//! ```
//!
//! Every message in both directions is framed this way. Zero-length frames
//! and frames above the configured ceiling are rejected.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod codec;
mod error;
mod frame;
mod message;

pub use codec::{decode, encode};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    read_frame, read_message, write_frame, write_message, DEFAULT_MAX_FRAME_LEN, FRAME_HEADER_LEN,
};
pub use message::{Action, Mutation, Response, SyncMessage, PROTOCOL_VERSION};

pub use agenda_store::Snapshot;
