//! # Agenda Server
//!
//! A replicating node for the Agenda contact directory.
//!
//! This crate provides:
//! - The client-facing command server (add, remove, update, view)
//! - The peer-facing sync server (replicated mutations, snapshots)
//! - A bounded, best-effort broadcaster for local mutations
//! - The startup bootstrap that pulls a snapshot from one peer
//! - `Node`, which wires all of the above around one shared store
//! - `Client`, a thin request/response client
//!
//! # Architecture
//!
//! ```text
//! client ──► CommandServer ──► DirectoryStore
//!                 │
//!                 └──► Broadcaster ──► peer PeerSyncServer ──► peer DirectoryStore
//! ```
//!
//! Mutations received on the sync port are applied without being
//! broadcast again: replication is exactly one hop.
//!
//! # Example
//!
//! ```rust,no_run
//! use agenda_server::{Node, NodeConfig};
//!
//! # async fn run() -> agenda_server::ServerResult<()> {
//! let config = NodeConfig::new("127.0.0.1:9000".parse().unwrap(), "0.0.0.0:9100".parse().unwrap())
//!     .with_peer("127.0.0.1:9101".parse()?);
//!
//! let node = Node::new(config).start().await?;
//! // ... serve traffic ...
//! node.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod bootstrap;
mod broadcast;
mod client;
mod command;
mod config;
mod error;
mod listener;
mod node;
mod peer;
mod shutdown;

pub use bootstrap::{bootstrap, fetch_snapshot, BootstrapOutcome};
pub use broadcast::{BroadcastReport, Broadcaster};
pub use client::Client;
pub use command::CommandServer;
pub use config::{NodeConfig, PeerEndpoint};
pub use error::{ServerError, ServerResult};
pub use node::{Node, RunningNode};
pub use peer::PeerSyncServer;
pub use shutdown::{Shutdown, ShutdownTrigger};
