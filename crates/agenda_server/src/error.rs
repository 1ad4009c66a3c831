//! Error types for the node.

use crate::config::PeerEndpoint;
use agenda_protocol::ProtocolError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for node operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while running a node.
///
/// Store rejections (`DuplicateName`, `NotFound`) are not listed here:
/// they are answered to the client as error responses.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Could not bind a listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A peer refused, or did not accept, a connection.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable {
        /// Peer that was dialled.
        peer: PeerEndpoint,
        /// Why the connection failed.
        reason: String,
    },

    /// A peer exchange exceeded its time budget.
    #[error("{operation} with peer {peer} timed out")]
    Timeout {
        /// Peer involved.
        peer: PeerEndpoint,
        /// The exchange that timed out.
        operation: &'static str,
    },

    /// Framing or codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The remote side answered with something other than what was asked for.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a peer unreachable error.
    pub fn unreachable(peer: &PeerEndpoint, reason: impl Into<String>) -> Self {
        Self::PeerUnreachable {
            peer: peer.clone(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error came from failing to reach a peer.
    ///
    /// Such errors are logged and dropped; they never fail the node.
    pub fn is_peer_failure(&self) -> bool {
        matches!(
            self,
            ServerError::PeerUnreachable { .. } | ServerError::Timeout { .. }
        ) || matches!(self, ServerError::Protocol(e) if e.is_disconnect())
    }
}
