//! Peer-facing sync server.

use crate::error::{ServerError, ServerResult};
use crate::listener::accept_loop;
use crate::shutdown::Shutdown;
use agenda_protocol::{
    decode, read_frame, write_message, Action, Mutation, ProtocolError, Snapshot, SyncMessage,
    DEFAULT_MAX_FRAME_LEN,
};
use agenda_store::DirectoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Applies replicated mutations from peers and serves snapshots.
///
/// Mutations received here are applied through the replica path and are
/// never broadcast again, so replication stops after one hop.
#[derive(Debug)]
pub struct PeerSyncServer {
    store: Arc<DirectoryStore>,
    max_frame_len: usize,
}

impl PeerSyncServer {
    /// Creates a sync server over `store`.
    pub fn new(store: Arc<DirectoryStore>) -> Self {
        Self {
            store,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Sets the frame size ceiling.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Handles one message from a peer.
    ///
    /// Returns the snapshot to send back for `FetchSnapshot`, and `None`
    /// for mutations, which get no reply.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for `View`, an incompatible version, or a
    /// mutation with missing fields. The store is untouched in that case.
    pub fn handle_message(&self, message: SyncMessage) -> ServerResult<Option<Snapshot>> {
        message.check_version()?;
        match message.action {
            Action::FetchSnapshot => Ok(Some(self.store.view())),
            Action::View => Err(ProtocolError::UnexpectedAction {
                action: Action::View.as_str(),
            }
            .into()),
            Action::Add | Action::Remove | Action::Update => {
                let mutation = message.into_mutation()?;
                let changed = match &mutation {
                    Mutation::Add { name, phone } | Mutation::Update { name, phone } => {
                        self.store.replicate_put(name, phone)
                    }
                    Mutation::Remove { name } => self.store.replicate_remove(name),
                };
                info!(
                    action = %mutation.action(),
                    name = %mutation.name(),
                    changed,
                    "applied replicated mutation"
                );
                Ok(None)
            }
        }
    }

    /// Runs the message loop for one peer connection.
    pub async fn handle_connection<S>(&self, mut stream: S, remote: SocketAddr, mut shutdown: Shutdown)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                frame = read_frame(&mut stream, self.max_frame_len) => frame,
            };

            let reply = match frame {
                Ok(Some(payload)) => decode::<SyncMessage>(&payload)
                    .map_err(ServerError::from)
                    .and_then(|message| self.handle_message(message)),
                Ok(None) => {
                    debug!(peer = %remote, "peer closed connection");
                    break;
                }
                Err(e) => Err(ServerError::from(e)),
            };

            match reply {
                Ok(Some(snapshot)) => {
                    debug!(peer = %remote, entries = snapshot.len(), "serving snapshot");
                    if let Err(e) = write_message(&mut stream, &snapshot, self.max_frame_len).await {
                        warn!(peer = %remote, error = %e, "failed to send snapshot");
                        break;
                    }
                }
                Ok(None) => {}
                // Peers get no error replies: every failure ends the connection.
                Err(ServerError::Protocol(e)) if e.is_disconnect() => {
                    debug!(peer = %remote, error = %e, "peer connection lost");
                    break;
                }
                Err(ServerError::Protocol(e)) if e.is_recoverable() => {
                    warn!(peer = %remote, error = %e, "protocol violation, closing");
                    break;
                }
                Err(e) => {
                    warn!(peer = %remote, error = %e, "unreadable frame from peer, closing");
                    break;
                }
            }
        }
    }

    /// Accepts peer connections until shutdown.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: Shutdown, grace: Duration) {
        accept_loop(listener, "sync", shutdown, grace, move |stream, remote, shutdown| {
            let server = Arc::clone(&self);
            async move { server.handle_connection(stream, remote, shutdown).await }
        })
        .await;
    }
}
