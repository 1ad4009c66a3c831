//! Startup snapshot pull.

use crate::config::PeerEndpoint;
use crate::error::{ServerError, ServerResult};
use agenda_protocol::{read_message, write_message, Snapshot, SyncMessage};
use agenda_store::DirectoryStore;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of the startup bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A snapshot was fetched and merged.
    Merged {
        /// Peer that supplied the snapshot.
        peer: PeerEndpoint,
        /// Number of entries in the snapshot.
        entries: usize,
    },
    /// No peer answered; the node starts with its current contents.
    NoPeerReachable,
}

impl BootstrapOutcome {
    /// Returns the peer the snapshot came from, if any.
    pub fn source(&self) -> Option<&PeerEndpoint> {
        match self {
            BootstrapOutcome::Merged { peer, .. } => Some(peer),
            BootstrapOutcome::NoPeerReachable => None,
        }
    }
}

/// Requests a full snapshot from `peer`.
///
/// The whole exchange (connect, request, reply) must complete within
/// `timeout`. The peer's state is not modified.
///
/// # Errors
///
/// Returns [`ServerError::PeerUnreachable`] or [`ServerError::Timeout`] if
/// the peer cannot be reached in time, and
/// [`ServerError::UnexpectedResponse`] if it closes without replying.
pub async fn fetch_snapshot(
    peer: &PeerEndpoint,
    timeout: Duration,
    max_frame_len: usize,
) -> ServerResult<Snapshot> {
    let exchange = async {
        let mut stream = peer.connect(timeout).await?;
        write_message(&mut stream, &SyncMessage::fetch_snapshot(), max_frame_len).await?;
        read_message::<_, Snapshot>(&mut stream, max_frame_len)
            .await?
            .ok_or_else(|| {
                ServerError::UnexpectedResponse(format!("{peer} closed without a snapshot"))
            })
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ServerError::Timeout {
            peer: peer.clone(),
            operation: "snapshot fetch",
        })?
}

/// Seeds `store` from the first peer that answers.
///
/// Peers are tried in order; the first snapshot received is merged and the
/// rest are not contacted. Failures are logged and skipped. Never fails.
pub async fn bootstrap(
    store: &DirectoryStore,
    peers: &[PeerEndpoint],
    timeout: Duration,
    max_frame_len: usize,
) -> BootstrapOutcome {
    for peer in peers {
        debug!(peer = %peer, "requesting snapshot");
        match fetch_snapshot(peer, timeout, max_frame_len).await {
            Ok(snapshot) => {
                let entries = snapshot.len();
                let changed = store.merge_snapshot(snapshot);
                info!(peer = %peer, entries, changed, "bootstrapped from peer");
                return BootstrapOutcome::Merged {
                    peer: peer.clone(),
                    entries,
                };
            }
            Err(e) => warn!(peer = %peer, error = %e, "bootstrap peer unavailable"),
        }
    }

    if !peers.is_empty() {
        info!("no peer reachable, starting with an empty directory");
    }
    BootstrapOutcome::NoPeerReachable
}
