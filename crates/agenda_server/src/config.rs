//! Node configuration.

use crate::error::{ServerError, ServerResult};
use agenda_protocol::DEFAULT_MAX_FRAME_LEN;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Address of a peer's sync listener.
///
/// Configured once at startup and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// Sync port.
    pub port: u16,
}

impl PeerEndpoint {
    /// Creates a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Opens a TCP connection to the peer within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PeerUnreachable`] if the connection is refused,
    /// the host does not resolve, or `timeout` elapses first.
    pub async fn connect(&self, timeout: Duration) -> ServerResult<TcpStream> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        match tokio::time::timeout(timeout, TcpStream::connect((host, self.port))).await {
            Ok(Ok(stream)) => {
                // Frames are written whole; don't hold them back.
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(ServerError::unreachable(self, e.to_string())),
            Err(_) => Err(ServerError::unreachable(
                self,
                format!("connect timed out after {timeout:?}"),
            )),
        }
    }
}

impl fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerEndpoint {
    type Err = ServerError;

    /// Parses `host:port`. IPv6 hosts must be bracketed (`[::1]:9100`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ServerError::InvalidConfig(format!("peer '{s}' is not host:port")))?;
        if host.is_empty() {
            return Err(ServerError::InvalidConfig(format!("peer '{s}' has no host")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| ServerError::InvalidConfig(format!("peer '{s}' has a bad port: {e}")))?;
        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for PeerEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Client-facing listen address.
    pub client_addr: SocketAddr,
    /// Peer-facing sync listen address.
    pub sync_addr: SocketAddr,
    /// Peer sync endpoints, in bootstrap order.
    pub peers: Vec<PeerEndpoint>,
    /// Per-peer connect timeout (broadcast).
    pub connect_timeout: Duration,
    /// Per-peer send timeout (broadcast).
    pub send_timeout: Duration,
    /// Maximum number of peers contacted at once per broadcast.
    pub broadcast_concurrency: usize,
    /// Per-peer time budget for the bootstrap snapshot exchange.
    pub bootstrap_timeout: Duration,
    /// How long in-flight connections may run after shutdown starts.
    pub shutdown_grace: Duration,
    /// Largest accepted frame payload.
    pub max_frame_len: usize,
}

impl NodeConfig {
    /// Creates a configuration with no peers and default tunables.
    pub fn new(client_addr: SocketAddr, sync_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            sync_addr,
            peers: Vec::new(),
            connect_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            broadcast_concurrency: 4,
            bootstrap_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Appends one peer.
    pub fn with_peer(mut self, peer: PeerEndpoint) -> Self {
        self.peers.push(peer);
        self
    }

    /// Replaces the peer list.
    pub fn with_peers(mut self, peers: impl IntoIterator<Item = PeerEndpoint>) -> Self {
        self.peers = peers.into_iter().collect();
        self
    }

    /// Sets the broadcast connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the broadcast send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the broadcast fan-out limit.
    pub fn with_broadcast_concurrency(mut self, limit: usize) -> Self {
        self.broadcast_concurrency = limit;
        self
    }

    /// Sets the bootstrap timeout.
    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    /// Sets the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the frame size ceiling.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Checks the configuration for values a node cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> ServerResult<()> {
        if self.client_addr == self.sync_addr && self.client_addr.port() != 0 {
            return Err(ServerError::InvalidConfig(format!(
                "client and sync listeners share {}",
                self.client_addr
            )));
        }
        if self.broadcast_concurrency == 0 {
            return Err(ServerError::InvalidConfig(
                "broadcast concurrency must be at least 1".into(),
            ));
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            return Err(ServerError::InvalidConfig(format!(
                "max frame length {} is out of range",
                self.max_frame_len
            )));
        }
        if self.connect_timeout.is_zero() || self.send_timeout.is_zero() {
            return Err(ServerError::InvalidConfig(
                "broadcast timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(
            SocketAddr::from(([127, 0, 0, 1], 9000)),
            SocketAddr::from(([0, 0, 0, 0], 9100)),
        )
    }
}
