//! Test fixtures and node helpers.
//!
//! Every node binds `127.0.0.1:0`, so tests can run in parallel without
//! port clashes.

use agenda_server::{Client, Node, NodeConfig, PeerEndpoint, RunningNode};
use agenda_store::DirectoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// Bootstrap budget used by test nodes.
pub const TEST_BOOTSTRAP_TIMEOUT: Duration = Duration::from_millis(300);

/// How long [`eventually`] waits before failing.
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns a loopback configuration with short timeouts.
pub fn test_config() -> NodeConfig {
    let any = SocketAddr::from(([127, 0, 0, 1], 0));
    NodeConfig::new(any, any)
        .with_connect_timeout(Duration::from_millis(500))
        .with_send_timeout(Duration::from_millis(500))
        .with_bootstrap_timeout(TEST_BOOTSTRAP_TIMEOUT)
        .with_shutdown_grace(Duration::from_secs(1))
}

/// Binds a fresh loopback listener.
pub async fn bind_loopback() -> TcpListener {
    TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind loopback listener")
}

/// Returns an endpoint nothing listens on.
pub async fn unreachable_endpoint() -> PeerEndpoint {
    let listener = bind_loopback().await;
    let addr = listener.local_addr().expect("Failed to read local address");
    drop(listener);
    PeerEndpoint::from(addr)
}

/// A running node with automatic shutdown on drop.
#[derive(Debug)]
pub struct TestNode {
    node: RunningNode,
}

impl TestNode {
    /// Starts a node with no peers.
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    /// Starts a node that replicates to and bootstraps from `peers`.
    pub async fn with_peers(peers: impl IntoIterator<Item = PeerEndpoint>) -> Self {
        Self::with_config(test_config().with_peers(peers)).await
    }

    /// Starts a node from `config` on fresh ephemeral ports.
    pub async fn with_config(config: NodeConfig) -> Self {
        let client = bind_loopback().await;
        let sync = bind_loopback().await;
        Self::start_on(config, client, sync).await
    }

    /// Starts a node on pre-bound listeners.
    pub async fn start_on(config: NodeConfig, client: TcpListener, sync: TcpListener) -> Self {
        let node = Node::new(config)
            .start_on(client, sync)
            .await
            .expect("Failed to start test node");
        Self { node }
    }

    /// Starts a node serving `store`.
    pub async fn with_store(store: Arc<DirectoryStore>) -> Self {
        let node = Node::new(test_config())
            .with_store(store)
            .start_on(bind_loopback().await, bind_loopback().await)
            .await
            .expect("Failed to start test node");
        Self { node }
    }

    /// Starts two nodes that list each other as peers.
    ///
    /// Both bootstraps run concurrently; since neither node accepts
    /// until its own bootstrap ends, both time out and start empty.
    pub async fn mutual_pair() -> (Self, Self) {
        let (a_client, a_sync) = (bind_loopback().await, bind_loopback().await);
        let (b_client, b_sync) = (bind_loopback().await, bind_loopback().await);
        let a_peer = PeerEndpoint::from(a_sync.local_addr().expect("Failed to read local address"));
        let b_peer = PeerEndpoint::from(b_sync.local_addr().expect("Failed to read local address"));

        tokio::join!(
            Self::start_on(test_config().with_peer(b_peer), a_client, a_sync),
            Self::start_on(test_config().with_peer(a_peer), b_client, b_sync),
        )
    }

    /// Returns this node's sync endpoint, for use as another node's peer.
    pub fn peer_endpoint(&self) -> PeerEndpoint {
        PeerEndpoint::from(self.node.sync_addr())
    }

    /// Opens a client connection to this node.
    pub async fn client(&self) -> Client {
        Client::connect(self.node.client_addr())
            .await
            .expect("Failed to connect client")
    }

    /// Shuts the node down and waits for it to drain.
    pub async fn stop(self) {
        self.node.shutdown().await;
    }
}

impl std::ops::Deref for TestNode {
    type Target = RunningNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

/// Polls `condition` until it holds, or panics after [`EVENTUALLY_TIMEOUT`].
pub async fn eventually<F>(condition: F)
where
    F: FnMut() -> bool,
{
    assert!(
        eventually_within(EVENTUALLY_TIMEOUT, condition).await,
        "condition not met within {EVENTUALLY_TIMEOUT:?}"
    );
}

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
///
/// Returns whether the condition was met.
pub async fn eventually_within<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Waits a short while and returns whether `condition` stayed false.
///
/// Used to check that something does *not* happen.
pub async fn never_within<F>(window: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    !eventually_within(window, &mut condition).await
}
