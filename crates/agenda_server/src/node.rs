//! Node lifecycle: bind, bootstrap, serve, shut down.

use crate::bootstrap::{bootstrap, BootstrapOutcome};
use crate::broadcast::Broadcaster;
use crate::command::CommandServer;
use crate::config::NodeConfig;
use crate::error::{ServerError, ServerResult};
use crate::peer::PeerSyncServer;
use crate::shutdown::{self, Shutdown, ShutdownTrigger};
use agenda_store::DirectoryStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// A node that has not started yet.
///
/// # Example
///
/// ```rust,no_run
/// use agenda_server::{Node, NodeConfig};
///
/// # async fn run() -> agenda_server::ServerResult<()> {
/// Node::new(NodeConfig::default())
///     .run_until(async { tokio::signal::ctrl_c().await.ok(); })
///     .await
/// # }
/// ```
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    store: Arc<DirectoryStore>,
}

impl Node {
    /// Creates a node with an empty store.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            store: Arc::new(DirectoryStore::new()),
        }
    }

    /// Uses `store` instead of a fresh empty one.
    pub fn with_store(mut self, store: Arc<DirectoryStore>) -> Self {
        self.store = store;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Binds both configured addresses and starts the node.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] for an unusable configuration
    /// and [`ServerError::Bind`] if either address cannot be bound.
    pub async fn start(self) -> ServerResult<RunningNode> {
        self.config.validate()?;
        let client = bind(self.config.client_addr).await?;
        let sync = bind(self.config.sync_addr).await?;
        self.start_on(client, sync).await
    }

    /// Starts the node on already-bound listeners.
    ///
    /// The configured bind addresses are ignored. Bootstrap completes
    /// before either listener accepts, so replicated mutations that queue
    /// up meanwhile are applied on top of the merged snapshot.
    pub async fn start_on(
        self,
        client_listener: TcpListener,
        sync_listener: TcpListener,
    ) -> ServerResult<RunningNode> {
        let Node { config, store } = self;
        config.validate()?;
        let client_addr = client_listener.local_addr()?;
        let sync_addr = sync_listener.local_addr()?;

        let outcome = bootstrap(
            &store,
            &config.peers,
            config.bootstrap_timeout,
            config.max_frame_len,
        )
        .await;

        let (trigger, signal) = shutdown::channel();
        let commands = Arc::new(
            CommandServer::new(Arc::clone(&store), Broadcaster::from_config(&config))
                .with_max_frame_len(config.max_frame_len),
        );
        let sync = Arc::new(
            PeerSyncServer::new(Arc::clone(&store)).with_max_frame_len(config.max_frame_len),
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(commands.serve(client_listener, signal.clone(), config.shutdown_grace));
        tasks.spawn(sync.serve(sync_listener, signal, config.shutdown_grace));

        info!(
            client = %client_addr,
            sync = %sync_addr,
            peers = config.peers.len(),
            entries = store.len(),
            "node started"
        );

        Ok(RunningNode {
            client_addr,
            sync_addr,
            store,
            bootstrap: outcome,
            trigger,
            tasks,
        })
    }

    /// Starts the node, runs until `signal` completes, then shuts down.
    pub async fn run_until<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let node = self.start().await?;
        signal.await;
        info!("shutdown requested");
        node.shutdown().await;
        Ok(())
    }
}

async fn bind(addr: SocketAddr) -> ServerResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// A node that is accepting connections.
///
/// Dropping it without calling [`RunningNode::shutdown`] stops both
/// listeners and aborts in-flight connections.
#[derive(Debug)]
pub struct RunningNode {
    client_addr: SocketAddr,
    sync_addr: SocketAddr,
    store: Arc<DirectoryStore>,
    bootstrap: BootstrapOutcome,
    trigger: ShutdownTrigger,
    tasks: JoinSet<()>,
}

impl RunningNode {
    /// Returns the bound client address.
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Returns the bound sync address.
    pub fn sync_addr(&self) -> SocketAddr {
        self.sync_addr
    }

    /// Returns the node's store.
    pub fn store(&self) -> &Arc<DirectoryStore> {
        &self.store
    }

    /// Returns what the startup bootstrap did.
    pub fn bootstrap_outcome(&self) -> &BootstrapOutcome {
        &self.bootstrap
    }

    /// Returns a listener that fires when this node begins shutting down.
    pub fn shutdown_signal(&self) -> Shutdown {
        self.trigger.subscribe()
    }

    /// Stops accepting, lets in-flight requests finish within the grace
    /// period, and waits for both listeners to drain.
    pub async fn shutdown(mut self) {
        self.trigger.trigger();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "listener task failed");
            }
        }
        info!(client = %self.client_addr, sync = %self.sync_addr, "node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use agenda_protocol::Response;
    use std::time::Duration;
    use tokio::net::TcpStream;

    fn local() -> NodeConfig {
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        NodeConfig::new(any, any)
    }

    #[tokio::test]
    async fn start_serve_and_stop() {
        let node = Node::new(local()).start().await.unwrap();
        assert_eq!(node.bootstrap_outcome(), &BootstrapOutcome::NoPeerReachable);

        let mut client = Client::connect(node.client_addr()).await.unwrap();
        let response = client.add("bob", "555-1").await.unwrap();
        assert_eq!(response, Response::success("contact bob added successfully"));
        assert_eq!(node.store().get("bob").as_deref(), Some("555-1"));
        drop(client);

        let addr = node.client_addr();
        tokio::time::timeout(Duration::from_secs(5), node.shutdown())
            .await
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let config = NodeConfig::new(addr, "127.0.0.1:0".parse().unwrap());

        let err = Node::new(config).start().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { addr: a, .. } if a == addr));
    }

    #[tokio::test]
    async fn with_store_is_served() {
        let store = Arc::new(DirectoryStore::new());
        store.add("alice", "123").unwrap();
        let node = Node::new(local())
            .with_store(Arc::clone(&store))
            .start()
            .await
            .unwrap();

        let mut client = Client::connect(node.client_addr()).await.unwrap();
        let snapshot = client.view().await.unwrap();
        assert_eq!(snapshot.get("alice").map(String::as_str), Some("123"));
        node.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_signal_fires() {
        let node = Node::new(local()).start().await.unwrap();
        let mut signal = node.shutdown_signal();
        assert!(!signal.is_triggered());
        node.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }
}
