//! Best-effort fan-out of local mutations to peers.

use crate::config::{NodeConfig, PeerEndpoint};
use crate::error::{ServerError, ServerResult};
use agenda_protocol::{encode, write_frame, Mutation, SyncMessage};
use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, warn};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers that received the mutation.
    pub delivered: Vec<PeerEndpoint>,
    /// Peers that could not be reached in time.
    pub failed: Vec<PeerEndpoint>,
}

impl BroadcastReport {
    /// Returns the number of peers attempted.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    /// Returns true if every peer received the mutation.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Sends applied mutations to every configured peer.
///
/// Each peer has one outbound link: a task fed by a queue that writes
/// frames over a single reused connection, so a peer applies mutations in
/// the order this node broadcast them. A failed connect or send drops the
/// connection and the next mutation reconnects. Failures are logged and
/// dropped: they are never retried and never reach the client.
///
/// Every attempt is bounded by the timeouts, including the wait for one of
/// the `concurrency` permits shared by all links of this node. A broadcast
/// can also wait behind earlier mutations queued for the same peer.
///
/// Links are spawned on first use and stop once every clone of the
/// broadcaster is dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    links: Arc<[PeerLink]>,
    settings: LinkSettings,
}

#[derive(Debug, Clone)]
struct LinkSettings {
    permits: Arc<Semaphore>,
    connect_timeout: Duration,
    send_timeout: Duration,
    max_frame_len: usize,
}

#[derive(Debug)]
struct PeerLink {
    peer: PeerEndpoint,
    queue: OnceLock<mpsc::UnboundedSender<Delivery>>,
}

#[derive(Debug)]
struct Delivery {
    payload: Arc<[u8]>,
    done: oneshot::Sender<ServerResult<()>>,
}

impl Broadcaster {
    /// Creates a broadcaster with the default node timeouts and concurrency.
    pub fn new(peers: Vec<PeerEndpoint>) -> Self {
        Self::from_config(&NodeConfig::default().with_peers(peers))
    }

    /// Creates a broadcaster from a node configuration.
    pub fn from_config(config: &NodeConfig) -> Self {
        let links = config
            .peers
            .iter()
            .cloned()
            .map(|peer| PeerLink {
                peer,
                queue: OnceLock::new(),
            })
            .collect();
        Self {
            links,
            settings: LinkSettings {
                permits: Arc::new(Semaphore::new(config.broadcast_concurrency.max(1))),
                connect_timeout: config.connect_timeout,
                send_timeout: config.send_timeout,
                max_frame_len: config.max_frame_len,
            },
        }
    }

    /// Returns the configured peers.
    pub fn peers(&self) -> Vec<PeerEndpoint> {
        self.links.iter().map(|link| link.peer.clone()).collect()
    }

    /// Sends `mutation` to every peer and waits for all attempts to finish.
    ///
    /// Never fails: the report lists which peers were reached, in
    /// configuration order.
    pub async fn broadcast(&self, mutation: &Mutation) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if self.links.is_empty() {
            return report;
        }

        let payload: Arc<[u8]> = match encode(&SyncMessage::from(mutation.clone())) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                warn!(error = %e, "failed to encode mutation, nothing broadcast");
                report.failed = self.peers();
                return report;
            }
        };

        let mut pending = Vec::with_capacity(self.links.len());
        for link in self.links.iter() {
            let (done, outcome) = oneshot::channel();
            let delivery = Delivery {
                payload: Arc::clone(&payload),
                done,
            };
            if link.queue(&self.settings).send(delivery).is_err() {
                warn!(peer = %link.peer, "peer link stopped");
                report.failed.push(link.peer.clone());
                continue;
            }
            pending.push((link.peer.clone(), outcome));
        }

        for (peer, outcome) in pending {
            match outcome.await {
                Ok(Ok(())) => {
                    debug!(peer = %peer, action = %mutation.action(), name = %mutation.name(), "replicated");
                    report.delivered.push(peer);
                }
                Ok(Err(e)) => {
                    warn!(peer = %peer, error = %e, "broadcast to peer failed");
                    report.failed.push(peer);
                }
                Err(_) => {
                    warn!(peer = %peer, "peer link stopped before delivery");
                    report.failed.push(peer);
                }
            }
        }
        report
    }
}

impl PeerLink {
    fn queue(&self, settings: &LinkSettings) -> &mpsc::UnboundedSender<Delivery> {
        self.queue.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_link(self.peer.clone(), rx, settings.clone()));
            tx
        })
    }
}

/// Drains one peer's queue in order until the broadcaster is dropped.
async fn run_link(
    peer: PeerEndpoint,
    mut queue: mpsc::UnboundedReceiver<Delivery>,
    settings: LinkSettings,
) {
    let mut connection: Option<TcpStream> = None;
    while let Some(delivery) = queue.recv().await {
        let result = settings.deliver(&peer, &mut connection, &delivery.payload).await;
        // The broadcast may have been cancelled with its caller.
        let _ = delivery.done.send(result);
    }
    debug!(peer = %peer, "peer link closed");
}

impl LinkSettings {
    async fn deliver(
        &self,
        peer: &PeerEndpoint,
        connection: &mut Option<TcpStream>,
        payload: &[u8],
    ) -> ServerResult<()> {
        let _permit = tokio::time::timeout(
            self.connect_timeout + self.send_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| ServerError::Timeout {
            peer: peer.clone(),
            operation: "queue",
        })?
        // The semaphore is never closed.
        .ok();

        let mut stream = match connection.take() {
            Some(stream) if is_open(&stream) => stream,
            Some(_) => {
                debug!(peer = %peer, "peer closed link, reconnecting");
                peer.connect(self.connect_timeout).await?
            }
            None => peer.connect(self.connect_timeout).await?,
        };

        tokio::time::timeout(
            self.send_timeout,
            write_frame(&mut stream, payload, self.max_frame_len),
        )
        .await
        .map_err(|_| ServerError::Timeout {
            peer: peer.clone(),
            operation: "send",
        })??;

        *connection = Some(stream);
        Ok(())
    }
}

/// Returns false once the peer has closed or reset the connection.
///
/// The sync port never writes on a mutation connection, so any readable
/// state means it is gone.
fn is_open(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(stream.try_read(&mut buf), Err(e) if e.kind() == io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_protocol::{read_message, DEFAULT_MAX_FRAME_LEN};
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn add(name: &str) -> Mutation {
        Mutation::Add {
            name: name.into(),
            phone: "555".into(),
        }
    }

    #[tokio::test]
    async fn no_peers_is_empty_report() {
        let report = Broadcaster::new(Vec::new())
            .broadcast(&Mutation::Remove { name: "bob".into() })
            .await;
        assert_eq!(report, BroadcastReport::default());
        assert!(report.is_complete());
    }

    #[test]
    fn new_uses_node_defaults() {
        let peer = PeerEndpoint::new("127.0.0.1", 9100);
        let defaults = NodeConfig::default();
        let broadcaster = Broadcaster::new(vec![peer.clone()]);

        assert_eq!(broadcaster.peers(), vec![peer]);
        assert_eq!(broadcaster.settings.connect_timeout, defaults.connect_timeout);
        assert_eq!(broadcaster.settings.send_timeout, defaults.send_timeout);
        assert_eq!(broadcaster.settings.max_frame_len, defaults.max_frame_len);
        assert_eq!(
            broadcaster.settings.permits.available_permits(),
            defaults.broadcast_concurrency
        );
    }

    #[tokio::test]
    async fn delivers_one_frame_per_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerEndpoint::from(listener.local_addr().unwrap());

        let receiver = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let first: Option<SyncMessage> =
                read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            let end: Option<SyncMessage> =
                read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            (first, end)
        });

        let mutation = Mutation::Add {
            name: "carol".into(),
            phone: "555-2".into(),
        };
        let broadcaster = Broadcaster::new(vec![peer.clone()]);
        let report = broadcaster.broadcast(&mutation).await;
        assert_eq!(report.delivered, vec![peer]);
        drop(broadcaster);

        let (first, end) = receiver.await.unwrap();
        assert_eq!(first, Some(SyncMessage::add("carol", "555-2")));
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn successive_mutations_share_one_ordered_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerEndpoint::from(listener.local_addr().unwrap());
        let broadcaster = Broadcaster::new(vec![peer]);

        // Nothing is accepted yet, so every frame queues on one connection.
        for i in 0..20 {
            let name = format!("n{i}");
            assert!(broadcaster.broadcast(&add(&name)).await.is_complete());
            assert!(broadcaster
                .broadcast(&Mutation::Remove { name })
                .await
                .is_complete());
        }

        let (mut stream, _) = listener.accept().await.unwrap();
        for i in 0..20 {
            let name = format!("n{i}");
            let first: Option<SyncMessage> =
                read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            assert_eq!(first, Some(SyncMessage::add(&name, "555")));
            let second: Option<SyncMessage> =
                read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            assert_eq!(second, Some(SyncMessage::remove(&name)));
        }

        drop(broadcaster);
        let end: Option<SyncMessage> =
            read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn reconnects_after_peer_closes_link() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerEndpoint::from(listener.local_addr().unwrap());
        let broadcaster = Broadcaster::new(vec![peer.clone()]);

        assert!(broadcaster.broadcast(&add("first")).await.is_complete());
        let (mut stream, _) = listener.accept().await.unwrap();
        let first: Option<SyncMessage> =
            read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(first, Some(SyncMessage::add("first", "555")));
        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = broadcaster.broadcast(&add("second")).await;
        assert_eq!(report.delivered, vec![peer]);
        let (mut stream, _) = listener.accept().await.unwrap();
        let second: Option<SyncMessage> =
            read_message(&mut stream, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(second, Some(SyncMessage::add("second", "555")));
    }

    #[tokio::test]
    async fn unreachable_peers_are_reported_not_raised() {
        let down = PeerEndpoint::new("127.0.0.1", closed_port().await);
        let config = NodeConfig::default()
            .with_peer(down.clone())
            .with_connect_timeout(Duration::from_millis(200));

        let report = Broadcaster::from_config(&config)
            .broadcast(&Mutation::Remove { name: "x".into() })
            .await;
        assert_eq!(report.failed, vec![down]);
        assert_eq!(report.attempted(), 1);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn permit_wait_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = PeerEndpoint::from(listener.local_addr().unwrap());
        let config = NodeConfig::default()
            .with_peer(peer.clone())
            .with_broadcast_concurrency(1)
            .with_connect_timeout(Duration::from_millis(50))
            .with_send_timeout(Duration::from_millis(50));
        let broadcaster = Broadcaster::from_config(&config);

        let held = Arc::clone(&broadcaster.settings.permits)
            .acquire_owned()
            .await
            .unwrap();
        let report = tokio::time::timeout(
            Duration::from_secs(2),
            broadcaster.broadcast(&add("starved")),
        )
        .await
        .unwrap();
        assert_eq!(report.failed, vec![peer.clone()]);

        drop(held);
        let report = broadcaster.broadcast(&add("fed")).await;
        assert_eq!(report.delivered, vec![peer]);
    }

    #[tokio::test]
    async fn mixed_peers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = PeerEndpoint::from(listener.local_addr().unwrap());
        let down = PeerEndpoint::new("127.0.0.1", closed_port().await);
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let _: Option<SyncMessage> = read_message(&mut stream, DEFAULT_MAX_FRAME_LEN)
                .await
                .unwrap();
        });

        let config = NodeConfig::default()
            .with_peers([down.clone(), up.clone()])
            .with_broadcast_concurrency(1);
        let report = Broadcaster::from_config(&config)
            .broadcast(&Mutation::Update {
                name: "a".into(),
                phone: "1".into(),
            })
            .await;
        assert_eq!(report.delivered, vec![up]);
        assert_eq!(report.failed, vec![down]);
    }
}
