//! Client-facing command server.

use crate::broadcast::Broadcaster;
use crate::listener::accept_loop;
use crate::shutdown::Shutdown;
use agenda_protocol::{
    decode, read_frame, write_message, Action, Mutation, ProtocolError, Response, SyncMessage,
    DEFAULT_MAX_FRAME_LEN,
};
use agenda_store::{DirectoryStore, StoreResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Serves add, remove, update and view requests from clients.
///
/// Each request gets exactly one response, written before the next
/// request on the same connection is read.
#[derive(Debug)]
pub struct CommandServer {
    store: Arc<DirectoryStore>,
    broadcaster: Broadcaster,
    max_frame_len: usize,
}

impl CommandServer {
    /// Creates a command server over `store`.
    pub fn new(store: Arc<DirectoryStore>, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            broadcaster,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Sets the frame size ceiling.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<DirectoryStore> {
        &self.store
    }

    /// Handles one decoded request.
    ///
    /// A successful mutation is broadcast to peers before this returns.
    /// Rejected requests produce [`Response::Error`] and leave the store
    /// unchanged.
    pub async fn handle_request(&self, request: SyncMessage) -> Response {
        if let Err(e) = request.check_version() {
            return Response::error(e.to_string());
        }

        match request.action {
            Action::View => return Response::directory(self.store.view()),
            Action::FetchSnapshot => {
                return Response::error("fetch_snapshot is only served on the sync port")
            }
            Action::Add | Action::Remove | Action::Update => {}
        }

        let mutation = match request.into_mutation() {
            Ok(mutation) => mutation,
            Err(e) => return Response::error(e.to_string()),
        };

        if let Err(e) = self.apply(&mutation) {
            debug!(action = %mutation.action(), name = %mutation.name(), error = %e, "rejected");
            return Response::error(e.to_string());
        }
        info!(action = %mutation.action(), name = %mutation.name(), "applied");

        let report = self.broadcaster.broadcast(&mutation).await;
        if !report.is_complete() {
            debug!(
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "partial broadcast"
            );
        }
        Response::success(mutation.success_text())
    }

    fn apply(&self, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::Add { name, phone } => self.store.add(name, phone),
            Mutation::Remove { name } => self.store.remove(name),
            Mutation::Update { name, phone } => self.store.update(name, phone),
        }
    }

    /// Runs the request loop for one connection until the client closes
    /// it, the transport fails, or shutdown is signalled.
    pub async fn handle_connection<S>(&self, mut stream: S, remote: SocketAddr, mut shutdown: Shutdown)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    debug!(%remote, "closing client connection for shutdown");
                    break;
                }
                frame = read_frame(&mut stream, self.max_frame_len) => frame,
            };

            let request = match frame {
                Ok(Some(payload)) => decode::<SyncMessage>(&payload),
                Ok(None) => {
                    debug!(%remote, "client closed connection");
                    break;
                }
                Err(e) => Err(e),
            };

            let response = match request {
                Ok(request) => {
                    debug!(%remote, action = %request.action, "request");
                    self.handle_request(request).await
                }
                Err(e) if e.is_recoverable() => {
                    warn!(%remote, error = %e, "malformed request");
                    Response::error(format!("malformed request: {e}"))
                }
                Err(e) if e.is_disconnect() => {
                    debug!(%remote, error = %e, "client connection lost");
                    break;
                }
                Err(e) => {
                    warn!(%remote, error = %e, "unreadable frame, closing connection");
                    break;
                }
            };

            let written = match write_message(&mut stream, &response, self.max_frame_len).await {
                Err(ProtocolError::FrameTooLarge { len, max }) => {
                    warn!(%remote, len, max, "response exceeds frame limit");
                    let fallback = Response::error(format!(
                        "response of {len} bytes exceeds limit of {max} bytes"
                    ));
                    write_message(&mut stream, &fallback, self.max_frame_len).await
                }
                other => other,
            };
            if let Err(e) = written {
                debug!(%remote, error = %e, "failed to write response");
                break;
            }
        }
    }

    /// Accepts client connections until shutdown.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: Shutdown, grace: Duration) {
        accept_loop(listener, "client", shutdown, grace, move |stream, remote, shutdown| {
            let server = Arc::clone(&self);
            async move { server.handle_connection(stream, remote, shutdown).await }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use agenda_protocol::{encode, read_message, write_frame};
    use agenda_store::Snapshot;
    use tokio::io::duplex;

    fn server() -> CommandServer {
        CommandServer::new(Arc::new(DirectoryStore::new()), Broadcaster::new(Vec::new()))
    }

    fn remote() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn add_then_view() {
        let server = server();
        let response = server.handle_request(SyncMessage::add("bob", "555-1")).await;
        assert_eq!(response, Response::success("contact bob added successfully"));

        let mut expected = Snapshot::new();
        expected.insert("bob".into(), "555-1".into());
        assert_eq!(
            server.handle_request(SyncMessage::view()).await,
            Response::Directory(expected)
        );
    }

    #[tokio::test]
    async fn duplicate_add_is_error() {
        let server = server();
        server.handle_request(SyncMessage::add("bob", "555-1")).await;
        let response = server.handle_request(SyncMessage::add("bob", "555-9")).await;
        assert!(!response.is_success());
        assert_eq!(server.store().get("bob").as_deref(), Some("555-1"));
    }

    #[tokio::test]
    async fn remove_missing_is_error() {
        let server = server();
        let response = server.handle_request(SyncMessage::remove("ghost")).await;
        assert_eq!(response, Response::error("contact ghost not found"));
        assert_eq!(server.handle_request(SyncMessage::view()).await, Response::Empty);
    }

    #[tokio::test]
    async fn update_existing() {
        let server = server();
        server.handle_request(SyncMessage::add("alice", "1")).await;
        let response = server.handle_request(SyncMessage::update("alice", "2")).await;
        assert_eq!(response, Response::success("contact alice updated successfully"));
        assert_eq!(server.store().get("alice").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn fetch_snapshot_rejected_on_client_port() {
        let server = server();
        let response = server.handle_request(SyncMessage::fetch_snapshot()).await;
        assert!(matches!(response, Response::Error(_)));
    }

    #[tokio::test]
    async fn missing_phone_rejected() {
        let server = server();
        let request = SyncMessage::new(Action::Add, Some("bob".into()), None);
        let response = server.handle_request(request).await;
        assert!(matches!(response, Response::Error(text) if text.contains("phone")));
        assert!(server.store().is_empty());
    }

    #[tokio::test]
    async fn wrong_version_rejected() {
        let server = server();
        let mut request = SyncMessage::add("bob", "1");
        request.version = 99;
        let response = server.handle_request(request).await;
        assert!(matches!(response, Response::Error(text) if text.contains("99")));
        assert!(server.store().is_empty());
    }

    #[tokio::test]
    async fn connection_survives_malformed_payload() {
        let server = server();
        let (mut client, conn) = duplex(4096);
        let (_trigger, rx) = shutdown::channel();
        let task = tokio::spawn(async move { server.handle_connection(conn, remote(), rx).await });

        write_frame(&mut client, b"not cbor at all", DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        let first: Response = read_message(&mut client, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, Response::Error(_)));

        let payload = encode(&SyncMessage::view()).unwrap();
        write_frame(&mut client, &payload, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        let second: Response = read_message(&mut client, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, Response::Empty);

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let server = server().with_max_frame_len(64);
        let (mut client, conn) = duplex(4096);
        let (_trigger, rx) = shutdown::channel();
        let task = tokio::spawn(async move { server.handle_connection(conn, remote(), rx).await });

        tokio::io::AsyncWriteExt::write_all(&mut client, &[0, 0, 1, 0])
            .await
            .unwrap();
        task.await.unwrap();

        let end: Option<Response> = read_message(&mut client, DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn shutdown_ends_idle_connection() {
        let server = server();
        let (_client, conn) = duplex(4096);
        let (trigger, rx) = shutdown::channel();
        let task = tokio::spawn(async move { server.handle_connection(conn, remote(), rx).await });

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
