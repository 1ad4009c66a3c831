//! Shared accept loop for the client and sync listeners.

use crate::shutdown::Shutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Delay before the next accept after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1 << failures.min(7))
        .min(ACCEPT_BACKOFF_MAX)
}

/// Accepts connections until shutdown, running `handler` for each one
/// on its own task.
///
/// After shutdown is signalled the listener is dropped, so new connection
/// attempts are refused. Connections already in flight get `grace` to
/// finish before they are aborted.
pub(crate) async fn accept_loop<H, Fut>(
    listener: TcpListener,
    role: &'static str,
    mut shutdown: Shutdown,
    grace: Duration,
    handler: H,
) where
    H: Fn(TcpStream, SocketAddr, Shutdown) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr().ok();
    info!(role, addr = ?local, "listening");

    let mut connections = JoinSet::new();
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    failures = 0;
                    debug!(role, %remote, "accepted connection");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(role, %remote, error = %e, "set_nodelay failed");
                    }
                    connections.spawn(handler(stream, remote, shutdown.clone()));
                }
                // Accept failures do not stop the listener. Persistent
                // ones (descriptor exhaustion) back off instead of spinning.
                Err(e) => {
                    let delay = accept_backoff(failures);
                    failures = failures.saturating_add(1);
                    warn!(role, error = %e, retry_in = ?delay, "accept failed");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        warn!(role, "connection task panicked");
                    }
                }
            }
        }
    }

    drop(listener);
    info!(role, in_flight = connections.len(), "listener stopped, draining connections");

    let drained = tokio::time::timeout(grace, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(role, remaining = connections.len(), "grace period elapsed, aborting connections");
        connections.shutdown().await;
    }
    debug!(role, "listener drained");
}
