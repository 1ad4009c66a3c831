//! Node runner.

use agenda_server::{Node, NodeConfig};
use tracing::{info, warn};

/// Runs a node until Ctrl-C, then shuts it down gracefully.
pub async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        client = %config.client_addr,
        sync = %config.sync_addr,
        peers = config.peers.len(),
        "starting node"
    );

    Node::new(config)
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                // Without a signal handler there is no way to stop cleanly.
                warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
