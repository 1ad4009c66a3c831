//! Agenda CLI
//!
//! Runs a directory node and issues one-shot requests against one.
//!
//! # Commands
//!
//! - `serve` - Run a node until Ctrl-C
//! - `add` - Add a contact
//! - `remove` - Remove a contact
//! - `update` - Change a contact's phone
//! - `view` - Print the whole directory

mod commands;

use agenda_server::{NodeConfig, PeerEndpoint};
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Replicated contact directory.
#[derive(Parser)]
#[command(name = "agenda")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Node runner options.
#[derive(Args)]
struct ServeArgs {
    /// Client listen address
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Client listen port
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Sync listen address
    #[arg(long, default_value = "0.0.0.0")]
    sync_host: IpAddr,

    /// Sync listen port
    #[arg(long, default_value_t = 9100)]
    sync_port: u16,

    /// Peer sync endpoint (repeatable, tried in order for bootstrap)
    #[arg(long = "peer", value_name = "HOST:PORT")]
    peers: Vec<PeerEndpoint>,

    /// Per-peer connect timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    connect_timeout_ms: u64,

    /// Per-peer send timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    send_timeout_ms: u64,

    /// Maximum peers contacted at once per broadcast
    #[arg(long, default_value_t = 4)]
    broadcast_concurrency: usize,

    /// Per-peer bootstrap timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    bootstrap_timeout_ms: u64,

    /// Grace period for in-flight connections on shutdown, in milliseconds
    #[arg(long, default_value_t = 5000)]
    shutdown_grace_ms: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node until interrupted
    Serve(ServeArgs),

    /// Add a contact
    Add {
        /// Node client address
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        server: String,

        /// Contact name
        name: String,

        /// Contact phone
        phone: String,
    },

    /// Remove a contact
    Remove {
        /// Node client address
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        server: String,

        /// Contact name
        name: String,
    },

    /// Change a contact's phone
    Update {
        /// Node client address
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        server: String,

        /// Contact name
        name: String,

        /// New phone
        phone: String,
    },

    /// Print the whole directory
    View {
        /// Node client address
        #[arg(short, long, default_value = "127.0.0.1:9000")]
        server: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

impl ServeArgs {
    fn node_config(&self) -> NodeConfig {
        NodeConfig::new(
            SocketAddr::new(self.host, self.port),
            SocketAddr::new(self.sync_host, self.sync_port),
        )
        .with_peers(self.peers.iter().cloned())
        .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
        .with_send_timeout(Duration::from_millis(self.send_timeout_ms))
        .with_broadcast_concurrency(self.broadcast_concurrency)
        .with_bootstrap_timeout(Duration::from_millis(self.bootstrap_timeout_ms))
        .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so `view --format json` stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve(args) => commands::serve::run(args.node_config()).await,
        Commands::Add {
            server,
            name,
            phone,
        } => commands::request::add(&server, &name, &phone).await,
        Commands::Remove { server, name } => commands::request::remove(&server, &name).await,
        Commands::Update {
            server,
            name,
            phone,
        } => commands::request::update(&server, &name, &phone).await,
        Commands::View { server, format } => commands::request::view(&server, &format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_build_config() {
        let cli = Cli::try_parse_from([
            "agenda",
            "serve",
            "--port",
            "9001",
            "--sync-port",
            "9101",
            "--peer",
            "localhost:9100",
            "--peer",
            "10.0.0.3:9100",
            "--broadcast-concurrency",
            "2",
        ])
        .unwrap();

        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.node_config();
        assert_eq!(config.client_addr, "127.0.0.1:9001".parse::<SocketAddr>().unwrap());
        assert_eq!(config.sync_addr, "0.0.0.0:9101".parse::<SocketAddr>().unwrap());
        assert_eq!(
            config.peers,
            vec![
                PeerEndpoint::new("localhost", 9100),
                PeerEndpoint::new("10.0.0.3", 9100)
            ]
        );
        assert_eq!(config.broadcast_concurrency, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_peer_is_rejected() {
        assert!(Cli::try_parse_from(["agenda", "serve", "--peer", "nohost"]).is_err());
    }

    #[test]
    fn view_format_flag() {
        let cli = Cli::try_parse_from(["agenda", "view", "--format", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::View { ref format, .. } if format == "json"));
    }
}
