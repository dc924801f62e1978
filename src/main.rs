//! Omega Node CLI
//!
//! Starts a gossip node: discovers siblings, then serves, mines and gossips
//! until interrupted.

use clap::{ArgAction, Parser};
use omega_node::network::{Node, NodeConfig, Peer, PeerError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "omega-node")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A minimal gossip node for a DAG of blocks", long_about = None)]
struct Cli {
    /// Port to listen on (default: first free port from --start-port)
    #[arg(short, long)]
    port: Option<u16>,

    /// First port probed by discovery
    #[arg(long, default_value_t = omega_node::network::node::DEFAULT_START_PORT)]
    start_port: u16,

    /// Seed a known peer (repeatable)
    #[arg(
        short = 'k',
        long = "known",
        num_args = 2,
        value_names = ["HOST", "PORT"],
        action = ArgAction::Append
    )]
    known: Vec<String>,

    /// Seconds between mined blocks (0 disables mining)
    #[arg(short = 'm', long = "mine-delay", default_value_t = 15)]
    mine_delay: u64,

    /// Host to bind and advertise
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Seconds between gossip rounds
    #[arg(long, default_value_t = 10)]
    gossip_interval: u64,

    /// Directory of static documents for the debug UI
    #[arg(long, default_value = "static")]
    doc_root: PathBuf,
}

impl Cli {
    /// Pair up `--known HOST PORT` values
    fn known_peers(&self) -> Result<Vec<Peer>, PeerError> {
        self.known
            .chunks(2)
            .map(|pair| match pair {
                [host, port] => port
                    .parse::<u16>()
                    .map(|port| Peer::new(host.clone(), port))
                    .map_err(|_| PeerError::InvalidAddress(format!("{} {}", host, port))),
                _ => Err(PeerError::InvalidAddress(pair.join(" "))),
            })
            .collect()
    }

    fn into_config(self) -> Result<NodeConfig, PeerError> {
        Ok(NodeConfig {
            known_peers: self.known_peers()?,
            host: self.host,
            port: self.port,
            start_port: self.start_port,
            mine_delay: Duration::from_secs(self.mine_delay),
            gossip_interval: Duration::from_secs(self.gossip_interval),
            doc_root: self.doc_root,
            ..Default::default()
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let node = Node::bind(config).await?;
        log::info!("Node advertising {}", node.local_peer());

        // Handle Ctrl+C
        let shutdown = node.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Shutting down node...");
                shutdown.shutdown();
            }
        });

        node.run().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
