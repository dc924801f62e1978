//! Node implementation
//!
//! The node owns the listening socket and orchestrates the serve loop, the
//! miner and the two gossip tasks, all sharing one `NodeContext`.

use crate::api::events::{EventLog, DEFAULT_LOG_CAPACITY};
use crate::api::routes::{self, HttpResponse};
use crate::core::BlockStore;
use crate::mining::Miner;
use crate::network::discovery::{find_free_port, ping};
use crate::network::gossip::{absorb, Gossip};
use crate::network::message::{
    encode_blocks_within, Command, Request, PING_REPLY, RECORD_SEPARATOR,
};
use crate::network::peer::{Peer, PeerRegistry};
use crate::network::server::{handle_connection, Server, MAX_FRAME_LEN};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::time::timeout;

/// First port probed by discovery
pub const DEFAULT_START_PORT: u16 = 8000;

/// Number of blocks exchanged per PULL reply or PUSH request
pub const GOSSIP_SAMPLE: usize = 5;

/// Maximum concurrently served connections
pub const MAX_CONNECTIONS: usize = 64;

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Room left in a frame for the `OMEGA <CMD>` line
const COMMAND_HEADROOM: usize = 16;

/// Node startup errors
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("No free port at or above {0}")]
    PortsExhausted(u16),
}

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Host to bind and advertise as block origin
    pub host: String,
    /// Port to listen on; `None` runs discovery from `start_port`
    pub port: Option<u16>,
    /// First port probed by discovery
    pub start_port: u16,
    /// Peers known before discovery
    pub known_peers: Vec<Peer>,
    /// Delay between mined blocks; zero disables mining
    pub mine_delay: Duration,
    /// Delay between pull cycles and between push cycles
    pub gossip_interval: Duration,
    /// Bound on every connect, read and write
    pub io_timeout: Duration,
    /// Concurrent connection ceiling
    pub max_connections: usize,
    /// Largest accepted frame in bytes
    pub max_frame_len: usize,
    /// Blocks per PULL reply or PUSH request
    pub gossip_sample: usize,
    /// Root of the static documents served over HTTP
    pub doc_root: PathBuf,
    /// Events kept for `/data/log`
    pub log_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            start_port: DEFAULT_START_PORT,
            known_peers: Vec::new(),
            mine_delay: Duration::from_secs(15),
            gossip_interval: Duration::from_secs(10),
            io_timeout: Duration::from_secs(5),
            max_connections: MAX_CONNECTIONS,
            max_frame_len: MAX_FRAME_LEN,
            gossip_sample: GOSSIP_SAMPLE,
            doc_root: PathBuf::from("static"),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Longest wire record accepted from peers
    ///
    /// Any `gossip_sample` records of this size still fit in one frame
    /// together with the command line.
    pub fn max_record_len(&self) -> usize {
        let budget = self.max_frame_len.saturating_sub(COMMAND_HEADROOM);
        (budget / self.gossip_sample.max(1)).saturating_sub(RECORD_SEPARATOR.len())
    }
}

/// State shared by every task of a node
#[derive(Clone)]
pub struct NodeContext {
    pub config: Arc<NodeConfig>,
    /// Address this node advertises as the origin of its blocks
    pub local: Peer,
    pub peers: Arc<PeerRegistry>,
    pub blocks: Arc<BlockStore>,
    pub events: Arc<EventLog>,
}

impl NodeContext {
    /// Fresh, empty registries for a node advertised as `local`
    pub fn new(config: NodeConfig, local: Peer) -> Self {
        let peers = Arc::new(PeerRegistry::with_peers(config.known_peers.clone()));
        let events = Arc::new(EventLog::new(config.log_capacity));
        Self::with_registries(config, local, peers, events)
    }

    fn with_registries(
        config: NodeConfig,
        local: Peer,
        peers: Arc<PeerRegistry>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            local,
            peers,
            blocks: Arc::new(BlockStore::new()),
            events,
        }
    }
}

/// What a connection handler writes back
#[derive(Debug)]
pub enum Reply {
    /// A framed OMEGA reply
    Omega(String),
    /// A raw HTTP response
    Http(HttpResponse),
    /// Nothing; the connection is just closed
    Empty,
}

/// Dispatch one inbound frame
pub async fn handle_request(ctx: &NodeContext, frame: &str) -> Reply {
    match Request::parse(frame) {
        Request::Omega {
            command: Ok(Command::Ping),
            ..
        } => Reply::Omega(PING_REPLY.to_string()),

        Request::Omega {
            command: Ok(Command::Pull),
            ..
        } => {
            let blocks = ctx.blocks.sample(ctx.config.gossip_sample).await;
            let (body, skipped) = encode_blocks_within(&blocks, ctx.config.max_frame_len);
            if skipped > 0 {
                ctx.events.warn(
                    "pull",
                    format!("Left {} oversized blocks out of a PULL reply", skipped),
                );
            }
            log::debug!("Serving {} blocks to PULL", blocks.len() - skipped);
            Reply::Omega(body)
        }

        Request::Omega {
            command: Ok(Command::Push),
            payload,
        } => {
            let absorbed = absorb(ctx, payload, "push").await;
            if absorbed.new_blocks > 0 {
                ctx.events.info(
                    "push",
                    format!(
                        "Received {} new blocks via PUSH ({} malformed)",
                        absorbed.new_blocks, absorbed.malformed
                    ),
                );
            }
            Reply::Empty
        }

        Request::Omega {
            command: Err(e), ..
        } => {
            log::debug!("Rejecting OMEGA request: {}", e);
            Reply::Omega(format!("ERR {}", e))
        }

        Request::Http { method, path } => Reply::Http(routes::route(ctx, method, path).await),

        Request::Invalid(reason) => {
            log::debug!("Rejecting request: {}", reason);
            Reply::Http(HttpResponse::bad_request(&reason))
        }
    }
}

/// Handle for stopping a running node
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Resolves once shutdown has been requested (or can no longer be)
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// The main node
pub struct Node {
    ctx: NodeContext,
    server: Server,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Node {
    /// Seed peers, pick a port (running discovery if none is configured) and bind
    pub async fn bind(config: NodeConfig) -> Result<Self, NodeError> {
        let peers = Arc::new(PeerRegistry::with_peers(config.known_peers.clone()));
        let events = Arc::new(EventLog::new(config.log_capacity));

        let port = match config.port {
            Some(port) => port,
            None => {
                let io_timeout = config.io_timeout;
                let port = find_free_port(&config.host, config.start_port, &peers, |peer| async move {
                    ping(&peer, io_timeout).await
                })
                .await?;
                events.info(
                    "discovery",
                    format!(
                        "Port {} is free, {} peers known after discovery",
                        port,
                        peers.len().await
                    ),
                );
                port
            }
        };

        let server = Server::bind(&config.host, port)
            .await
            .map_err(|source| NodeError::Bind {
                addr: format!("{}:{}", config.host, port),
                source,
            })?;

        let local = Peer::new(config.host.clone(), server.port());
        let ctx = NodeContext::with_registries(config, local, peers, events);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            ctx,
            server,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    /// Shared state, for inspection and for feeding blocks in directly
    pub fn context(&self) -> NodeContext {
        self.ctx.clone()
    }

    /// Address this node advertises
    pub fn local_peer(&self) -> &Peer {
        &self.ctx.local
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Run the serve loop and background tasks until shutdown
    pub async fn run(self) -> Result<(), NodeError> {
        let Node {
            ctx,
            server,
            shutdown_tx,
        } = self;

        let mut tasks = Vec::new();

        match Miner::from_context(&ctx) {
            Some(miner) => tasks.push(tokio::spawn(miner.run(shutdown_tx.subscribe()))),
            None => ctx.events.info("mine", "Mining disabled"),
        }

        let gossip = Gossip::new(ctx.clone());
        tasks.push(tokio::spawn(gossip.clone().run_pull(shutdown_tx.subscribe())));
        tasks.push(tokio::spawn(gossip.run_push(shutdown_tx.subscribe())));

        serve(server, ctx.clone(), shutdown_tx.subscribe()).await;

        for task in tasks {
            if let Err(e) = task.await {
                ctx.events.error("node", format!("Background task failed: {}", e));
            }
        }

        ctx.events.info("node", format!("Node {} stopped", ctx.local));
        Ok(())
    }
}

/// Accept connections until shutdown, one task per connection
async fn serve(server: Server, ctx: NodeContext, mut shutdown: watch::Receiver<bool>) {
    let limit = ctx.config.max_connections.max(1);
    let permits = Arc::new(Semaphore::new(limit));

    ctx.events.info("server", format!("Server started on {}", ctx.local));

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = server.accept() => match accepted {
                Ok((stream, addr)) => {
                    let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                        ctx.events.warn(
                            "server",
                            format!("Connection limit of {} reached, dropping {}", limit, addr),
                        );
                        continue;
                    };

                    log::debug!("New client: {}", addr);
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, ctx).await {
                            log::debug!("Connection error with {}: {}", addr, e);
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    ctx.events.error("server", format!("Accept error: {}", e));
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    drop(server);
    ctx.events.info("server", "Stopped accepting connections");

    // Every permit back means every handler has finished
    let drained = timeout(ctx.config.io_timeout, permits.acquire_many(limit as u32)).await;
    match drained {
        Ok(Ok(_)) => ctx.events.info("server", "All connection handlers finished"),
        _ => ctx
            .events
            .warn("server", "Connection handlers still running at shutdown"),
    }
}
