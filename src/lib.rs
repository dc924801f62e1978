//! Omega Node: a minimal gossip node for a hash-linked DAG of blocks
//!
//! This crate provides:
//! - Immutable blocks referencing parent blocks by id, hashed with SHA-512
//! - Concurrency-safe peer and block registries
//! - The OMEGA text protocol (PING / PULL / PUSH) over framed TCP
//! - Discovery of sibling nodes on consecutive local ports
//! - Background mining and pull/push gossip tasks
//! - A read-only HTTP-style status view on the same port
//!
//! # Example
//!
//! ```no_run
//! use omega_node::network::{Node, NodeConfig};
//!
//! # async fn run() -> Result<(), omega_node::network::NodeError> {
//! // Discover siblings from port 8000 upward and bind the first free port
//! let node = Node::bind(NodeConfig::default()).await?;
//! println!("Listening as {}", node.local_peer());
//!
//! // Serve, mine and gossip until shutdown
//! node.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;

// Re-export commonly used types
pub use api::{EventLog, HttpResponse};
pub use core::{Block, BlockStore};
pub use mining::Miner;
pub use network::{Gossip, Node, NodeConfig, NodeContext, Peer, PeerRegistry, ShutdownHandle};
