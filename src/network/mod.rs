//! P2P Networking module
//!
//! Provides the OMEGA gossip protocol between sibling nodes.
//!
//! # Features
//! - Text-line block codec and command envelope
//! - Terminator-delimited framing over TCP
//! - Sequential-port discovery of local siblings
//! - Periodic PULL / PUSH gossip with random peers
//! - Bounded, timeout-guarded connection serving

pub mod discovery;
pub mod gossip;
pub mod message;
pub mod node;
pub mod peer;
pub mod server;

pub use discovery::{find_free_port, ping};
pub use gossip::{absorb, Absorbed, Gossip};
pub use message::{
    decode_block, encode_block, encode_blocks_within, encode_command, encode_command_within,
    Command, Request, WireError, PING_REPLY, PROTOCOL_TAG,
};
pub use node::{Node, NodeConfig, NodeContext, NodeError, ShutdownHandle};
pub use peer::{Peer, PeerError, PeerRegistry};
pub use server::{connect_to_peer, FrameCodec, Server, MAX_FRAME_LEN, PARTIAL_FRAME_IDLE};
