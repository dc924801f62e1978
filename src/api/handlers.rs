//! Status handlers for the HTTP-style interface

use crate::api::events::LogEntry;
use crate::core::Block;
use crate::network::node::NodeContext;
use crate::network::peer::Peer;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
}

impl From<&Peer> for ServerInfo {
    fn from(peer: &Peer) -> Self {
        Self {
            host: peer.host.clone(),
            port: peer.port,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BlockInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub timestamp_micros: i64,
    pub message: String,
    pub origin: String,
    pub parents: Vec<String>,
    pub hash: String,
}

impl From<&Block> for BlockInfo {
    fn from(block: &Block) -> Self {
        Self {
            id: block.id().to_string(),
            created_at: block.created_at(),
            timestamp_micros: block.timestamp_micros(),
            message: block.message().to_string(),
            origin: block.origin().to_string(),
            parents: block.parents().to_vec(),
            hash: block.hash().to_string(),
        }
    }
}

/// Body of `/data/status`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub servers: Vec<ServerInfo>,
    pub blocks: Vec<BlockInfo>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Every known peer and every known block
pub async fn get_status(ctx: &NodeContext) -> StatusResponse {
    let servers = ctx.peers.all().await.iter().map(ServerInfo::from).collect();
    let blocks = ctx.blocks.all().await.iter().map(BlockInfo::from).collect();
    StatusResponse { servers, blocks }
}

/// Snapshot of the event buffer
pub fn get_log(ctx: &NodeContext) -> Vec<LogEntry> {
    ctx.events.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::node::NodeConfig;

    #[tokio::test]
    async fn test_status_lists_everything() {
        let ctx = NodeContext::new(NodeConfig::default(), Peer::new("localhost", 8000));
        ctx.peers.add(Peer::new("localhost", 8001)).await;
        let parent = Block::new("parent", "localhost:8001", vec![]);
        let child = Block::new("child", "localhost:8000", vec![parent.id().to_string()]);
        ctx.blocks.add(parent.clone()).await;
        ctx.blocks.add(child.clone()).await;

        let status = get_status(&ctx).await;
        assert_eq!(status.servers.len(), 1);
        assert_eq!(status.servers[0].port, 8001);
        assert_eq!(status.blocks.len(), 2);

        let json = serde_json::to_value(&status).unwrap();
        let rendered = json["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["id"] == child.id())
            .unwrap();
        assert_eq!(rendered["hash"], child.hash());
        assert_eq!(rendered["parents"][0], parent.id());
        assert_eq!(rendered["timestamp_micros"], child.timestamp_micros());
    }

    #[test]
    fn test_log_snapshot() {
        let ctx = NodeContext::new(NodeConfig::default(), Peer::new("localhost", 8000));
        ctx.events.info("test", "hello");
        let log = get_log(&ctx);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "hello");
    }
}
