//! Block gossip with peers
//!
//! Two periodic tasks exchange a bounded random sample of blocks with one
//! randomly chosen peer per cycle: PULL fetches, PUSH sends. Every received
//! block also teaches us the address of the node that minted it.

use crate::network::message::{
    decode_block, encode_command, encode_command_within, frame_lines, Command,
};
use crate::network::node::{wait_for_shutdown, NodeContext};
use crate::network::peer::{Peer, PeerError};
use crate::network::server::{request, send_only};
use tokio::sync::watch;

/// Outcome of absorbing a batch of wire records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Absorbed {
    pub new_blocks: usize,
    pub new_peers: usize,
    pub malformed: usize,
}

/// Decode and store every record, registering each block's origin as a peer
///
/// Malformed records, and records longer than `max_record_len`, are skipped
/// and counted; the rest of the batch is kept. Blocks referencing parents we
/// have never seen are accepted as-is.
pub async fn absorb<'a, I>(ctx: &NodeContext, lines: I, category: &str) -> Absorbed
where
    I: IntoIterator<Item = &'a str>,
{
    let lines: Vec<&str> = lines.into_iter().collect();
    let max_record_len = ctx.config.max_record_len();
    let mut absorbed = Absorbed::default();

    for line in lines {
        if line.len() > max_record_len {
            absorbed.malformed += 1;
            ctx.events.warn(
                category,
                format!(
                    "Skipping oversized record ({} bytes, limit {})",
                    line.len(),
                    max_record_len
                ),
            );
            continue;
        }

        let block = match decode_block(line) {
            Ok(block) => block,
            Err(e) => {
                absorbed.malformed += 1;
                ctx.events.warn(category, format!("Skipping record: {}", e));
                continue;
            }
        };

        let origin = block.origin().parse::<Peer>();
        let label = block.to_string();

        if ctx.blocks.add(block).await {
            absorbed.new_blocks += 1;
            log::debug!("[{}] New block {}", category, label);
        }

        match origin {
            Ok(peer) if peer == ctx.local => {}
            Ok(peer) => {
                if ctx.peers.add(peer.clone()).await {
                    absorbed.new_peers += 1;
                    ctx.events
                        .info("discovery", format!("Learned about peer {} via {}", peer, category));
                }
            }
            Err(e) => ctx.events.warn(category, format!("Unusable origin in {}: {}", label, e)),
        }
    }

    absorbed
}

/// Periodic pull and push exchanges
#[derive(Clone)]
pub struct Gossip {
    ctx: NodeContext,
}

impl Gossip {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    /// Fetch a sample of blocks from `peer`
    pub async fn pull_from(&self, peer: &Peer) -> Result<Absorbed, PeerError> {
        let config = &self.ctx.config;
        let reply = request(
            peer,
            encode_command(Command::Pull, &[]),
            config.io_timeout,
            config.max_frame_len,
        )
        .await?;
        Ok(absorb(&self.ctx, frame_lines(&reply), "pull").await)
    }

    /// Send a sample of our blocks to `peer`; returns how many were sent
    pub async fn push_to(&self, peer: &Peer) -> Result<usize, PeerError> {
        let config = &self.ctx.config;
        let blocks = self.ctx.blocks.sample(config.gossip_sample).await;
        let (frame, skipped) = encode_command_within(Command::Push, &blocks, config.max_frame_len);
        if skipped > 0 {
            self.ctx.events.warn(
                "push",
                format!("Left {} oversized blocks out of a PUSH to {}", skipped, peer),
            );
        }
        send_only(peer, frame, config.io_timeout, config.max_frame_len).await?;
        Ok(blocks.len() - skipped)
    }

    /// One pull cycle against a random peer; `None` when no peer is known
    pub async fn pull_cycle(&self) -> Option<Result<Absorbed, PeerError>> {
        let peer = self.ctx.peers.choose().await?;
        log::debug!("[pull] Pulling from {}", peer);

        let result = self.pull_from(&peer).await;
        match &result {
            Ok(absorbed) => self.ctx.events.info(
                "pull",
                format!(
                    "Pulled from {}: {} new blocks, {} new peers, {} malformed",
                    peer, absorbed.new_blocks, absorbed.new_peers, absorbed.malformed
                ),
            ),
            Err(e) => self
                .ctx
                .events
                .warn("pull", format!("Pull from {} failed: {}", peer, e)),
        }
        Some(result)
    }

    /// One push cycle against a random peer; `None` when no peer is known
    pub async fn push_cycle(&self) -> Option<Result<usize, PeerError>> {
        let peer = self.ctx.peers.choose().await?;
        log::debug!("[push] Pushing to {}", peer);

        let result = self.push_to(&peer).await;
        match &result {
            Ok(sent) => self
                .ctx
                .events
                .info("push", format!("Pushed {} blocks to {}", sent, peer)),
            Err(e) => self
                .ctx
                .events
                .warn("push", format!("Push to {} failed: {}", peer, e)),
        }
        Some(result)
    }

    /// Pull every `gossip_interval` until shutdown
    pub async fn run_pull(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.ctx.config.gossip_interval;
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.pull_cycle().await;
        }
    }

    /// Push every `gossip_interval` until shutdown
    pub async fn run_push(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.ctx.config.gossip_interval;
        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.push_cycle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Block;
    use crate::network::message::encode_block;
    use crate::network::node::{Node, NodeConfig};
    use std::time::Duration;

    fn test_config() -> NodeConfig {
        NodeConfig {
            host: "127.0.0.1".to_string(),
            port: Some(0),
            mine_delay: Duration::ZERO,
            gossip_interval: Duration::from_secs(3600),
            io_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn local_context() -> NodeContext {
        NodeContext::new(test_config(), Peer::new("127.0.0.1", 9999))
    }

    #[tokio::test]
    async fn test_absorb_counts() {
        let ctx = local_context();
        let a = Block::new("a", "127.0.0.1:8001", vec![]);
        let b = Block::new("b", "127.0.0.1:8001", vec![a.id().to_string()]);
        let bad_origin = Block::new("c", "nowhere", vec![]);
        let lines = [
            encode_block(&a),
            encode_block(&b),
            encode_block(&a),
            "garbage".to_string(),
            encode_block(&bad_origin),
        ];

        let absorbed = absorb(&ctx, lines.iter().map(String::as_str), "test").await;
        assert_eq!(
            absorbed,
            Absorbed {
                new_blocks: 3,
                new_peers: 1,
                malformed: 1
            }
        );
        assert_eq!(ctx.blocks.len().await, 3);
        assert_eq!(ctx.peers.all().await, vec![Peer::new("127.0.0.1", 8001)]);
    }

    #[tokio::test]
    async fn test_absorb_skips_oversized_records() {
        let ctx = NodeContext::new(
            NodeConfig {
                max_frame_len: 1000,
                ..test_config()
            },
            Peer::new("127.0.0.1", 9999),
        );
        let limit = ctx.config.max_record_len();
        assert!(limit * ctx.config.gossip_sample < 1000);

        let small = Block::new("small", "127.0.0.1:8001", vec![]);
        let big = Block::new("x".repeat(limit), "127.0.0.1:8002", vec![]);
        let lines = [encode_block(&small), encode_block(&big)];

        let absorbed = absorb(&ctx, lines.iter().map(String::as_str), "push").await;
        assert_eq!(absorbed.new_blocks, 1);
        assert_eq!(absorbed.malformed, 1);
        assert!(!ctx.blocks.contains(big.id()).await);
        // the oversized block's origin is not learned either
        assert!(!ctx.peers.contains(&Peer::new("127.0.0.1", 8002)).await);
        assert!(ctx
            .events
            .snapshot()
            .iter()
            .any(|e| e.level == "WARN" && e.message.contains("oversized")));
    }

    #[tokio::test]
    async fn test_push_leaves_out_blocks_that_do_not_fit() {
        let node_a = Node::bind(test_config()).await.unwrap();
        let ctx_a = node_a.context();
        let peer_a = node_a.local_peer().clone();
        let stop_a = node_a.shutdown_handle();
        let running_a = tokio::spawn(node_a.run());

        let ctx_b = NodeContext::new(
            NodeConfig {
                max_frame_len: 4096,
                ..test_config()
            },
            Peer::new("127.0.0.1", 9998),
        );
        let small = Block::new("small", ctx_b.local.to_string(), vec![]);
        ctx_b.blocks.add(small.clone()).await;
        ctx_b
            .blocks
            .add(Block::new("x".repeat(8192), ctx_b.local.to_string(), vec![]))
            .await;
        ctx_b.peers.add(peer_a).await;

        let sent = Gossip::new(ctx_b.clone()).push_cycle().await.unwrap().unwrap();
        assert_eq!(sent, 1);

        let mut received = false;
        for _ in 0..50 {
            if ctx_a.blocks.contains(small.id()).await {
                received = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(received);
        assert_eq!(ctx_a.blocks.len().await, 1);

        stop_a.shutdown();
        running_a.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cycles_skip_without_peers() {
        let gossip = Gossip::new(local_context());
        assert!(gossip.pull_cycle().await.is_none());
        assert!(gossip.push_cycle().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_not_fatal() {
        // grab a free port, then release it so nothing listens there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let ctx = local_context();
        ctx.peers.add(Peer::new("127.0.0.1", port)).await;
        let gossip = Gossip::new(ctx.clone());

        assert!(matches!(gossip.pull_cycle().await, Some(Err(_))));
        assert!(matches!(gossip.push_cycle().await, Some(Err(_))));
        assert!(ctx.events.snapshot().iter().any(|e| e.level == "WARN"));
    }

    #[tokio::test]
    async fn test_pull_converges() {
        let node_b = Node::bind(test_config()).await.unwrap();
        let ctx_b = node_b.context();
        let peer_b = node_b.local_peer().clone();
        let stop_b = node_b.shutdown_handle();

        let from_b = Block::new("hello from b", peer_b.to_string(), vec![]);
        ctx_b.blocks.add(from_b.clone()).await;
        let running_b = tokio::spawn(node_b.run());

        let ctx_a = local_context();
        ctx_a.peers.add(peer_b.clone()).await;
        let gossip_a = Gossip::new(ctx_a.clone());

        let absorbed = gossip_a.pull_cycle().await.unwrap().unwrap();
        assert_eq!(absorbed.new_blocks, 1);
        assert_eq!(ctx_a.blocks.get(from_b.id()).await.unwrap(), from_b);
        assert!(ctx_a.peers.contains(&peer_b).await);

        stop_b.shutdown();
        running_b.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_push_converges() {
        let node_a = Node::bind(test_config()).await.unwrap();
        let ctx_a = node_a.context();
        let peer_a = node_a.local_peer().clone();
        let stop_a = node_a.shutdown_handle();
        let running_a = tokio::spawn(node_a.run());

        let ctx_b = NodeContext::new(test_config(), Peer::new("127.0.0.1", 9998));
        let from_b = Block::new("hello from b", ctx_b.local.to_string(), vec![]);
        ctx_b.blocks.add(from_b.clone()).await;
        ctx_b.peers.add(peer_a).await;

        let sent = Gossip::new(ctx_b.clone()).push_cycle().await.unwrap().unwrap();
        assert_eq!(sent, 1);

        let mut converged = false;
        for _ in 0..50 {
            if ctx_a.blocks.contains(from_b.id()).await {
                converged = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(converged);
        assert!(ctx_a.peers.contains(&ctx_b.local).await);

        stop_a.shutdown();
        running_a.await.unwrap().unwrap();
    }
}
