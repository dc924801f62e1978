//! Block miner
//!
//! Periodically mints a block whose parents are a few randomly chosen known
//! blocks. There is no proof of work; minting is free.

use crate::api::events::EventLog;
use crate::core::{Block, BlockStore};
use crate::mining::words::random_sentence;
use crate::network::node::{wait_for_shutdown, NodeContext};
use log::debug;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Fewest parents requested for a new block
pub const MIN_PARENTS: usize = 2;

/// Most parents requested for a new block
pub const MAX_PARENTS: usize = 5;

/// Miner for creating new blocks
pub struct Miner {
    /// Advertised `host:port` stamped on every block
    origin: String,
    blocks: Arc<BlockStore>,
    events: Arc<EventLog>,
    delay: Duration,
}

impl Miner {
    pub fn new(
        origin: impl Into<String>,
        blocks: Arc<BlockStore>,
        events: Arc<EventLog>,
        delay: Duration,
    ) -> Self {
        Self {
            origin: origin.into(),
            blocks,
            events,
            delay,
        }
    }

    /// Miner for a node, or `None` when mining is disabled
    pub fn from_context(ctx: &NodeContext) -> Option<Self> {
        if ctx.config.mine_delay.is_zero() {
            return None;
        }
        Some(Self::new(
            ctx.local.to_string(),
            Arc::clone(&ctx.blocks),
            Arc::clone(&ctx.events),
            ctx.config.mine_delay,
        ))
    }

    /// Mint one block and add it to the store
    pub async fn mine_block(&self) -> Block {
        let (wanted, message) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(MIN_PARENTS..=MAX_PARENTS), random_sentence(&mut rng))
        };
        let parents = self.blocks.sample_ids(wanted).await;

        let block = Block::new(message, self.origin.clone(), parents);
        debug!("Minted {} with {} parents", block.id(), block.parents().len());

        self.blocks.add(block.clone()).await;
        self.events.info("mine", format!("Mined block: {}", block));
        block
    }

    /// Mine immediately, then once per delay, until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.mine_block().await;
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::node::NodeConfig;
    use crate::network::peer::Peer;

    fn miner(delay: Duration) -> Miner {
        Miner::new(
            "127.0.0.1:8000",
            Arc::new(BlockStore::new()),
            Arc::new(EventLog::default()),
            delay,
        )
    }

    #[tokio::test]
    async fn test_first_block_has_no_parents() {
        let miner = miner(Duration::from_secs(1));
        let block = miner.mine_block().await;

        assert!(block.parents().is_empty());
        assert_eq!(block.origin(), "127.0.0.1:8000");
        assert!(miner.blocks.contains(block.id()).await);
        assert_eq!(miner.events.snapshot()[0].category, "mine");
    }

    #[tokio::test]
    async fn test_parents_are_known_blocks() {
        let miner = miner(Duration::from_secs(1));
        for _ in 0..10 {
            miner.mine_block().await;
        }
        let block = miner.mine_block().await;

        assert!((MIN_PARENTS..=MAX_PARENTS).contains(&block.parents().len()));
        for parent in block.parents() {
            assert!(miner.blocks.contains(parent).await);
            assert_ne!(parent, block.id());
        }
        assert_eq!(miner.blocks.len().await, 11);
    }

    #[test]
    fn test_zero_delay_disables_mining() {
        let config = NodeConfig {
            mine_delay: Duration::ZERO,
            ..Default::default()
        };
        let ctx = NodeContext::new(config, Peer::new("localhost", 8000));
        assert!(Miner::from_context(&ctx).is_none());

        let ctx = NodeContext::new(NodeConfig::default(), Peer::new("localhost", 8000));
        let miner = Miner::from_context(&ctx).unwrap();
        assert_eq!(miner.origin, "localhost:8000");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let miner = miner(Duration::from_millis(10));
        let blocks = Arc::clone(&miner.blocks);
        let (tx, rx) = watch::channel(false);

        let running = tokio::spawn(miner.run(rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send_replace(true);
        running.await.unwrap();

        assert!(blocks.len().await >= 2);
    }
}
