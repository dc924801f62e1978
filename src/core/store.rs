//! In-memory block store shared by every node task
//!
//! The store only grows: blocks are deduplicated by id and never removed.

use crate::core::block::Block;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Concurrency-safe map from block id to block
#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: RwLock<HashMap<String, Block>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block; returns false if its id was already known
    pub async fn add(&self, block: Block) -> bool {
        let mut blocks = self.blocks.write().await;
        if blocks.contains_key(block.id()) {
            return false;
        }
        blocks.insert(block.id().to_string(), block);
        true
    }

    pub async fn get(&self, id: &str) -> Option<Block> {
        let blocks = self.blocks.read().await;
        blocks.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        let blocks = self.blocks.read().await;
        blocks.contains_key(id)
    }

    /// Up to `n` distinct blocks chosen uniformly at random
    pub async fn sample(&self, n: usize) -> Vec<Block> {
        let blocks = self.blocks.read().await;
        blocks
            .values()
            .choose_multiple(&mut rand::thread_rng(), n)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Up to `n` distinct block ids chosen uniformly at random
    pub async fn sample_ids(&self, n: usize) -> Vec<String> {
        let blocks = self.blocks.read().await;
        blocks
            .keys()
            .choose_multiple(&mut rand::thread_rng(), n)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of every block, oldest first
    pub async fn all(&self) -> Vec<Block> {
        let mut all: Vec<Block> = {
            let blocks = self.blocks.read().await;
            blocks.values().cloned().collect()
        };
        all.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        all
    }

    pub async fn len(&self) -> usize {
        let blocks = self.blocks.read().await;
        blocks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
