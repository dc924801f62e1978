//! Core data model
//!
//! - Blocks (immutable, hash-linked by parent ids)
//! - Block store (shared, deduplicated by id)

pub mod block;
pub mod store;

pub use block::Block;
pub use store::BlockStore;
