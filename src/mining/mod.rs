//! Mining module for block creation

pub mod miner;
pub mod words;

pub use miner::Miner;
pub use words::random_sentence;
