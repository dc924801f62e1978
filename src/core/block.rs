//! Block implementation for the gossip DAG
//!
//! A block carries a free-text message, the address of the node that minted
//! it, and the ids of the blocks it references as parents. Blocks are
//! immutable: the hash is computed once at construction.

use crate::crypto::sha512_hex_parts;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Timestamp precision kept by blocks (microseconds, matching the wire)
const TIMESTAMP_DIGITS: u16 = 6;

/// An immutable node of the block DAG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: String,
    created_at: DateTime<Utc>,
    message: String,
    origin: String,
    parents: Vec<String>,
    hash: String,
}

impl Block {
    /// Create a new block with a fresh id and the current time
    pub fn new(message: impl Into<String>, origin: impl Into<String>, parents: Vec<String>) -> Self {
        Self::with_fields(
            Uuid::new_v4().to_string(),
            Utc::now(),
            message,
            origin,
            parents,
        )
    }

    /// Rebuild a block from known field values (used by the wire decoder)
    ///
    /// `created_at` is truncated to microseconds so that it survives the
    /// wire encoding unchanged.
    pub fn with_fields(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        message: impl Into<String>,
        origin: impl Into<String>,
        parents: Vec<String>,
    ) -> Self {
        let id = id.into();
        let created_at = created_at.trunc_subsecs(TIMESTAMP_DIGITS);
        let message = message.into();
        let origin = origin.into();
        let hash = Self::calculate_hash(&id, &origin, &message, &created_at, &parents);

        Self {
            id,
            created_at,
            message,
            origin,
            parents,
            hash,
        }
    }

    /// SHA-512 over `id ∥ origin ∥ message ∥ unix seconds ∥ parents`
    ///
    /// Only whole seconds of the timestamp are covered, so two blocks that
    /// differ only in sub-second time hash equally.
    pub fn calculate_hash(
        id: &str,
        origin: &str,
        message: &str,
        created_at: &DateTime<Utc>,
        parents: &[String],
    ) -> String {
        let seconds = created_at.timestamp().to_string();
        let header = [id, origin, message, seconds.as_str()];
        sha512_hex_parts(header.into_iter().chain(parents.iter().map(String::as_str)))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Creation time as microseconds since the unix epoch
    pub fn timestamp_micros(&self) -> i64 {
        self.created_at.timestamp_micros()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `host:port` of the node that minted this block
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// First group of the id, for log lines
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}: {} ({})",
            self.short_id(),
            self.origin,
            self.message,
            self.created_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
