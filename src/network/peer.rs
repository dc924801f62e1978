//! Peer addresses and the registry of known peers
//!
//! The registry only grows. Peers are deduplicated by `(host, port)` and
//! never evicted; there is no liveness tracking.

use rand::seq::SliceRandom;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;

/// Peer communication errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Timed out talking to peer")]
    Timeout,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),
    #[error("Peer closed the connection")]
    Closed,
}

/// Address of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address suitable for `TcpStream::connect`
    pub fn addr(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Peer {
    type Err = PeerError;

    /// Parse `host:port`, splitting on the last colon
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| PeerError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(PeerError::InvalidAddress(s.to_string()));
        }
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| PeerError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Set of known peers, shared by every node task
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<Vec<Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the given peers (duplicates collapse)
    pub fn with_peers(seed: impl IntoIterator<Item = Peer>) -> Self {
        let mut peers: Vec<Peer> = Vec::new();
        for peer in seed {
            if !peers.contains(&peer) {
                peers.push(peer);
            }
        }
        Self {
            peers: RwLock::new(peers),
        }
    }

    /// Insert a peer; returns false if it was already known
    pub async fn add(&self, peer: Peer) -> bool {
        let mut peers = self.peers.write().await;
        if peers.contains(&peer) {
            return false;
        }
        peers.push(peer);
        true
    }

    /// Up to `n` distinct peers chosen uniformly at random
    pub async fn sample(&self, n: usize) -> Vec<Peer> {
        let peers = self.peers.read().await;
        peers
            .choose_multiple(&mut rand::thread_rng(), n)
            .cloned()
            .collect()
    }

    /// One random peer, if any are known
    pub async fn choose(&self) -> Option<Peer> {
        let peers = self.peers.read().await;
        peers.choose(&mut rand::thread_rng()).cloned()
    }

    /// Snapshot of all known peers in discovery order
    pub async fn all(&self) -> Vec<Peer> {
        let peers = self.peers.read().await;
        peers.clone()
    }

    pub async fn contains(&self, peer: &Peer) -> bool {
        let peers = self.peers.read().await;
        peers.contains(peer)
    }

    pub async fn len(&self) -> usize {
        let peers = self.peers.read().await;
        peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_parse_peer() {
        let peer: Peer = "localhost:8001".parse().unwrap();
        assert_eq!(peer, Peer::new("localhost", 8001));
        assert_eq!(peer.to_string(), "localhost:8001");

        let v6: Peer = "::1:9000".parse().unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 9000);

        assert!("localhost".parse::<Peer>().is_err());
        assert!("localhost:http".parse::<Peer>().is_err());
        assert!(":8000".parse::<Peer>().is_err());
        assert!("localhost:70000".parse::<Peer>().is_err());
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let registry = PeerRegistry::new();
        assert!(registry.add(Peer::new("localhost", 8000)).await);
        assert!(!registry.add(Peer::new("localhost", 8000)).await);
        assert!(registry.add(Peer::new("localhost", 8001)).await);
        assert!(registry.add(Peer::new("127.0.0.1", 8000)).await);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_with_peers_dedups() {
        let registry = PeerRegistry::with_peers(vec![
            Peer::new("a", 1),
            Peer::new("a", 1),
            Peer::new("b", 2),
        ]);
        assert_eq!(registry.all().await, vec![Peer::new("a", 1), Peer::new("b", 2)]);
    }

    #[tokio::test]
    async fn test_sample_bounds() {
        let registry = PeerRegistry::new();
        assert!(registry.sample(3).await.is_empty());
        assert!(registry.choose().await.is_none());

        registry.add(Peer::new("a", 1)).await;
        registry.add(Peer::new("b", 2)).await;

        let sample = registry.sample(5).await;
        assert_eq!(sample.len(), 2);
        let distinct: HashSet<_> = sample.into_iter().collect();
        assert_eq!(distinct.len(), 2);

        let chosen = registry.choose().await.unwrap();
        assert!(registry.contains(&chosen).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts() {
        let registry = Arc::new(PeerRegistry::new());
        let mut handles = Vec::new();
        for port in 0..100u16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                // every peer is inserted twice from separate tasks
                let first = registry.add(Peer::new("localhost", port)).await;
                let second = registry.add(Peer::new("localhost", port)).await;
                first && !second
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(registry.len().await, 100);
    }
}
