//! Local peer discovery
//!
//! Nodes on one machine occupy consecutive ports. Walking upward from a base
//! port and pinging each one both finds the first unused port and enumerates
//! every sibling sitting below it.

use crate::network::message::{encode_command, Command};
use crate::network::node::NodeError;
use crate::network::peer::{Peer, PeerRegistry};
use crate::network::server::request;
use std::future::Future;
use std::time::Duration;

/// Largest PING reply we are willing to read
pub const PING_REPLY_BUDGET: usize = 1024;

/// Probe `peer` with `OMEGA PING`; any non-empty reply means a node is there
///
/// Refused connections, resets and timeouts all count as absent.
pub async fn ping(peer: &Peer, io_timeout: Duration) -> bool {
    match request(
        peer,
        encode_command(Command::Ping, &[]),
        io_timeout,
        PING_REPLY_BUDGET,
    )
    .await
    {
        Ok(reply) if !reply.is_empty() => {
            log::debug!("Pinged {} - received {:?}", peer, reply);
            true
        }
        Ok(_) => {
            log::debug!("Ping to {} got an empty reply", peer);
            false
        }
        Err(e) => {
            log::debug!("Ping to {} failed: {}", peer, e);
            false
        }
    }
}

/// Walk ports upward from `start_port` until `probe` fails
///
/// Every responsive port is registered as a peer. Returns the first port
/// whose probe failed, which is the one this node should bind.
pub async fn find_free_port<F, Fut>(
    host: &str,
    start_port: u16,
    peers: &PeerRegistry,
    mut probe: F,
) -> Result<u16, NodeError>
where
    F: FnMut(Peer) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut port = start_port;
    loop {
        let candidate = Peer::new(host, port);
        if !probe(candidate.clone()).await {
            return Ok(port);
        }

        log::info!("Found node at {}", candidate);
        peers.add(candidate).await;

        port = port
            .checked_add(1)
            .ok_or(NodeError::PortsExhausted(start_port))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_walk_stops_at_first_silent_port() {
        let peers = PeerRegistry::new();
        let base = 8000;
        let responsive = 3;

        let port = find_free_port("localhost", base, &peers, |peer| async move {
            peer.port < base + responsive
        })
        .await
        .unwrap();

        assert_eq!(port, base + responsive);
        assert_eq!(peers.len().await, responsive as usize);
        for offset in 0..responsive {
            assert!(peers.contains(&Peer::new("localhost", base + offset)).await);
        }
    }

    #[tokio::test]
    async fn test_walk_with_no_siblings() {
        let peers = PeerRegistry::new();
        let port = find_free_port("localhost", 9000, &peers, |_| async { false })
            .await
            .unwrap();
        assert_eq!(port, 9000);
        assert!(peers.is_empty().await);
    }

    #[tokio::test]
    async fn test_walk_exhausts_port_space() {
        let peers = PeerRegistry::new();
        let result = find_free_port("localhost", u16::MAX - 1, &peers, |_| async { true }).await;
        assert!(matches!(result, Err(NodeError::PortsExhausted(_))));
        assert_eq!(peers.len().await, 2);
    }

    #[tokio::test]
    async fn test_ping_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"hi").await.unwrap();
        });

        assert!(ping(&Peer::new("127.0.0.1", port), Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_ping_closed_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!ping(&Peer::new("127.0.0.1", port), Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_ping_silent_listener_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        assert!(!ping(&Peer::new("127.0.0.1", port), Duration::from_millis(200)).await);
    }
}
