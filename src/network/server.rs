//! TCP server, framing and connection handling
//!
//! A frame is a run of `\r\n`-separated lines that ends at the first empty
//! line (`\r\n\r\n`) or at end of stream. HTTP request heads follow the same
//! rule, so both protocols share one decoder. On the serving side, bytes that
//! sit unterminated for [`PARTIAL_FRAME_IDLE`] are also taken as the request,
//! for senders that write a bare `OMEGA PING` and wait for the reply.

use crate::network::node::{handle_request, NodeContext, Reply};
use crate::network::peer::{Peer, PeerError};
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Marks the end of a frame
pub const FRAME_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Default upper bound for a single frame
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Quiet period after which buffered, unterminated request bytes are served
pub const PARTIAL_FRAME_IDLE: Duration = Duration::from_millis(250);

/// Codec for terminator-delimited text frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_len: usize,
    /// Bytes already searched for the terminator
    scanned: usize,
}

impl FrameCodec {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            scanned: 0,
        }
    }

    fn take_frame(&mut self, src: &mut BytesMut, len: usize) -> Result<String, PeerError> {
        let data = src.split_to(len);
        self.scanned = 0;
        String::from_utf8(data.to_vec()).map_err(|e| {
            PeerError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            ))
        })
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl Encoder<String> for FrameCodec {
    type Error = PeerError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_len {
            return Err(PeerError::FrameTooLarge(self.max_len));
        }
        dst.reserve(item.len() + FRAME_TERMINATOR.len());
        dst.put_slice(item.as_bytes());
        dst.put_slice(FRAME_TERMINATOR);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = PeerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Resume just before the previously scanned tail so a terminator
        // split across reads is still found
        let start = self.scanned.saturating_sub(FRAME_TERMINATOR.len() - 1);
        let found = src[start..]
            .windows(FRAME_TERMINATOR.len())
            .position(|w| w == FRAME_TERMINATOR)
            .map(|pos| start + pos);

        match found {
            Some(end) => {
                if end > self.max_len {
                    return Err(PeerError::FrameTooLarge(self.max_len));
                }
                let frame = self.take_frame(src, end)?;
                src.advance(FRAME_TERMINATOR.len());
                Ok(Some(frame))
            }
            None => {
                if src.len() > self.max_len {
                    return Err(PeerError::FrameTooLarge(self.max_len));
                }
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // An unterminated tail still counts as a frame
        let len = src.len();
        let frame = self.take_frame(src, len)?;
        Ok(Some(frame.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }
}

/// TCP server for accepting peer and status connections
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to `host:port` (port 0 picks an ephemeral port)
    pub async fn bind(host: &str, port: u16) -> Result<Self, std::io::Error> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Server listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Get the listening port
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Accept incoming connections
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), std::io::Error> {
        self.listener.accept().await
    }
}

/// Connect to a peer
pub async fn connect_to_peer(peer: &Peer, io_timeout: Duration) -> Result<TcpStream, PeerError> {
    match timeout(io_timeout, TcpStream::connect(peer.addr())).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(PeerError::ConnectionFailed(e.to_string())),
        Err(_) => Err(PeerError::Timeout),
    }
}

/// Send one frame and wait for the reply frame
///
/// Returns an empty string when the peer closes without replying.
pub async fn request(
    peer: &Peer,
    frame: String,
    io_timeout: Duration,
    max_frame_len: usize,
) -> Result<String, PeerError> {
    let stream = connect_to_peer(peer, io_timeout).await?;
    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_len));

    let exchange = async {
        framed.send(frame).await?;
        match framed.next().await {
            Some(reply) => reply,
            None => Ok(String::new()),
        }
    };

    timeout(io_timeout, exchange)
        .await
        .map_err(|_| PeerError::Timeout)?
}

/// Send one frame and close without reading a reply
pub async fn send_only(
    peer: &Peer,
    frame: String,
    io_timeout: Duration,
    max_frame_len: usize,
) -> Result<(), PeerError> {
    let stream = connect_to_peer(peer, io_timeout).await?;
    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_len));

    let exchange = async {
        framed.send(frame).await?;
        framed.get_mut().shutdown().await?;
        Ok::<(), PeerError>(())
    };

    timeout(io_timeout, exchange)
        .await
        .map_err(|_| PeerError::Timeout)?
}

/// Read the request frame, giving up after `io_timeout`
///
/// A terminated frame or end of stream ends the request as usual. Bytes left
/// unterminated for `PARTIAL_FRAME_IDLE` end it too.
async fn read_request(
    framed: &mut Framed<TcpStream, FrameCodec>,
    io_timeout: Duration,
    max_frame_len: usize,
) -> Result<String, PeerError> {
    let deadline = Instant::now() + io_timeout;
    loop {
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .min(PARTIAL_FRAME_IDLE);

        let next = timeout(wait, framed.next()).await;
        match next {
            Ok(Some(frame)) => return frame,
            Ok(None) => return Err(PeerError::Closed),
            Err(_) if !framed.read_buffer().is_empty() => {
                let mut partial = framed.read_buffer_mut().split();
                return FrameCodec::new(max_frame_len)
                    .decode_eof(&mut partial)?
                    .ok_or(PeerError::Closed);
            }
            Err(_) if Instant::now() >= deadline => return Err(PeerError::Timeout),
            Err(_) => {}
        }
    }
}

/// Serve a single inbound connection: read one frame, dispatch, reply, close
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: NodeContext,
) -> Result<(), PeerError> {
    let io_timeout = ctx.config.io_timeout;
    let max_frame_len = ctx.config.max_frame_len;
    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_len));

    let frame = read_request(&mut framed, io_timeout, max_frame_len).await?;

    log::debug!("Request from {}: {:?}", addr, frame.lines().next());

    let reply = handle_request(&ctx, &frame).await;

    let write = async {
        match reply {
            Reply::Omega(body) => framed.send(body).await?,
            Reply::Http(response) => {
                let stream = framed.get_mut();
                stream.write_all(&response.to_bytes()).await?;
            }
            Reply::Empty => {}
        }
        framed.get_mut().shutdown().await?;
        Ok::<(), PeerError>(())
    };

    timeout(io_timeout, write)
        .await
        .map_err(|_| PeerError::Timeout)?
}
