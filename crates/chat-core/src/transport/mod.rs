//! Per-connection network node.
//!
//! A [`NetworkNode`] owns one live connection.  The read half belongs to the
//! task driving the node and is used through [`NetworkNode::receive`].  The
//! write half sits behind a [`NodeSender`], a cheap cloneable handle that any
//! task may use to deliver packets to the same peer.
//!
//! # Write synchronisation
//!
//! Every send acquires the node's write mutex for the duration of one
//! `write_all`, so two senders never interleave header and body bytes.
//! [`NodeSender::send_all`] encodes several frames into one buffer and writes
//! it under a single lock acquisition, which keeps a name frame and the chat
//! line that follows it adjacent on the wire.
//!
//! # Liveness
//!
//! The first transport failure on either half marks the node closed.  From
//! then on sends fail immediately and [`NodeSender::peer_address`] returns
//! `None`.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::codec::{decode_header, encode, read_body, ProtocolError};
use crate::protocol::messages::{Message, MessageType};

type BoxedReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`NetworkNode`].
///
/// Ids are allocated in creation order, so sorting by id sorts by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

// ── NetworkNode ───────────────────────────────────────────────────────────────

/// One connection speaking the chat protocol.
pub struct NetworkNode {
    reader: BoxedReader,
    sender: NodeSender,
}

impl NetworkNode {
    /// Wraps an arbitrary byte stream pair.
    ///
    /// `remote` is the identity reported for the peer; for TCP connections use
    /// [`NetworkNode::from_tcp`], which reads it from the socket.
    pub fn new<R, W>(reader: R, writer: W, remote: SocketAddr) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            sender: NodeSender {
                inner: Arc::new(SenderInner {
                    id: NodeId::next(),
                    remote,
                    writer: Mutex::new(Some(Box::new(writer))),
                    closed: AtomicBool::new(false),
                }),
            },
        }
    }

    /// Wraps an accepted or connected TCP stream.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the peer address cannot be read, which
    /// happens when the peer has already gone away.
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let remote = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::new(read_half, write_half, remote))
    }

    pub fn id(&self) -> NodeId {
        self.sender.id()
    }

    /// Returns a handle to this node's write path.
    pub fn sender(&self) -> NodeSender {
        self.sender.clone()
    }

    /// The address the connection was established with, even once closed.
    pub fn remote_address(&self) -> SocketAddr {
        self.sender.remote_address()
    }

    /// The remote endpoint, or `None` once the connection is closed.
    pub fn peer_address(&self) -> Option<SocketAddr> {
        self.sender.peer_address()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends one packet.  See [`NodeSender::send`].
    pub async fn send(&self, message_type: MessageType, body: &[u8]) -> Result<(), ProtocolError> {
        self.sender.send(message_type, body).await
    }

    /// Receives one packet.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Connection`] if the stream failed or closed; the node
    ///   is marked closed.
    /// - [`ProtocolError::UnknownType`] if the type field was not recognised.
    ///   The declared body has been consumed, so the next call starts at the
    ///   next header.
    /// - [`ProtocolError::InvalidLength`] if the length field was malformed.
    ///   Nothing past the header has been consumed; the stream position of the
    ///   next header is unknown.
    pub async fn receive(&mut self) -> Result<Message, ProtocolError> {
        if self.sender.is_closed() {
            return Err(closed_error());
        }

        let result = match decode_header(&mut self.reader).await {
            Ok((declared_len, message_type)) => read_body(&mut self.reader, declared_len)
                .await
                .map(|body| Message { message_type, body }),
            Err(ProtocolError::UnknownType {
                type_name,
                declared_len,
            }) => match read_body(&mut self.reader, declared_len).await {
                Ok(_) => Err(ProtocolError::UnknownType {
                    type_name,
                    declared_len,
                }),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            if e.is_terminal() {
                self.sender.mark_closed();
            }
        }
        result
    }

    /// Shuts down the write half and marks the node closed.
    pub async fn close(&self) {
        self.sender.close().await;
    }
}

impl fmt::Debug for NetworkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkNode")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

// ── NodeSender ────────────────────────────────────────────────────────────────

/// Shared handle to the write path of a [`NetworkNode`].
#[derive(Clone)]
pub struct NodeSender {
    inner: Arc<SenderInner>,
}

struct SenderInner {
    id: NodeId,
    remote: SocketAddr,
    writer: Mutex<Option<BoxedWriter>>,
    closed: AtomicBool,
}

impl NodeSender {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.inner.remote
    }

    /// The remote endpoint, or `None` once the connection is closed.
    pub fn peer_address(&self) -> Option<SocketAddr> {
        if self.is_closed() {
            None
        } else {
            Some(self.inner.remote)
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Encodes and writes one packet.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::BodyTooLong`] if the body cannot be framed (nothing is
    /// written and the node stays usable), or [`ProtocolError::Connection`] if
    /// the write failed or the node was already closed.
    pub async fn send(&self, message_type: MessageType, body: &[u8]) -> Result<(), ProtocolError> {
        self.send_all(&[(message_type, body)]).await
    }

    /// Encodes `frames` into one buffer and writes it with a single lock
    /// acquisition, so no other sender can interleave between the frames.
    ///
    /// # Errors
    ///
    /// See [`NodeSender::send`].
    pub async fn send_all(&self, frames: &[(MessageType, &[u8])]) -> Result<(), ProtocolError> {
        let mut packet = Vec::new();
        for (message_type, body) in frames {
            packet.extend(encode(*message_type, body)?);
        }

        if self.is_closed() {
            return Err(closed_error());
        }

        let mut guard = self.inner.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(closed_error());
        };

        let outcome = match writer.write_all(&packet).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            debug!(node = %self.inner.id, peer = %self.inner.remote, error = %e, "write failed; node closed");
            guard.take();
            self.mark_closed();
            return Err(ProtocolError::Connection(e));
        }
        Ok(())
    }

    /// Shuts down the write half and marks the node closed.  Idempotent.
    pub async fn close(&self) {
        self.mark_closed();
        let mut guard = self.inner.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(node = %self.inner.id, error = %e, "shutdown of closed node failed");
            }
        }
    }

    fn mark_closed(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for NodeSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSender")
            .field("id", &self.inner.id)
            .field("remote", &self.inner.remote)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_error() -> ProtocolError {
    ProtocolError::Connection(io::Error::new(
        io::ErrorKind::NotConnected,
        "network node is closed",
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{encode_message, read_message};
    use tokio::io::{duplex, split, AsyncReadExt, DuplexStream};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Builds a node whose peer is the returned duplex end.
    fn node_pair(port: u16) -> (NetworkNode, DuplexStream) {
        let (local, remote) = duplex(64 * 1024);
        let (r, w) = split(local);
        (NetworkNode::new(r, w, addr(port)), remote)
    }

    #[test]
    fn test_node_ids_are_unique_and_increasing() {
        let (a, _ra) = node_pair(1);
        let (b, _rb) = node_pair(2);
        assert!(b.id() > a.id());
    }

    #[tokio::test]
    async fn test_send_writes_one_framed_packet() {
        // Arrange
        let (node, mut peer) = node_pair(4000);

        // Act
        node.send(MessageType::Info, b"welcome").await.unwrap();

        // Assert
        let msg = read_message(&mut peer).await.unwrap();
        assert_eq!(msg, Message::info("welcome"));
    }

    #[tokio::test]
    async fn test_send_all_keeps_frames_adjacent() {
        let (node, mut peer) = node_pair(4001);

        node.sender()
            .send_all(&[
                (MessageType::Name, &b"alice"[..]),
                (MessageType::Message, &b"hi"[..]),
            ])
            .await
            .unwrap();

        assert_eq!(read_message(&mut peer).await.unwrap(), Message::name("alice"));
        assert_eq!(read_message(&mut peer).await.unwrap(), Message::chat("hi"));
    }

    #[tokio::test]
    async fn test_concurrent_senders_do_not_interleave() {
        // Arrange: many tasks send name+message pairs through clones of one sender.
        let (node, mut peer) = node_pair(4002);
        let mut tasks = Vec::new();
        for i in 0..16 {
            let sender = node.sender();
            tasks.push(tokio::spawn(async move {
                let name = format!("user{i}");
                let text = format!("line from {i}");
                sender
                    .send_all(&[
                        (MessageType::Name, name.as_bytes()),
                        (MessageType::Message, text.as_bytes()),
                    ])
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Assert: every name frame is immediately followed by its own line.
        for _ in 0..16 {
            let name = read_message(&mut peer).await.unwrap();
            let line = read_message(&mut peer).await.unwrap();
            assert_eq!(name.message_type, MessageType::Name);
            let i = name.text().trim_start_matches("user").to_string();
            assert_eq!(line.text(), format!("line from {i}"));
        }
    }

    #[tokio::test]
    async fn test_receive_returns_decoded_message() {
        let (mut node, mut peer) = node_pair(4003);
        peer.write_all(&encode_message(&Message::name("bob")).unwrap())
            .await
            .unwrap();

        let msg = node.receive().await.unwrap();

        assert_eq!(msg, Message::name("bob"));
    }

    #[tokio::test]
    async fn test_receive_unknown_type_skips_body_and_stays_aligned() {
        // Arrange: an unknown packet followed by a valid one.
        let (mut node, mut peer) = node_pair(4004);
        peer.write_all(b"3    PING      abc").await.unwrap();
        peer.write_all(&encode_message(&Message::chat("after")).unwrap())
            .await
            .unwrap();

        // Act
        let first = node.receive().await;
        let second = node.receive().await;

        // Assert
        assert!(matches!(first, Err(ProtocolError::UnknownType { ref type_name, .. }) if type_name == "PING"));
        assert_eq!(second.unwrap(), Message::chat("after"));
        assert!(!node.is_closed());
    }

    #[tokio::test]
    async fn test_receive_invalid_length_is_recoverable_error() {
        let (mut node, mut peer) = node_pair(4005);
        peer.write_all(b"zz   MESSAGE   ").await.unwrap();

        let result = node.receive().await;

        assert!(matches!(result, Err(ProtocolError::InvalidLength(_))));
        assert!(!node.is_closed());
        assert_eq!(node.peer_address(), Some(addr(4005)));
    }

    #[tokio::test]
    async fn test_receive_after_peer_hangup_closes_node() {
        let (mut node, peer) = node_pair(4006);
        drop(peer);

        let result = node.receive().await;

        assert!(matches!(result, Err(ref e) if e.is_terminal()));
        assert!(node.is_closed());
        assert_eq!(node.peer_address(), None);
        assert_eq!(node.remote_address(), addr(4006));
    }

    #[tokio::test]
    async fn test_send_to_vanished_peer_fails_and_closes_node() {
        let (node, peer) = node_pair(4007);
        drop(peer);

        let first = node.send(MessageType::Info, b"anyone?").await;
        let second = node.send(MessageType::Info, b"still?").await;

        assert!(matches!(first, Err(ProtocolError::Connection(_))));
        assert!(matches!(second, Err(ProtocolError::Connection(_))));
        assert!(node.is_closed());
    }

    #[tokio::test]
    async fn test_write_error_closes_node() {
        // Arrange: a writer whose first write fails.
        let writer = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer reset"))
            .build();
        let node = NetworkNode::new(tokio::io::empty(), writer, addr(4010));

        // Act
        let result = node.send(MessageType::Info, b"hello").await;

        // Assert
        assert!(matches!(result, Err(ProtocolError::Connection(ref e)) if e.kind() == io::ErrorKind::BrokenPipe));
        assert!(node.is_closed());
        assert_eq!(node.peer_address(), None);
    }

    #[tokio::test]
    async fn test_body_too_long_does_not_close_node() {
        let (node, mut peer) = node_pair(4008);
        let huge = vec![b'a'; crate::protocol::messages::MAX_BODY_LEN + 1];

        let result = node.send(MessageType::Message, &huge).await;
        node.send(MessageType::Info, b"ok").await.unwrap();

        assert!(matches!(result, Err(ProtocolError::BodyTooLong { .. })));
        assert_eq!(read_message(&mut peer).await.unwrap(), Message::info("ok"));
    }

    #[tokio::test]
    async fn test_close_shuts_down_writer_and_clears_peer_address() {
        let (node, mut peer) = node_pair(4009);

        node.close().await;
        node.close().await;

        let mut buf = Vec::new();
        let n = peer.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(node.peer_address(), None);
        assert!(node.send(MessageType::Info, b"late").await.is_err());
    }
}
