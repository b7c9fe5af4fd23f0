//! Network infrastructure for the client application.
//!
//! Handles the TCP connection to the chat server and hands inbound packets to
//! the application layer.
//!
//! Architecture:
//! - `ChatConnection` keeps the write side of a [`NetworkNode`] for sending
//!   the handshake and chat lines.
//! - A background task owns the read side; packets are forwarded as
//!   [`ServerEvent`]s on an `mpsc` channel until the connection ends.

use std::net::SocketAddr;

use chat_core::{Message, MessageType, NetworkNode, NodeSender, ProtocolError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP connection to the server failed.
    #[error("failed to connect to chat server at {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// Sending on the established connection failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Events emitted by the network layer to the application layer.
#[derive(Debug, PartialEq)]
pub enum ServerEvent {
    /// A packet was received from the server.
    Packet(Message),
    /// The server closed the connection or it failed.
    Disconnected,
}

/// An open connection to the chat server.
#[derive(Debug)]
pub struct ChatConnection {
    sender: NodeSender,
}

impl ChatConnection {
    /// Connects to `addr` (`host:port`) and starts the read task.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectFailed`] if the server cannot be reached.
    pub async fn connect(addr: &str) -> Result<(Self, mpsc::Receiver<ServerEvent>), ClientError> {
        let connect_failed = |source| ClientError::ConnectFailed {
            addr: addr.to_string(),
            source,
        };
        let stream = TcpStream::connect(addr).await.map_err(connect_failed)?;
        let node = NetworkNode::from_tcp(stream).map_err(connect_failed)?;
        info!(server = %node.remote_address(), "connected to chat server");
        Ok(Self::spawn(node))
    }

    /// Wraps an already established node and starts its read task.
    pub fn spawn(node: NetworkNode) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let sender = node.sender();
        tokio::spawn(read_loop(node, tx));
        (Self { sender }, rx)
    }

    pub fn server_address(&self) -> SocketAddr {
        self.sender.remote_address()
    }

    /// Sends the `NAME` handshake packet.
    pub async fn send_name(&self, name: &str) -> Result<(), ClientError> {
        self.send(MessageType::Name, name).await
    }

    pub async fn send_password(&self, password: &str) -> Result<(), ClientError> {
        self.send(MessageType::Password, password).await
    }

    /// Sends one chat line.
    pub async fn send_chat(&self, text: &str) -> Result<(), ClientError> {
        self.send(MessageType::Message, text).await
    }

    pub async fn close(&self) {
        self.sender.close().await;
    }

    async fn send(&self, message_type: MessageType, text: &str) -> Result<(), ClientError> {
        self.sender.send(message_type, text.as_bytes()).await?;
        Ok(())
    }
}

/// Reads packets from `node` and forwards them on `tx` until the connection
/// ends or the receiver is dropped.
async fn read_loop(mut node: NetworkNode, tx: mpsc::Sender<ServerEvent>) {
    loop {
        match node.receive().await {
            Ok(msg) => {
                if tx.send(ServerEvent::Packet(msg)).await.is_err() {
                    debug!("event receiver dropped; stopping read loop");
                    return;
                }
            }
            Err(e) if e.is_terminal() => {
                debug!(error = %e, "connection to server ended");
                let _ = tx.send(ServerEvent::Disconnected).await;
                return;
            }
            Err(e) => warn!("skipping malformed packet from server: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::encode_message;
    use chat_core::protocol::read_message;
    use tokio::io::{duplex, sink, split};

    fn server_addr() -> SocketAddr {
        "127.0.0.1:5050".parse().unwrap()
    }

    #[tokio::test]
    async fn test_read_loop_forwards_packets_then_disconnect() {
        // Arrange: a scripted server that sends two packets in fragments, then EOF.
        let notice = encode_message(&Message::info("bob entered the chat")).unwrap();
        let name = encode_message(&Message::name("bob")).unwrap();
        let reader = tokio_test::io::Builder::new()
            .read(&notice[..7])
            .read(&notice[7..])
            .read(&name)
            .build();
        let node = NetworkNode::new(reader, sink(), server_addr());

        // Act
        let (_conn, mut events) = ChatConnection::spawn(node);

        // Assert
        assert_eq!(
            events.recv().await,
            Some(ServerEvent::Packet(Message::info("bob entered the chat")))
        );
        assert_eq!(events.recv().await, Some(ServerEvent::Packet(Message::name("bob"))));
        assert_eq!(events.recv().await, Some(ServerEvent::Disconnected));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_loop_skips_unknown_packet_type() {
        let chat = encode_message(&Message::chat("after")).unwrap();
        let reader = tokio_test::io::Builder::new()
            .read(b"1    WHAT      x")
            .read(&chat)
            .build();
        let node = NetworkNode::new(reader, sink(), server_addr());

        let (_conn, mut events) = ChatConnection::spawn(node);

        assert_eq!(events.recv().await, Some(ServerEvent::Packet(Message::chat("after"))));
        assert_eq!(events.recv().await, Some(ServerEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_send_helpers_write_typed_packets() {
        // Arrange
        let (local, mut server) = duplex(4096);
        let (r, w) = split(local);
        let (conn, _events) = ChatConnection::spawn(NetworkNode::new(r, w, server_addr()));

        // Act
        conn.send_name("admin").await.unwrap();
        conn.send_password("adminpass").await.unwrap();
        conn.send_chat("hello").await.unwrap();

        // Assert
        assert_eq!(read_message(&mut server).await.unwrap(), Message::name("admin"));
        assert_eq!(read_message(&mut server).await.unwrap(), Message::password("adminpass"));
        assert_eq!(read_message(&mut server).await.unwrap(), Message::chat("hello"));
        assert_eq!(conn.server_address(), server_addr());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind then drop a listener to find a port nobody is listening on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = ChatConnection::connect(&addr.to_string()).await;

        assert!(matches!(result, Err(ClientError::ConnectFailed { .. })));
    }
}
