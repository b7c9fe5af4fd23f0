//! Integration tests for the client connection against a scripted TCP server.

use std::time::Duration;

use chat_client::application::transcript::{Transcript, TranscriptLine};
use chat_client::infrastructure::network::{ChatConnection, ServerEvent};
use chat_core::{Message, MessageType, NetworkNode};
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_handshake_and_relayed_line_over_tcp() {
    // Arrange: a one-connection server that expects a NAME, then relays a line.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut node = NetworkNode::from_tcp(stream).unwrap();
        let hello = node.receive().await.unwrap();
        node.send(MessageType::Info, b"bob entered the chat").await.unwrap();
        node.sender()
            .send_all(&[
                (MessageType::Name, &b"bob"[..]),
                (MessageType::Message, &b"hi alice"[..]),
            ])
            .await
            .unwrap();
        let line = node.receive().await.unwrap();
        node.close().await;
        (hello, line)
    });

    // Act
    let (conn, mut events) = ChatConnection::connect(&addr.to_string()).await.unwrap();
    conn.send_name("alice").await.unwrap();

    let mut transcript = Transcript::new();
    let mut lines = Vec::new();
    while lines.len() < 2 {
        match timeout(WAIT, events.recv()).await.unwrap() {
            Some(ServerEvent::Packet(msg)) => lines.extend(transcript.push(msg)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    conn.send_chat("hello bob").await.unwrap();

    // Assert
    assert_eq!(
        lines,
        vec![
            TranscriptLine::Notice("bob entered the chat".into()),
            TranscriptLine::Chat {
                from: "bob".into(),
                text: "hi alice".into()
            },
        ]
    );
    let (hello, line) = timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(hello, Message::name("alice"));
    assert_eq!(line, Message::chat("hello bob"));
    assert_eq!(
        timeout(WAIT, events.recv()).await.unwrap(),
        Some(ServerEvent::Disconnected)
    );
}
