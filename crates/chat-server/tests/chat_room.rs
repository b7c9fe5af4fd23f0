//! End-to-end tests of the chat server over loopback TCP.
//!
//! Each test binds a server on an ephemeral port, connects real clients with
//! [`NetworkNode::from_tcp`], and checks what every client receives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_core::{Message, MessageType, NetworkNode};
use chat_server::application::authenticate::StaticPasswordVerifier;
use chat_server::application::registry::ClientRegistry;
use chat_server::application::session::{SessionContext, SessionSettings};
use chat_server::infrastructure::network::ChatServer;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: std::net::SocketAddr,
    registry: Arc<ClientRegistry>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let ctx = Arc::new(SessionContext::new(
            Arc::clone(&registry),
            Arc::new(StaticPasswordVerifier::new("adminpass")),
            SessionSettings::default(),
        ));
        let server = ChatServer::bind("127.0.0.1:0".parse().unwrap(), ctx)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = tokio::spawn(async move {
            server.run(flag).await.unwrap();
        });
        Self {
            addr,
            registry,
            running,
            handle,
        }
    }

    async fn connect(&self) -> NetworkNode {
        let stream = TcpStream::connect(self.addr).await.unwrap();
        NetworkNode::from_tcp(stream).unwrap()
    }

    /// Connects and joins under `name`, waiting until the server has
    /// registered the client.
    async fn join(&self, name: &str) -> NetworkNode {
        let before = self.registry.len().await;
        let node = self.connect().await;
        node.send(MessageType::Name, name.as_bytes()).await.unwrap();
        self.wait_for_clients(before + 1).await;
        node
    }

    async fn wait_for_clients(&self, expected: usize) {
        let result = timeout(RECV_TIMEOUT, async {
            while self.registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "registry never reached {expected} clients");
    }
}

async fn recv(node: &mut NetworkNode) -> Message {
    timeout(RECV_TIMEOUT, node.receive())
        .await
        .expect("timed out waiting for packet")
        .expect("receive failed")
}

async fn assert_nothing_received(node: &mut NetworkNode) {
    let result = timeout(Duration::from_millis(100), node.receive()).await;
    assert!(result.is_err(), "unexpected packet: {result:?}");
}

#[tokio::test]
async fn test_join_notice_and_chat_relay() {
    // Arrange
    let server = TestServer::start().await;
    let mut bob = server.join("bob").await;

    // Act: alice joins and says hi.
    let mut alice = server.join("alice").await;
    alice.send(MessageType::Message, b"hi").await.unwrap();

    // Assert: bob hears the join and the line; alice hears neither.
    assert_eq!(recv(&mut bob).await, Message::info("alice entered the chat"));
    assert_eq!(recv(&mut bob).await, Message::name("alice"));
    assert_eq!(recv(&mut bob).await, Message::chat("hi"));
    assert_nothing_received(&mut alice).await;
}

#[tokio::test]
async fn test_message_reaches_every_other_client() {
    let server = TestServer::start().await;
    let mut clients = Vec::new();
    for name in ["a", "b", "c", "d"] {
        clients.push(server.join(name).await);
    }
    // Drain join notices: client i saw the joins of everyone after it.
    for (i, client) in clients.iter_mut().enumerate() {
        for _ in (i + 1)..4 {
            assert_eq!(recv(client).await.message_type, MessageType::Info);
        }
    }

    clients[0].send(MessageType::Message, b"hello room").await.unwrap();

    for client in clients.iter_mut().skip(1) {
        assert_eq!(recv(client).await, Message::name("a"));
        assert_eq!(recv(client).await, Message::chat("hello room"));
    }
    assert_nothing_received(&mut clients[0]).await;
}

#[tokio::test]
async fn test_admin_wrong_then_correct_password() {
    // Arrange
    let server = TestServer::start().await;
    let mut admin = server.connect().await;

    // Act / Assert: wrong password is rejected and nothing is registered.
    admin.send(MessageType::Name, b"admin").await.unwrap();
    admin.send(MessageType::Password, b"guess").await.unwrap();
    assert_eq!(recv(&mut admin).await, Message::info("Wrong password"));
    assert!(server.registry.is_empty().await);

    // The handshake restarts from the name.
    admin.send(MessageType::Name, b"admin").await.unwrap();
    admin.send(MessageType::Password, b"adminpass").await.unwrap();
    assert_eq!(recv(&mut admin).await, Message::info("Authenticated as admin"));
    server.wait_for_clients(1).await;
}

#[tokio::test]
async fn test_non_admin_never_asked_for_password() {
    let server = TestServer::start().await;
    let mut watcher = server.join("watcher").await;

    let carol = server.connect().await;
    carol.send(MessageType::Name, b"carol").await.unwrap();
    carol.send(MessageType::Message, b"no password needed").await.unwrap();

    assert_eq!(recv(&mut watcher).await, Message::info("carol entered the chat"));
    assert_eq!(recv(&mut watcher).await, Message::name("carol"));
    assert_eq!(recv(&mut watcher).await, Message::chat("no password needed"));
}

#[tokio::test]
async fn test_message_before_name_gets_wrong_packet_notice() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    client.send(MessageType::Message, b"too early").await.unwrap();

    assert_eq!(
        recv(&mut client).await,
        Message::info("Expected NAME packet, but received MESSAGE packet")
    );
    assert!(server.registry.is_empty().await);
}

#[tokio::test]
async fn test_disconnect_announces_departure() {
    let server = TestServer::start().await;
    let mut bob = server.join("bob").await;
    let alice = server.join("alice").await;
    assert_eq!(recv(&mut bob).await, Message::info("alice entered the chat"));

    drop(alice);

    assert_eq!(recv(&mut bob).await, Message::info("alice left the chat"));
    server.wait_for_clients(1).await;
}

#[tokio::test]
async fn test_shutdown_notifies_and_closes_clients() {
    let server = TestServer::start().await;
    let mut alice = server.join("alice").await;

    server.running.store(false, Ordering::Relaxed);
    timeout(RECV_TIMEOUT, server.handle)
        .await
        .expect("server did not stop")
        .unwrap();

    assert_eq!(recv(&mut alice).await, Message::info("Server shutting down"));
    let after = timeout(RECV_TIMEOUT, alice.receive()).await.unwrap();
    assert!(matches!(after, Err(ref e) if e.is_terminal()));
    assert!(server.registry.is_empty().await);
}

/// Reads packets until the connection stays quiet for a short while.
async fn drain_notices(node: &mut NetworkNode) -> Vec<String> {
    let mut notices = Vec::new();
    while let Ok(result) = timeout(Duration::from_millis(300), node.receive()).await {
        let msg = result.expect("receive failed");
        assert_eq!(msg.message_type, MessageType::Info);
        notices.push(msg.text().to_string());
    }
    notices
}

#[tokio::test]
async fn test_parallel_joins_are_all_announced() {
    // Arrange: a bystander already in the room, then five clients connect at once.
    let server = TestServer::start().await;
    let mut bystander = server.join("bystander").await;
    let names = ["p0", "p1", "p2", "p3", "p4"];
    let mut clients = Vec::new();
    for _ in names {
        clients.push(server.connect().await);
    }

    // Act
    let mut tasks = Vec::new();
    for (client, name) in clients.into_iter().zip(names) {
        tasks.push(tokio::spawn(async move {
            client.send(MessageType::Name, name.as_bytes()).await.unwrap();
            client
        }));
    }
    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }
    server.wait_for_clients(names.len() + 1).await;

    // Assert: the bystander hears every join.
    let mut heard = drain_notices(&mut bystander).await;
    heard.sort();
    let mut expected: Vec<_> = names.iter().map(|n| format!("{n} entered the chat")).collect();
    expected.sort();
    assert_eq!(heard, expected);

    // For every pair, whoever registered first hears the other, and nobody
    // hears their own join.
    let mut heard_by = Vec::new();
    for (client, name) in clients.iter_mut().zip(names) {
        let notices = drain_notices(client).await;
        assert!(!notices.contains(&format!("{name} entered the chat")));
        heard_by.push(notices);
    }
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            let i_heard_j = heard_by[i].contains(&format!("{} entered the chat", names[j]));
            let j_heard_i = heard_by[j].contains(&format!("{} entered the chat", names[i]));
            assert!(
                i_heard_j || j_heard_i,
                "{} and {} never heard each other join",
                names[i],
                names[j]
            );
        }
    }
}
