//! ClientRegistry: the set of clients currently in the chat.
//!
//! A client appears here only once it has completed the handshake (a name,
//! plus the admin password when required).  Each entry holds:
//!
//! - A [`NodeSender`] so any connection handler can deliver packets to it.
//! - The display name it registered under.
//! - The remote address it connected from, used for broadcast exclusion.
//!
//! # Concurrency (for beginners)
//!
//! Every connection handler runs on its own Tokio task and they all share one
//! registry through an `Arc`.  The map sits behind a `tokio::sync::Mutex`, so
//! register, unregister, and snapshot are each atomic with respect to the
//! others.  A snapshot is a cloned `Vec`: the lock is released before the
//! caller starts sending, so one slow peer never blocks a join or leave.
//!
//! # Ordering
//!
//! Entries are keyed by [`NodeId`] in a `BTreeMap`.  Node ids are allocated in
//! connection order, so every snapshot lists clients oldest connection first.
//!
//! # Shutdown
//!
//! [`ClientRegistry::drain`] also closes the registry.  A handshake that
//! completes afterwards is refused by [`ClientRegistry::register`], so no
//! client can join a server that has already said goodbye.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use chat_core::{NodeId, NodeSender};
use tokio::sync::Mutex;

/// One registered client.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub node: NodeSender,
    pub display_name: String,
    pub remote_address: SocketAddr,
}

impl RegistryEntry {
    pub fn id(&self) -> NodeId {
        self.node.id()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: BTreeMap<NodeId, RegistryEntry>,
    closed: bool,
}

/// Concurrency-safe collection of registered clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client under `display_name`.
    ///
    /// Registering a node that is already present replaces its entry, so a
    /// node never appears twice.  Returns `false` without registering once the
    /// registry has been drained.
    pub async fn register(&self, node: NodeSender, display_name: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }
        let entry = RegistryEntry {
            remote_address: node.remote_address(),
            display_name: display_name.into(),
            node,
        };
        state.entries.insert(entry.id(), entry);
        true
    }

    /// Removes a client.  Returns the removed entry, or `None` if the node was
    /// not registered (already evicted, or never finished the handshake).
    pub async fn unregister(&self, id: NodeId) -> Option<RegistryEntry> {
        self.state.lock().await.entries.remove(&id)
    }

    /// Returns a point-in-time copy of every entry, oldest connection first.
    pub async fn snapshot_all(&self) -> Vec<RegistryEntry> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    pub async fn contains(&self, id: NodeId) -> bool {
        self.state.lock().await.entries.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Removes and returns every entry, and refuses all later registrations.
    /// Used at shutdown.
    pub async fn drain(&self) -> Vec<RegistryEntry> {
        let mut state = self.state.lock().await;
        state.closed = true;
        std::mem::take(&mut state.entries).into_values().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
