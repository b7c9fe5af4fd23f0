//! Broadcaster: fan-out of one message to every registered client.
//!
//! A broadcast takes a snapshot of the registry, skips every entry whose
//! remote address is in the exclusion set, and sends to the rest in
//! connection order.  With a sender name, each recipient gets a `NAME` frame
//! immediately followed by the content frame; both are written under one lock
//! acquisition on the recipient's node, so another broadcast can never land
//! between them.
//!
//! # Self-healing
//!
//! A recipient whose send fails with a connection error is unregistered on the
//! spot and the broadcast carries on with the remaining recipients.  The
//! evicted client's own connection handler notices the dead node on its next
//! receive and runs the usual disconnect path.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use chat_core::MessageType;
use tracing::{debug, warn};

use super::registry::ClientRegistry;

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the packet was written to.
    pub delivered: usize,
    /// Recipients removed from the registry because delivery failed.
    pub evicted: usize,
}

/// Sends messages to every registered client.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<ClientRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Delivers `body` as a `message_type` packet to every registered client
    /// whose address is not in `exclude`.
    ///
    /// With `sender_name`, each recipient first receives a `NAME` packet
    /// carrying it.  A body too long to frame is logged and nothing is sent.
    pub async fn broadcast(
        &self,
        exclude: &HashSet<SocketAddr>,
        sender_name: Option<&str>,
        body: &[u8],
        message_type: MessageType,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for entry in self.registry.snapshot_all().await {
            if exclude.contains(&entry.remote_address) {
                continue;
            }

            let result = match sender_name {
                Some(name) => {
                    entry
                        .node
                        .send_all(&[(MessageType::Name, name.as_bytes()), (message_type, body)])
                        .await
                }
                None => entry.node.send(message_type, body).await,
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(e) if e.is_terminal() => {
                    warn!(
                        peer = %entry.remote_address,
                        name = %entry.display_name,
                        error = %e,
                        "delivery failed; evicting client"
                    );
                    self.registry.unregister(entry.id()).await;
                    report.evicted += 1;
                }
                Err(e) => {
                    // Framing failures are the same for every recipient.
                    warn!(error = %e, %message_type, "broadcast dropped");
                    return report;
                }
            }
        }

        debug!(
            %message_type,
            delivered = report.delivered,
            evicted = report.evicted,
            "broadcast complete"
        );
        report
    }

    /// Sends an `INFO` notice to everyone not in `exclude`.
    pub async fn announce(&self, exclude: &HashSet<SocketAddr>, text: &str) -> BroadcastReport {
        self.broadcast(exclude, None, text.as_bytes(), MessageType::Info)
            .await
    }

    /// Relays a chat line from `from` to every other client, tagged with the
    /// sender's display name.
    pub async fn relay_chat(&self, from: SocketAddr, sender_name: &str, body: &[u8]) -> BroadcastReport {
        let exclude = HashSet::from([from]);
        self.broadcast(&exclude, Some(sender_name), body, MessageType::Message)
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
