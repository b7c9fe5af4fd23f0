//! Connection handler: the per-client state machine.
//!
//! Every accepted connection is driven by one [`Session`] on its own task.
//!
//! # States (for beginners)
//!
//! ```text
//!                 NAME (admin)              PASSWORD ok
//! AwaitingName ───────────────► AwaitingPassword ─────────► Active
//!      │  ▲                           │                      │
//!      │  └───── wrong password ──────┘                      │
//!      │         or non-PASSWORD                             │
//!      └──────────────── NAME (anyone else) ─────────────────┘
//!
//!                    any state ── disconnect ──► Closed
//! ```
//!
//! - `AwaitingName`: only `NAME` is accepted.  Anything else gets an `INFO`
//!   notice naming the expected and received types.
//! - `AwaitingPassword`: the claimed name is the admin name; only `PASSWORD`
//!   is accepted.  A wrong password or any other packet sends the client back
//!   to `AwaitingName`.
//! - `Active`: the client is registered.  `MESSAGE` packets are relayed to
//!   every other client, tagged with the sender's name.
//! - `Closed`: the client is unregistered and its node closed.  If it had been
//!   `Active`, the others are told it left.
//!
//! # Join notices
//!
//! The new client is registered first and the join notice is then sent to
//! every registered client except the joiner's own address.  Two clients
//! finishing their handshakes at the same moment therefore cannot miss each
//! other: whichever registers second sees the first in its broadcast snapshot.
//!
//! A handshake that completes after shutdown has drained the registry is
//! refused with a shutdown notice.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chat_core::{Message, MessageType, NetworkNode, ProtocolError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::authenticate::CredentialVerifier;
use super::broadcast::Broadcaster;
use super::notices;
use super::registry::ClientRegistry;

/// What to do after a packet whose length field could not be parsed.
///
/// After such a header the position of the next header in the stream is
/// unknown, so continuing may misinterpret body bytes as headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedHeaderPolicy {
    /// Notify the client and close the connection.
    #[default]
    Disconnect,
    /// Notify the client and keep reading.
    Continue,
}

/// Per-connection behaviour knobs, derived from the server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// The one display name that must authenticate.
    pub admin_name: String,
    /// Close a connection that sends nothing for this long.
    pub idle_timeout: Option<Duration>,
    pub malformed_header: MalformedHeaderPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            admin_name: "admin".to_string(),
            idle_timeout: None,
            malformed_header: MalformedHeaderPolicy::default(),
        }
    }
}

/// Everything a session shares with the rest of the server.
pub struct SessionContext {
    pub broadcaster: Broadcaster,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub settings: SessionSettings,
}

impl SessionContext {
    pub fn new(
        registry: Arc<ClientRegistry>,
        verifier: Arc<dyn CredentialVerifier>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            broadcaster: Broadcaster::new(registry),
            verifier,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        self.broadcaster.registry()
    }
}

/// Handshake and chat state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    AwaitingName,
    AwaitingPassword { name: String },
    Active { name: String },
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The stream failed or the peer hung up.
    Transport(ProtocolError),
    /// A malformed length header under [`MalformedHeaderPolicy::Disconnect`].
    MalformedHeader,
    IdleTimeout,
    /// The handshake finished after the server stopped accepting clients.
    ServerShutdown,
}

/// Drives one client connection from handshake to disconnect.
pub struct Session {
    node: NetworkNode,
    ctx: Arc<SessionContext>,
    state: SessionState,
}

impl Session {
    pub fn new(node: NetworkNode, ctx: Arc<SessionContext>) -> Self {
        Self {
            node,
            ctx,
            state: SessionState::AwaitingName,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Processes packets until the connection ends, then runs the disconnect
    /// path.  Returns why the session ended.
    pub async fn run(mut self) -> CloseReason {
        info!(peer = %self.node.remote_address(), "client connected");
        loop {
            if let Err(reason) = self.step().await {
                self.close(&reason).await;
                return reason;
            }
        }
    }

    /// Receives one packet and applies it to the current state.
    async fn step(&mut self) -> Result<(), CloseReason> {
        let received = match self.ctx.settings.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.node.receive()).await {
                Ok(result) => result,
                Err(_) => return Err(CloseReason::IdleTimeout),
            },
            None => self.node.receive().await,
        };

        match received {
            Ok(msg) => self.handle(msg).await,
            Err(e) => self.recover(e).await,
        }
    }

    async fn handle(&mut self, msg: Message) -> Result<(), CloseReason> {
        match self.state.clone() {
            SessionState::AwaitingName => self.on_awaiting_name(msg).await,
            SessionState::AwaitingPassword { name } => self.on_awaiting_password(name, msg).await,
            SessionState::Active { name } => self.on_active(&name, msg).await,
            SessionState::Closed => {
                warn!(message_type = %msg.message_type, "packet for a closed session dropped");
                Ok(())
            }
        }
    }

    async fn on_awaiting_name(&mut self, msg: Message) -> Result<(), CloseReason> {
        if msg.message_type != MessageType::Name {
            return self
                .notify(&notices::wrong_packet(MessageType::Name, msg.message_type))
                .await;
        }

        let name = msg.text().trim().to_string();
        if name.is_empty() {
            return self.notify(notices::EMPTY_NAME).await;
        }

        if name == self.ctx.settings.admin_name {
            debug!(%name, "admin name claimed; awaiting password");
            self.state = SessionState::AwaitingPassword { name };
            Ok(())
        } else {
            self.enter_active(name).await
        }
    }

    async fn on_awaiting_password(&mut self, name: String, msg: Message) -> Result<(), CloseReason> {
        if msg.message_type != MessageType::Password {
            self.state = SessionState::AwaitingName;
            return self
                .notify(&notices::wrong_packet(MessageType::Password, msg.message_type))
                .await;
        }

        if self.ctx.verifier.verify(&msg.body) {
            info!(%name, "admin authenticated");
            self.notify(&notices::authenticated(&name)).await?;
            self.enter_active(name).await
        } else {
            warn!(peer = %self.node.remote_address(), "admin authentication failed");
            self.state = SessionState::AwaitingName;
            self.notify(notices::WRONG_PASSWORD).await
        }
    }

    async fn on_active(&mut self, name: &str, msg: Message) -> Result<(), CloseReason> {
        if msg.message_type != MessageType::Message {
            return self
                .notify(&notices::wrong_packet(MessageType::Message, msg.message_type))
                .await;
        }
        if msg.is_empty() {
            return Ok(());
        }

        let report = self
            .ctx
            .broadcaster
            .relay_chat(self.node.remote_address(), name, &msg.body)
            .await;
        debug!(bytes = msg.body.len(), delivered = report.delivered, "chat relayed");
        Ok(())
    }

    async fn enter_active(&mut self, name: String) -> Result<(), CloseReason> {
        let remote = self.node.remote_address();
        if !self.ctx.registry().register(self.node.sender(), name.clone()).await {
            info!(%name, "join refused; server is shutting down");
            self.notify(notices::SHUTTING_DOWN).await?;
            return Err(CloseReason::ServerShutdown);
        }
        self.state = SessionState::Active { name: name.clone() };
        info!(%name, "client joined");

        self.ctx
            .broadcaster
            .announce(&HashSet::from([remote]), &notices::joined(&name))
            .await;
        Ok(())
    }

    /// Handles a receive error.  Recoverable errors notify the client and
    /// keep the session alive.
    async fn recover(&mut self, error: ProtocolError) -> Result<(), CloseReason> {
        match error {
            e if e.is_terminal() => Err(CloseReason::Transport(e)),
            ProtocolError::UnknownType { type_name, .. } => {
                warn!(%type_name, "unknown packet type skipped");
                self.notify(&notices::unknown_type(&type_name)).await
            }
            ProtocolError::InvalidLength(raw) => {
                warn!(%raw, policy = ?self.ctx.settings.malformed_header, "malformed length header");
                self.notify(notices::INVALID_LENGTH).await?;
                match self.ctx.settings.malformed_header {
                    MalformedHeaderPolicy::Disconnect => Err(CloseReason::MalformedHeader),
                    MalformedHeaderPolicy::Continue => Ok(()),
                }
            }
            other => {
                warn!(error = %other, "unexpected receive error ignored");
                Ok(())
            }
        }
    }

    async fn notify(&self, text: &str) -> Result<(), CloseReason> {
        self.node
            .send(MessageType::Info, text.as_bytes())
            .await
            .map_err(CloseReason::Transport)
    }

    /// Unregisters, announces the departure of an active client, and closes
    /// the node.
    async fn close(&mut self, reason: &CloseReason) {
        let remote = self.node.remote_address();
        self.ctx.registry().unregister(self.node.id()).await;

        if let SessionState::Active { name } = &self.state {
            let exclude = HashSet::from([remote]);
            self.ctx
                .broadcaster
                .announce(&exclude, &notices::left(name))
                .await;
            info!(%name, ?reason, "client left");
        } else {
            info!(peer = %remote, ?reason, "connection closed before joining");
        }

        self.node.close().await;
        self.state = SessionState::Closed;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
