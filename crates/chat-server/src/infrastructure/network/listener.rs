//! TCP accept loop.
//!
//! [`ChatServer::run`] accepts connections until the shared `running` flag is
//! cleared, spawning one [`Session`] task per connection.  Each task runs
//! inside a `connection` tracing span carrying a fresh `session` UUID and the
//! peer address, so every log line a connection produces can be correlated.
//!
//! # Shutdown
//!
//! `accept()` is polled with a 200 ms timeout so the flag is noticed promptly
//! even when nobody is connecting.  Once the loop stops, every registered
//! client is sent a shutdown notice, removed from the registry, and closed.
//! Draining also closes the registry, so a connection still mid-handshake is
//! refused with the same notice if it finishes later.  Connections that never
//! finish their handshake get no notice; their tasks end with the runtime.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_core::{MessageType, NetworkNode};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::notices;
use crate::application::session::{Session, SessionContext};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Errors from the listening socket.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind chat listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound chat server, ready to accept connections.
pub struct ChatServer {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl ChatServer {
    /// Binds the listening socket.  Port 0 picks a free port; see
    /// [`ChatServer::local_addr`].
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] if the address is in use or not permitted.
    pub async fn bind(addr: SocketAddr, ctx: Arc<SessionContext>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `running` is cleared, then shuts down every
    /// registered client.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] if the listener's local address cannot be read.
    /// Individual accept failures are logged and do not stop the loop.
    pub async fn run(self, running: Arc<AtomicBool>) -> Result<(), ServerError> {
        info!(addr = %self.local_addr()?, "chat server listening");

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL_INTERVAL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => spawn_session(stream, peer, Arc::clone(&self.ctx)),
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {}
            }
        }

        shutdown(&self.ctx).await;
        Ok(())
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, ctx: Arc<SessionContext>) {
    let span = info_span!("connection", session = %Uuid::new_v4(), %peer);
    tokio::spawn(
        async move {
            match NetworkNode::from_tcp(stream) {
                Ok(node) => {
                    let reason = Session::new(node, ctx).run().await;
                    debug!(?reason, "session task finished");
                }
                Err(e) => warn!("connection dropped before setup: {e}"),
            }
        }
        .instrument(span),
    );
}

async fn shutdown(ctx: &SessionContext) {
    let entries = ctx.registry().drain().await;
    info!(clients = entries.len(), "notifying clients of shutdown");

    for entry in entries {
        if let Err(e) = entry
            .node
            .send(MessageType::Info, notices::SHUTTING_DOWN.as_bytes())
            .await
        {
            debug!(peer = %entry.remote_address, error = %e, "shutdown notice not delivered");
        }
        entry.node.close().await;
    }
}
