//! Application layer of the chat server.
//!
//! Everything here operates on [`chat_core::NetworkNode`]s and never touches
//! sockets, files, or the environment directly; the infrastructure layer
//! accepts connections and hands the resulting nodes in.
//!
//! # Sub-modules
//!
//! - **`registry`** – The concurrency-safe set of active clients with their
//!   display names and remote addresses.
//!
//! - **`broadcast`** – Fans a message out to every registered client except an
//!   excluded address set, evicting peers whose delivery fails.
//!
//! - **`authenticate`** – The credential-verification seam and the
//!   constant-time password check behind it.
//!
//! - **`session`** – The per-connection state machine: name, optional
//!   password, active chat, and disconnect.
//!
//! - **`notices`** – Text of the `INFO` packets the server sends.

pub mod authenticate;
pub mod broadcast;
pub mod notices;
pub mod registry;
pub mod session;
