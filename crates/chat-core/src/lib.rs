//! # chat-core
//!
//! Shared library for the chat room containing the wire protocol, the framing
//! codec, and the per-connection [`NetworkNode`].
//!
//! This crate is used by both the server and the client applications.
//!
//! # Architecture overview
//!
//! The chat room is a single TCP server relaying text between many clients.
//! Every byte exchanged on a connection is part of a *packet*:
//!
//! ```text
//! [length:5][type:10][body:length]
//! ```
//!
//! Both headers are fixed-width, space-padded ASCII, so a receiver always knows
//! how many bytes to read next without scanning for delimiters.
//!
//! - **`protocol`** – The closed set of [`MessageType`]s, the header constants,
//!   and the codec that turns `(type, body)` pairs into packets and back.
//!
//! - **`transport`** – [`NetworkNode`] wraps one live connection and speaks the
//!   protocol over it.  Its write path can be shared (via [`NodeSender`]) with
//!   other tasks that need to deliver broadcasts to the same peer.

pub mod protocol;
pub mod transport;

pub use protocol::codec::{decode_header, encode, encode_message, parse_header, read_body, ProtocolError};
pub use protocol::messages::{Message, MessageType};
pub use transport::{NetworkNode, NodeId, NodeSender};
