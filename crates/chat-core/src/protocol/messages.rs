//! Chat room protocol message types.
//!
//! A packet on the wire is a fixed 15-byte header followed by the body:
//!
//! ```text
//! [length:5][type:10][body:N]
//! ```
//!
//! Both header fields are left-justified ASCII padded with spaces.  The length
//! field is the decimal byte length of the body; the type field is one of the
//! [`MessageType`] names.

use std::borrow::Cow;
use std::fmt;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Width in bytes of the decimal body-length field.
pub const LENGTH_HEADER_SIZE: usize = 5;

/// Width in bytes of the message-type field.
pub const TYPE_HEADER_SIZE: usize = 10;

/// Total size of the packet header in bytes.
pub const HEADER_SIZE: usize = LENGTH_HEADER_SIZE + TYPE_HEADER_SIZE;

/// Largest body that fits in a five-digit length field.
pub const MAX_BODY_LEN: usize = 99_999;

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5050;

// ── Message type names ────────────────────────────────────────────────────────

/// The closed set of packet types.
///
/// The wire representation is the upper-case name, space-padded to
/// [`TYPE_HEADER_SIZE`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A display name: the client handshake, or the sender of a relayed chat line.
    Name,
    /// The secret that follows a privileged `NAME`.
    Password,
    /// A chat line.
    Message,
    /// A system notice: joins, leaves, protocol errors, authentication results.
    Info,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [MessageType; 4] = [
        MessageType::Name,
        MessageType::Password,
        MessageType::Message,
        MessageType::Info,
    ];

    /// Returns the name written into the type header.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Name => "NAME",
            MessageType::Password => "PASSWORD",
            MessageType::Message => "MESSAGE",
            MessageType::Info => "INFO",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageType {
    type Error = ();

    /// Maps an already-trimmed type field onto a [`MessageType`].
    fn try_from(value: &str) -> Result<Self, ()> {
        match value {
            "NAME" => Ok(MessageType::Name),
            "PASSWORD" => Ok(MessageType::Password),
            "MESSAGE" => Ok(MessageType::Message),
            "INFO" => Ok(MessageType::Info),
            _ => Err(()),
        }
    }
}

// ── Decoded packet ────────────────────────────────────────────────────────────

/// A decoded packet: its type and raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type,
            body: body.into(),
        }
    }

    pub fn name(name: &str) -> Self {
        Self::new(MessageType::Name, name)
    }

    pub fn password(password: &str) -> Self {
        Self::new(MessageType::Password, password)
    }

    pub fn chat(text: &str) -> Self {
        Self::new(MessageType::Message, text)
    }

    pub fn info(text: &str) -> Self {
        Self::new(MessageType::Info, text)
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Returns `true` if the body has no bytes.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
