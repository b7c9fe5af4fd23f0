//! Rendering of server packets as chat lines.
//!
//! The server relays a chat line as two packets: a `NAME` carrying the
//! sender's display name, immediately followed by the `MESSAGE` itself.
//! [`Transcript`] remembers the pending name and pairs it with the next
//! message.  `INFO` packets stand alone and render as notices.

use std::fmt;

use chat_core::{Message, MessageType};
use tracing::debug;

/// Shown as the sender when a `MESSAGE` arrives without a preceding `NAME`.
pub const UNKNOWN_SENDER: &str = "unknown";

/// One printable line of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptLine {
    Chat { from: String, text: String },
    Notice(String),
}

impl fmt::Display for TranscriptLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptLine::Chat { from, text } => write!(f, "{from}: {text}"),
            TranscriptLine::Notice(text) => write!(f, "* {text}"),
        }
    }
}

/// Pairs `NAME` frames with the `MESSAGE` frames that follow them.
#[derive(Debug, Default)]
pub struct Transcript {
    pending_name: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet.  Returns a line when the packet completes one.
    pub fn push(&mut self, msg: Message) -> Option<TranscriptLine> {
        match msg.message_type {
            MessageType::Name => {
                let name = msg.text().into_owned();
                if let Some(previous) = self.pending_name.replace(name) {
                    debug!(%previous, "name frame without a message; discarded");
                }
                None
            }
            MessageType::Message => {
                let from = self
                    .pending_name
                    .take()
                    .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
                Some(TranscriptLine::Chat {
                    from,
                    text: msg.text().into_owned(),
                })
            }
            MessageType::Info => Some(TranscriptLine::Notice(msg.text().into_owned())),
            MessageType::Password => {
                debug!("ignoring PASSWORD frame from server");
                None
            }
        }
    }
}
