//! Framing codec for the chat room protocol.
//!
//! Wire format:
//! ```text
//! [length:5][type:10][body:length]
//! ```
//! Header fields are left-justified ASCII, space-padded.  The length field is
//! the decimal byte length of the body.
//!
//! Reading is two-phase: [`decode_header`] consumes exactly [`HEADER_SIZE`]
//! bytes, then [`read_body`] consumes exactly the declared body length.  Both
//! are built on `read_exact`, so a packet split across any number of TCP
//! segments is reassembled transparently.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::messages::{
    Message, MessageType, HEADER_SIZE, LENGTH_HEADER_SIZE, MAX_BODY_LEN, TYPE_HEADER_SIZE,
};

/// Errors that can occur while framing or unframing packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The body does not fit in the five-digit length field.
    #[error("body of {len} bytes exceeds the maximum of {max} bytes")]
    BodyTooLong { len: usize, max: usize },

    /// The length field is not a non-negative decimal integer.
    #[error("invalid message length header: {0:?}")]
    InvalidLength(String),

    /// The type field does not name a [`MessageType`].
    ///
    /// The length field was valid, so `declared_len` body bytes still follow
    /// the header on the stream.
    #[error("unknown message type: {type_name:?}")]
    UnknownType {
        type_name: String,
        declared_len: usize,
    },

    /// A byte slice ends before a complete packet.
    #[error("incomplete packet: need {needed} bytes, got {available}")]
    Incomplete { needed: usize, available: usize },

    /// The underlying transport failed or the peer closed the connection.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),
}

impl ProtocolError {
    /// Returns `true` when the connection that produced this error is unusable.
    ///
    /// Only transport failures are terminal; every other variant concerns a
    /// single packet.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProtocolError::Connection(_))
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes `body` as a packet of type `message_type`.
///
/// # Errors
///
/// Returns [`ProtocolError::BodyTooLong`] if `body` is longer than
/// [`MAX_BODY_LEN`] bytes.
///
/// # Examples
///
/// ```rust
/// use chat_core::protocol::{encode, MessageType};
///
/// let packet = encode(MessageType::Message, b"hi").unwrap();
/// assert_eq!(packet, b"2    MESSAGE   hi");
/// ```
pub fn encode(message_type: MessageType, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if body.len() > MAX_BODY_LEN {
        return Err(ProtocolError::BodyTooLong {
            len: body.len(),
            max: MAX_BODY_LEN,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    let length_field = format!("{:<width$}", body.len(), width = LENGTH_HEADER_SIZE);
    let type_field = format!("{:<width$}", message_type.as_str(), width = TYPE_HEADER_SIZE);
    buf.extend_from_slice(length_field.as_bytes());
    buf.extend_from_slice(type_field.as_bytes());
    buf.extend_from_slice(body);
    Ok(buf)
}

/// Encodes a [`Message`].
///
/// # Errors
///
/// See [`encode`].
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    encode(msg.message_type, &msg.body)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Parses a complete 15-byte header into `(declared_len, message_type)`.
///
/// # Errors
///
/// - [`ProtocolError::InvalidLength`] if the trimmed length field is not an
///   unsigned decimal integer.
/// - [`ProtocolError::UnknownType`] if the trimmed type field is not a known
///   type name.
pub fn parse_header(header: &[u8; HEADER_SIZE]) -> Result<(usize, MessageType), ProtocolError> {
    let (length_field, type_field) = header.split_at(LENGTH_HEADER_SIZE);

    let length_text = String::from_utf8_lossy(length_field);
    let declared_len = length_text
        .trim()
        .parse::<usize>()
        .map_err(|_| ProtocolError::InvalidLength(length_text.to_string()))?;

    let type_text = String::from_utf8_lossy(type_field);
    let type_name = type_text.trim();
    let message_type =
        MessageType::try_from(type_name).map_err(|_| ProtocolError::UnknownType {
            type_name: type_name.to_string(),
            declared_len,
        })?;

    Ok((declared_len, message_type))
}

/// Reads and parses exactly one header from `reader`.
///
/// # Errors
///
/// [`ProtocolError::Connection`] if the stream fails or closes first, otherwise
/// the errors of [`parse_header`].
pub async fn decode_header<R>(reader: &mut R) -> Result<(usize, MessageType), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    parse_header(&header)
}

/// Reads exactly `declared_len` body bytes from `reader`.
///
/// # Errors
///
/// [`ProtocolError::Connection`] if the stream ends before the whole body
/// has arrived.
pub async fn read_body<R>(reader: &mut R, declared_len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut body = vec![0u8; declared_len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Reads one complete packet from `reader`.
///
/// # Errors
///
/// See [`decode_header`] and [`read_body`].
pub async fn read_message<R>(reader: &mut R) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let (declared_len, message_type) = decode_header(reader).await?;
    let body = read_body(reader, declared_len).await?;
    Ok(Message { message_type, body })
}

/// Decodes one packet from the beginning of `bytes`.
///
/// Returns the message and the number of bytes consumed so the caller can
/// advance its cursor.
///
/// # Errors
///
/// [`ProtocolError::Incomplete`] if `bytes` holds less than a full packet,
/// otherwise the errors of [`parse_header`].
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let header: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or(ProtocolError::Incomplete {
            needed: HEADER_SIZE,
            available: bytes.len(),
        })?;

    let (declared_len, message_type) = parse_header(header)?;
    let total = HEADER_SIZE + declared_len;
    let body = bytes
        .get(HEADER_SIZE..total)
        .ok_or(ProtocolError::Incomplete {
            needed: total,
            available: bytes.len(),
        })?;

    Ok((Message::new(message_type, body), total))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
