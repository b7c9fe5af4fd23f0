//! Protocol module containing message types and the framing codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_header, decode_message, encode, encode_message, parse_header, read_body, read_message,
    ProtocolError,
};
pub use messages::*;
