//! Text of the `INFO` packets the server sends to clients.

use chat_core::MessageType;

pub const WRONG_PASSWORD: &str = "Wrong password";
pub const EMPTY_NAME: &str = "Name cannot be empty";
pub const INVALID_LENGTH: &str = "Invalid message length received";
pub const SHUTTING_DOWN: &str = "Server shutting down";

pub fn joined(name: &str) -> String {
    format!("{name} entered the chat")
}

pub fn left(name: &str) -> String {
    format!("{name} left the chat")
}

pub fn authenticated(name: &str) -> String {
    format!("Authenticated as {name}")
}

/// Sent when a packet arrives whose type the current state does not accept.
pub fn wrong_packet(expected: MessageType, received: MessageType) -> String {
    format!("Expected {expected} packet, but received {received} packet")
}

pub fn unknown_type(type_name: &str) -> String {
    format!("Unknown packet type {type_name:?}")
}
