//! Network infrastructure for the chat server.

pub mod listener;

pub use listener::{ChatServer, ServerError};
