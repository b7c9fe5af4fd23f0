//! Infrastructure layer of the chat client.

pub mod network;
