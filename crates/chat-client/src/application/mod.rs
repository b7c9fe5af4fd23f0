//! Application layer of the chat client.
//!
//! - **`transcript`** – Turns the server's packet stream into printable lines.

pub mod transcript;
