//! Infrastructure layer: sockets and configuration files.
//!
//! - **`network`** – The TCP accept loop that turns each connection into a
//!   [`Session`](crate::application::session::Session).
//! - **`storage`** – TOML configuration loading.

pub mod network;
pub mod storage;
