//! Chat room terminal client, entry point.
//!
//! # Usage
//!
//! ```text
//! chat-client [OPTIONS] [NAME]
//!
//! Options:
//!   --host <HOST>          Server host [default: 127.0.0.1]
//!   --port <PORT>          Server port [default: 5050]
//!   --password <PASSWORD>  Admin password, sent after the name
//!   --admin-name <NAME>    Name that requires a password [default: admin]
//! ```
//!
//! Without `NAME` the client prompts for one.  Joining as the admin name
//! without `--password` prompts for the password.  Each line typed is sent as
//! a chat message; `quit` exits.

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use chat_client::application::transcript::Transcript;
use chat_client::infrastructure::network::{ChatConnection, ServerEvent};
use chat_core::protocol::messages::DEFAULT_PORT;

const QUIT_COMMAND: &str = "quit";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Terminal client for the chat room.
#[derive(Debug, Parser)]
#[command(name = "chat-client", about = "Terminal client for the chat room", version)]
struct Cli {
    /// Display name to join under.
    #[arg(env = "CHAT_NAME")]
    name: Option<String>,

    /// Hostname or IP address of the chat server.
    #[arg(long, default_value = "127.0.0.1", env = "CHAT_HOST")]
    host: String,

    /// TCP port of the chat server.
    #[arg(long, short, default_value_t = DEFAULT_PORT, env = "CHAT_PORT")]
    port: u16,

    /// Admin password.
    #[arg(long, env = "CHAT_PASSWORD")]
    password: Option<String>,

    /// The display name the server asks a password for.
    #[arg(long, default_value = "admin", env = "CHAT_ADMIN_NAME")]
    admin_name: String,
}

impl Cli {
    fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Quiet by default so log lines do not interleave with the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Chat room");
    println!("Type '{QUIT_COMMAND}' to quit the program");
    println!("Type and press enter to send messages");

    let name = match &cli.name {
        Some(name) => name.clone(),
        None => prompt(&mut input, "Enter your name - ").await?,
    };
    let password = match (&cli.password, name == cli.admin_name) {
        (Some(password), _) => Some(password.clone()),
        (None, true) => Some(prompt(&mut input, "Password - ").await?),
        (None, false) => None,
    };
    println!();

    let addr = cli.server_address();
    let (conn, events) = ChatConnection::connect(&addr)
        .await
        .with_context(|| format!("could not join the chat at {addr}"))?;

    conn.send_name(&name).await.context("failed to send name")?;
    if let Some(password) = password {
        conn.send_password(&password)
            .await
            .context("failed to send password")?;
    }

    let mut printer = tokio::spawn(print_events(events));

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim() == QUIT_COMMAND {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                conn.send_chat(&line).await.context("failed to send message")?;
            }
            _ = &mut printer => break,
        }
    }

    conn.close().await;
    printer.abort();
    Ok(())
}

/// Prints the conversation until the server disconnects.
async fn print_events(mut events: mpsc::Receiver<ServerEvent>) {
    let mut transcript = Transcript::new();
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::Packet(msg) => {
                if let Some(line) = transcript.push(msg) {
                    println!("{line}");
                }
            }
            ServerEvent::Disconnected => {
                println!("* disconnected from server");
                return;
            }
        }
    }
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, label: &str) -> anyhow::Result<String> {
    print!("{label}");
    std::io::stdout().flush().context("failed to write prompt")?;
    let line = input
        .next_line()
        .await
        .context("failed to read stdin")?
        .context("stdin closed before input was given")?;
    Ok(line.trim().to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
