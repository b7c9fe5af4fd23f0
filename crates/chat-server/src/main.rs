//! Chat room server, entry point.
//!
//! # Usage
//!
//! ```text
//! chat-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Config file [default: platform config dir]
//!   --bind <ADDR>     Bind address, overrides the config file
//!   --port <PORT>     Listen port, overrides the config file
//!   --write-config    Write the effective configuration and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable      | Description                         |
//! |---------------|-------------------------------------|
//! | `CHAT_CONFIG` | Config file path                    |
//! | `CHAT_BIND`   | Bind address                        |
//! | `CHAT_PORT`   | Listen port                         |
//! | `RUST_LOG`    | Log filter, overrides `log_level`   |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_server::application::authenticate::StaticPasswordVerifier;
use chat_server::application::registry::ClientRegistry;
use chat_server::application::session::SessionContext;
use chat_server::infrastructure::network::ChatServer;
use chat_server::infrastructure::storage::config::{
    config_file_path, load_config, load_config_from, save_config_to, ServerConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-client TCP chat room server.
#[derive(Debug, Parser)]
#[command(name = "chat-server", about = "Multi-client TCP chat room server", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind to, e.g. `0.0.0.0` or `127.0.0.1`.
    #[arg(long, env = "CHAT_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, short, env = "CHAT_PORT")]
    port: Option<u16>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    fn resolve_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };

        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }

    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(config_file_path()?),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    if cli.write_config {
        let path = cli.config_path()?;
        save_config_to(&config, &path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        info!(path = %path.display(), "configuration written");
        return Ok(());
    }

    let addr = config.bind_addr()?;
    let registry = Arc::new(ClientRegistry::new());
    let verifier = Arc::new(StaticPasswordVerifier::new(
        config.auth.admin_password.clone(),
    ));
    let ctx = Arc::new(SessionContext::new(
        registry,
        verifier,
        config.session_settings(),
    ));

    let server = ChatServer::bind(addr, ctx).await?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.run(running).await?;

    info!("chat server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
