//! Relay Daemon
//!
//! Serves the chat endpoints over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default config ($XDG_CONFIG_HOME/chat-relay/relay.toml)
//! OPENAI_API_KEY=sk-... relay-daemon
//!
//! # Custom bind address and bearer token
//! relay-daemon --bind 0.0.0.0:8080 --access-token local-dev-token
//!
//! # With verbose logging
//! RUST_LOG=debug relay-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY`: upstream credential (required for chat requests)
//! - `OPENAI_BASE_URL`: upstream API base
//! - `RELAY_BIND`: listen address
//! - `RELAY_ACCESS_TOKEN`: bearer token clients must send
//! - `RUST_LOG`: log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: graceful shutdown (open streams are allowed to finish)

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use relay_core::{default_config_path, load_config_from_path, ConfigOverrides};
use relay_daemon::{serve, AppState};

/// Streaming chat relay
#[derive(Debug, Parser)]
#[command(name = "relay-daemon", version, about)]
struct Args {
    /// Path to relay.toml
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Bearer token clients must send
    #[arg(long)]
    access_token: Option<String>,

    /// Chat completion model
    #[arg(long)]
    chat_model: Option<String>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_daemon=info".parse()?)
                .add_directive("relay_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut config = load_config_from_path(args.config.or_else(default_config_path))
        .context("Failed to load configuration")?;

    let overrides = ConfigOverrides {
        bind: args.bind,
        access_token: args.access_token,
        chat_model: args.chat_model,
        ..ConfigOverrides::default()
    };
    overrides
        .apply(&mut config)
        .context("Invalid command-line option")?;

    info!(source = %config.source(), "Configuration resolved");

    let state = AppState::from_config(&config).context("Failed to initialize upstream backend")?;
    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %config.server.bind, "Relay daemon listening");

    serve(listener, state, shutdown_signal())
        .await
        .context("Server error")?;

    info!("Relay daemon stopped");
    Ok(())
}
