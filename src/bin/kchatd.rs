//! KnightChat server - single-room chat relay over TCP
//!
//! Clients connect with any line-oriented TCP client, pick a unique name,
//! then every line they send is relayed to everyone in the room.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:1337
//! kchatd
//!
//! # Listen on a different port
//! kchatd --port 4000
//!
//! # Load settings from a file, then override the bind address
//! kchatd --config kchat.toml --bind 127.0.0.1
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kchatd::config::ServerConfig;
use kchatd::registry::spawn_registry;
use kchatd::server::{ChatServer, ServerError};

/// KnightChat server - single-room chat relay
#[derive(Parser, Debug)]
#[command(name = "kchatd", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface address to bind (overrides KCHAT_BIND)
    #[arg(short, long)]
    bind: Option<String>,

    /// TCP port to listen on (overrides KCHAT_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

impl Args {
    /// Resolves defaults, config file, environment, then flags.
    fn load_config(&self) -> Result<ServerConfig> {
        let config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        let mut config = config.apply_env()?;

        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config().context("Failed to load configuration")?;

    run(config)
}

#[tokio::main]
async fn run(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("kchatd=info".parse()?)
                .add_directive("kchat_core=info".parse()?)
                .add_directive("kchat_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "KnightChat server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry();
    let server = ChatServer::new(config, registry, cancel_token);

    match server.run().await {
        Ok(()) => Ok(()),
        Err(e @ ServerError::Bind { .. }) => {
            error!(
                port = server.config().port,
                error = %e,
                "Server startup failed. Cannot listen on port"
            );
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Server error");
            Err(e.into())
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
