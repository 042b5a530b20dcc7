//! slide-remote relay daemon
//!
//! Accepts agent and controller WebSockets and relays slide commands
//! between them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sr_core::config::{self, RelayConfig};
use sr_relay::session::CleanupScheduler;
use sr_relay::{RelayServer, RelayState};

#[derive(Parser)]
#[command(name = "sr-relay")]
#[command(about = "slide-remote relay server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config and environment)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("slide-remote relay starting...");

    // Load configuration: file, then environment, then flags
    let mut config: RelayConfig = match &args.config {
        Some(config_path) => config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?,
        None => config::load_or_default(&config::default_relay_config_path()),
    };
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let bind_addr = config.bind_address.clone();
    let state = Arc::new(RelayState::new(config));
    if state.requires_secret() {
        tracing::info!("Agent registration requires the shared secret");
    } else {
        tracing::warn!("No shared secret configured - any agent may register");
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    // Idle agent sweep
    let sweeper = CleanupScheduler::new(Arc::clone(&state.registry));
    let sweep_task = tokio::spawn(sweeper.run(cancel.clone()));

    let server = RelayServer::new(Arc::clone(&state), cancel.clone());
    let result = server.run(&bind_addr).await;

    cancel.cancel();
    if let Err(e) = sweep_task.await {
        tracing::warn!("Idle agent sweep ended abnormally: {}", e);
    }

    result?;
    tracing::info!("Relay shutdown complete");
    Ok(())
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cancel.cancel();
}
