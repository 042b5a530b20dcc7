//! slide-remote Agent Daemon
//!
//! Connects to the relay, prints the session code to enter on a
//! controller, and turns received slide commands into key presses.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sr_agent::{LoggingExecutor, TunnelConnector};
use sr_core::config::{self, AgentConfig};

#[derive(Parser)]
#[command(name = "sr-agent")]
#[command(about = "slide-remote agent - receives slide commands from the relay")]
#[command(version)]
struct Args {
    /// Relay agent endpoint (e.g. ws://relay.local:8000/ws/agent)
    #[arg(short, long)]
    backend_url: Option<String>,

    /// Agent identity (defaults to a generated pc-xxxxxxxx)
    #[arg(long)]
    agent_id: Option<String>,

    /// Shared secret expected by the relay
    #[arg(long)]
    secret: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("slide-remote agent starting...");

    // Load configuration: file, then environment, then flags
    let mut config: AgentConfig = match &args.config {
        Some(config_path) => config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?,
        None => config::load_or_default(&config::default_agent_config_path()),
    };
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(url) = args.backend_url {
        config.backend_url = url;
    }
    if let Some(agent_id) = args.agent_id {
        config.agent_id = Some(agent_id);
    }
    if let Some(secret) = args.secret {
        config.secret = Some(secret);
    }

    let connector = Arc::new(TunnelConnector::new(config, Arc::new(LoggingExecutor)));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Stopped by user, shutting down...");
        cancel_clone.cancel();
    });

    // Print the code every time a (re)registration assigns one
    let mut sessions = connector.subscribe();
    tokio::spawn(async move {
        while sessions.changed().await.is_ok() {
            let code = sessions.borrow_and_update().clone();
            if let Some(code) = code {
                print_banner(&code.to_string());
            }
        }
    });

    connector
        .run(cancel)
        .await
        .context("Agent stopped")?;

    tracing::info!("Agent shutdown complete");
    Ok(())
}

fn print_banner(code: &str) {
    println!("========================================");
    println!("Agent registered.");
    println!("Your code: {}", code);
    println!("Enter this code on the controller UI.");
    println!("========================================");
}
