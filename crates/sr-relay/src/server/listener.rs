//! Relay listener
//!
//! Binds the TCP listener and serves the router until cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::routes::router;
use crate::state::RelayState;

/// HTTP/WebSocket server for agents and controllers
pub struct RelayServer {
    /// Shared relay state
    state: Arc<RelayState>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(state: Arc<RelayState>, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Bind `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr: SocketAddr = listener.local_addr()?;
        tracing::info!("Relay listening on {}", local_addr);

        let cancel = self.cancel.clone();
        axum::serve(listener, router(Arc::clone(&self.state)))
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .context("Relay server failed")?;

        tracing::info!("Relay server shut down");
        Ok(())
    }
}
