//! HTTP routes

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::agent::AgentProtocolHandler;
use super::controller::ControllerProtocolHandler;
use super::socket::split_socket;
use super::ConnectionEnd;
use crate::connection::ConnectionId;
use crate::state::RelayState;

/// Body of `GET /health`
#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// Build the relay router
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/agent", get(agent_ws))
        .route("/ws/controller", get(controller_ws))
        .with_state(state)
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn agent_ws(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    ws.on_upgrade(move |socket| agent_socket(socket, state))
}

async fn controller_ws(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    ws.on_upgrade(move |socket| controller_socket(socket, state))
}

async fn agent_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (connection, inbound, writer) = split_socket(socket);
    let id = connection.id();
    tracing::debug!("Agent channel opened on {}", id);

    let end = AgentProtocolHandler::new(state, connection).run(inbound).await;
    writer.shutdown().await;
    log_end("Agent", id, end);
}

async fn controller_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (connection, inbound, writer) = split_socket(socket);
    let id = connection.id();
    tracing::debug!("Controller channel opened on {}", id);

    let end = ControllerProtocolHandler::new(state, connection).run(inbound).await;
    writer.shutdown().await;
    log_end("Controller", id, end);
}

fn log_end(role: &str, id: ConnectionId, end: ConnectionEnd) {
    match end {
        ConnectionEnd::Disconnected => tracing::debug!("{} channel {} disconnected", role, id),
        ConnectionEnd::Closed(signal) => {
            tracing::info!("{} channel {} closed: {}", role, id, signal)
        }
    }
}
