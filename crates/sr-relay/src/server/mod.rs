//! HTTP and WebSocket server

mod agent;
mod controller;
mod listener;
mod routes;
mod socket;

pub use agent::{AgentPhase, AgentProtocolHandler};
pub use controller::{ControllerPhase, ControllerProtocolHandler};
pub use listener::RelayServer;
pub use routes::router;
pub use socket::{split_socket, SocketWriter};

use sr_protocol::CloseSignal;

/// How a protocol handler finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The peer went away
    Disconnected,
    /// The relay closed the channel
    Closed(CloseSignal),
}
