//! sr-agent: Desktop agent for slide-remote
//!
//! The agent keeps an outbound WebSocket to the relay, registers under a
//! stable identity, publishes the session code it is assigned, sends
//! heartbeats, and hands every received slide command to a
//! [`CommandExecutor`].

pub mod executor;
pub mod tunnel;

pub use executor::{CommandExecutor, LoggingExecutor};
pub use tunnel::{ConnectionError, ExponentialBackoff, TunnelConnector};
