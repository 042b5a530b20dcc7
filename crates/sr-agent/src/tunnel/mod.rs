//! Relay connection management

mod connector;
mod heartbeat;
mod reconnect;

pub use connector::{ConnectionError, SessionEnd, TunnelConnector};
pub use heartbeat::run_heartbeat;
pub use reconnect::ExponentialBackoff;
