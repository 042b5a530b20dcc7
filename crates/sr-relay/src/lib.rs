//! sr-relay: Session relay between presentation agents and controllers
//!
//! The relay accepts agent WebSockets, hands each registered agent a short
//! session code, lets controllers join with that code, and forwards their
//! slide commands to the owning agent. Idle agents are evicted by a
//! periodic sweep.

pub mod connection;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;

pub use registry::{AgentRemoval, ConnectionRegistry, ForwardOutcome};
pub use server::RelayServer;
pub use state::RelayState;
