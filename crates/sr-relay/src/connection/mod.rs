//! Connection management

mod handle;
mod health;
mod pool;

pub use handle::{ConnectionClosed, ConnectionHandle, ConnectionId, Outbound, OUTBOUND_CHANNEL_CAPACITY};
pub use health::{LivenessTracker, SESSION_TTL};
pub use pool::{AgentEntry, AgentPool};
