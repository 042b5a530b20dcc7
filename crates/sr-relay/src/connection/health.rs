//! Agent liveness tracking
//!
//! Agents are the only endpoints with a time-based liveness bound:
//! registration and every heartbeat refresh the last-seen instant, and the
//! cleanup sweep evicts agents whose last-seen is older than the TTL.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use sr_core::types::AgentId;

/// How long an agent may stay silent before it is evicted.
pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Records last-seen instants and decides which agents are stale
pub struct LivenessTracker {
    /// Liveness window
    ttl: Duration,
    /// Last registration or heartbeat per agent
    last_seen: DashMap<AgentId, Instant>,
}

impl LivenessTracker {
    /// Create a tracker with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_seen: DashMap::new(),
        }
    }

    /// Liveness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record activity from an agent at `now`
    pub fn record(&self, agent_id: &AgentId, now: Instant) {
        self.last_seen.insert(agent_id.clone(), now);
    }

    /// Stop tracking an agent
    pub fn forget(&self, agent_id: &AgentId) {
        self.last_seen.remove(agent_id);
    }

    /// Whether `last_seen` lies strictly before `now - ttl`
    pub fn is_stale(&self, last_seen: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_seen) > self.ttl
    }

    /// Agents whose last activity lies strictly before `now - ttl`
    pub fn stale_agents(&self, now: Instant) -> Vec<AgentId> {
        self.last_seen
            .iter()
            .filter(|r| self.is_stale(*r.value(), now))
            .map(|r| r.key().clone())
            .collect()
    }

    /// Number of tracked agents
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}
