//! Registered agent pool

use dashmap::DashMap;

use sr_core::types::AgentId;

use super::handle::{ConnectionHandle, ConnectionId};

/// Agents indexed by identity.
///
/// An identity maps to exactly one connection; re-registering replaces the
/// previous entry (last writer wins).
pub struct AgentPool {
    agents: DashMap<AgentId, AgentEntry>,
}

/// A registered agent
#[derive(Debug, Clone)]
pub struct AgentEntry {
    /// Agent identity
    pub agent_id: AgentId,
    /// Connection the agent registered on
    pub connection: ConnectionHandle,
    /// Version reported in `agent_register`
    pub version: String,
}

impl AgentEntry {
    /// Create a new entry
    pub fn new(agent_id: AgentId, connection: ConnectionHandle, version: impl Into<String>) -> Self {
        Self {
            agent_id,
            connection,
            version: version.into(),
        }
    }
}

impl AgentPool {
    /// Create a new empty pool
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
        }
    }

    /// Insert an entry, returning the one it replaced
    pub fn insert(&self, entry: AgentEntry) -> Option<AgentEntry> {
        self.agents.insert(entry.agent_id.clone(), entry)
    }

    /// Remove an agent by identity
    pub fn remove(&self, agent_id: &AgentId) -> Option<AgentEntry> {
        self.agents.remove(agent_id).map(|(_, entry)| entry)
    }

    /// Connection currently owned by an agent
    pub fn connection(&self, agent_id: &AgentId) -> Option<ConnectionHandle> {
        self.agents.get(agent_id).map(|e| e.connection.clone())
    }

    /// Find the identity registered on a connection
    pub fn find_by_connection(&self, connection: ConnectionId) -> Option<AgentId> {
        self.agents
            .iter()
            .find(|e| e.connection.id() == connection)
            .map(|e| e.agent_id.clone())
    }

    /// Get a copy of an entry
    pub fn get(&self, agent_id: &AgentId) -> Option<AgentEntry> {
        self.agents.get(agent_id).map(|e| e.clone())
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if pool is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}
