//! Session manager implementation

use dashmap::DashMap;

use sr_core::types::AgentId;
use sr_protocol::SessionCode;

use crate::connection::{ConnectionHandle, ConnectionId};

/// Live sessions indexed by code
pub struct SessionManager {
    sessions: DashMap<SessionCode, SessionEntry>,
}

/// A live session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Owning agent
    pub agent_id: AgentId,
    /// Controllers joined to this session, in join order
    pub controllers: Vec<ControllerAttachment>,
}

/// A controller joined to a session
#[derive(Debug, Clone)]
pub struct ControllerAttachment {
    /// Identity reported in `join_session`
    pub controller_id: String,
    /// Controller connection
    pub connection: ConnectionHandle,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create a session owned by `agent_id` with no controllers
    pub fn create(&self, code: SessionCode, agent_id: AgentId) {
        self.sessions.insert(
            code,
            SessionEntry {
                agent_id,
                controllers: Vec::new(),
            },
        );
    }

    /// Whether a code is live
    pub fn contains(&self, code: &SessionCode) -> bool {
        self.sessions.contains_key(code)
    }

    /// Owning agent of a session
    pub fn agent_for(&self, code: &SessionCode) -> Option<AgentId> {
        self.sessions.get(code).map(|s| s.agent_id.clone())
    }

    /// Append a controller to a session; false if the session is unknown
    pub fn attach(&self, code: &SessionCode, attachment: ControllerAttachment) -> bool {
        match self.sessions.get_mut(code) {
            Some(mut session) => {
                session.controllers.push(attachment);
                true
            }
            None => false,
        }
    }

    /// Remove a controller connection from every session.
    ///
    /// Returns the codes it was detached from. Sessions left without
    /// controllers stay live.
    pub fn detach_connection(&self, connection: ConnectionId) -> Vec<SessionCode> {
        let mut detached = Vec::new();
        for mut session in self.sessions.iter_mut() {
            let before = session.controllers.len();
            session
                .controllers
                .retain(|c| c.connection.id() != connection);
            if session.controllers.len() != before {
                detached.push(session.key().clone());
            }
        }
        detached
    }

    /// Remove every session owned by an agent
    pub fn remove_by_agent(&self, agent_id: &AgentId) -> Vec<(SessionCode, SessionEntry)> {
        let codes: Vec<SessionCode> = self
            .sessions
            .iter()
            .filter(|s| &s.agent_id == agent_id)
            .map(|s| s.key().clone())
            .collect();

        codes
            .into_iter()
            .filter_map(|code| self.sessions.remove(&code))
            .collect()
    }

    /// Controllers currently joined to a session
    pub fn controller_count(&self, code: &SessionCode) -> usize {
        self.sessions
            .get(code)
            .map(|s| s.controllers.len())
            .unwrap_or(0)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
