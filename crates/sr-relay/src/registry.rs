//! Connection registry
//!
//! The `ConnectionRegistry` is the single authority over agents, sessions and
//! controller attachments. Each collection is a concurrent map, and a
//! coordinating `RwLock<()>` makes sequences that span collections atomic.
//!
//! # Locking Model
//!
//! Mutations that touch more than one collection (registration, removal,
//! eviction, attaching a controller) take the write lock. Lookups that must
//! see a consistent chain (session → agent → connection) take the read lock.
//!
//! No I/O happens while the lock is held: operations resolve the destination
//! [`ConnectionHandle`] under the lock and send after releasing it, so a slow
//! socket can never stall unrelated connections.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;

use sr_core::types::AgentId;
use sr_protocol::{CommandMessage, Message, SessionCode};

use crate::connection::{AgentEntry, AgentPool, ConnectionHandle, ConnectionId, LivenessTracker};
use crate::session::{ControllerAttachment, SessionCodeGenerator, SessionManager};

/// Everything removed alongside one agent
#[derive(Debug, Clone)]
pub struct AgentRemoval {
    /// Removed agent
    pub agent_id: AgentId,
    /// Connection the agent was registered on
    pub connection: ConnectionHandle,
    /// Sessions destroyed with it
    pub sessions: Vec<SessionCode>,
    /// Controller attachments dropped with those sessions
    pub controllers: usize,
}

/// Result of forwarding a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Queued on the agent connection
    Delivered {
        /// Receiving agent
        agent_id: AgentId,
    },
    /// Command string outside the allowed set
    InvalidCommand,
    /// No live session with that code
    UnknownSession,
    /// The session's agent has no live entry
    AgentMissing,
    /// The agent connection is already closed
    SendFailed,
}

/// Shared map of agents, sessions and controllers
pub struct ConnectionRegistry {
    /// Lock for cross-collection atomicity; guards no data itself
    inner: RwLock<()>,

    /// Registered agents
    agents: AgentPool,

    /// Live sessions and their controllers
    sessions: SessionManager,

    /// Agent last-seen instants
    liveness: LivenessTracker,

    /// Session code source
    codes: SessionCodeGenerator,
}

impl ConnectionRegistry {
    /// Create an empty registry with the default TTL
    pub fn new() -> Self {
        Self::with_liveness(LivenessTracker::default())
    }

    /// Create an empty registry with a custom liveness tracker
    pub fn with_liveness(liveness: LivenessTracker) -> Self {
        Self {
            inner: RwLock::new(()),
            agents: AgentPool::new(),
            sessions: SessionManager::new(),
            liveness,
            codes: SessionCodeGenerator::new(),
        }
    }

    async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read().await
    }

    async fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.inner.write().await
    }

    /// Register an agent and open a fresh session for it.
    ///
    /// An existing entry for the same identity is overwritten. Sessions
    /// created by earlier registrations stay live. `session_assigned` is
    /// queued on `connection` once the lock is released.
    pub async fn register_agent(
        &self,
        connection: &ConnectionHandle,
        agent_id: AgentId,
        version: impl Into<String>,
    ) -> SessionCode {
        let entry = AgentEntry::new(agent_id.clone(), connection.clone(), version);
        let version = entry.version.clone();
        let session_id = {
            let _lock = self.write().await;

            let replaced = self.agents.insert(entry);
            if let Some(previous) = replaced {
                if previous.connection != *connection {
                    tracing::info!(
                        "Agent {} re-registered on {} (was {})",
                        agent_id,
                        connection.id(),
                        previous.connection.id()
                    );
                }
            }
            self.liveness.record(&agent_id, Instant::now());

            let code = self.codes.generate_unique(|c| self.sessions.contains(c));
            self.sessions.create(code.clone(), agent_id.clone());
            code
        };

        tracing::info!(
            "Agent {} (version {}) registered on {} with session {}",
            agent_id,
            version,
            connection.id(),
            session_id
        );

        let assigned = Message::SessionAssigned {
            session_id: session_id.clone(),
        };
        if let Err(e) = connection.send(assigned).await {
            tracing::warn!("Could not deliver session code to agent {}: {}", agent_id, e);
        }

        session_id
    }

    /// Refresh an agent's last-seen instant.
    ///
    /// Only the connection currently owning the identity may refresh it, so a
    /// superseded or evicted socket cannot keep a newer registration alive.
    /// Returns false when the heartbeat was ignored.
    pub async fn touch_agent(&self, agent_id: &AgentId, connection: ConnectionId) -> bool {
        let _lock = self.read().await;
        match self.agents.get(agent_id) {
            Some(entry) if entry.connection.id() == connection => {
                self.liveness.record(agent_id, Instant::now());
                true
            }
            Some(entry) => {
                tracing::debug!(
                    "Heartbeat for {} on {} ignored; identity is owned by {}",
                    agent_id,
                    connection,
                    entry.connection.id()
                );
                false
            }
            None => {
                tracing::debug!("Heartbeat from unknown agent {} ignored", agent_id);
                false
            }
        }
    }

    /// Remove the agent registered on `connection` together with its
    /// sessions and their controller attachments.
    pub async fn remove_agent_by_connection(&self, connection: ConnectionId) -> Option<AgentRemoval> {
        let removal = {
            let _lock = self.write().await;
            match self.agents.find_by_connection(connection) {
                Some(agent_id) => self.remove_agent_locked(&agent_id),
                None => None,
            }
        };

        match &removal {
            Some(removal) => tracing::info!(
                "Agent {} disconnected; removed sessions {:?} and {} controller(s)",
                removal.agent_id,
                removal.sessions,
                removal.controllers
            ),
            None => tracing::debug!("No agent registered on {}, nothing to remove", connection),
        }
        removal
    }

    /// Evict every agent whose last-seen lies strictly before `now - ttl`
    pub async fn evict_stale(&self, now: Instant) -> Vec<AgentRemoval> {
        let removals: Vec<AgentRemoval> = {
            let _lock = self.write().await;
            self.liveness
                .stale_agents(now)
                .iter()
                .filter_map(|agent_id| self.remove_agent_locked(agent_id))
                .collect()
        };

        for removal in &removals {
            tracing::info!(
                "Evicted idle agent {}; removed sessions {:?} and {} controller(s)",
                removal.agent_id,
                removal.sessions,
                removal.controllers
            );
        }
        removals
    }

    /// Caller must hold the write lock.
    fn remove_agent_locked(&self, agent_id: &AgentId) -> Option<AgentRemoval> {
        self.liveness.forget(agent_id);
        let entry = self.agents.remove(agent_id)?;
        let removed = self.sessions.remove_by_agent(agent_id);

        Some(AgentRemoval {
            agent_id: entry.agent_id,
            connection: entry.connection,
            controllers: removed.iter().map(|(_, s)| s.controllers.len()).sum(),
            sessions: removed.into_iter().map(|(code, _)| code).collect(),
        })
    }

    /// Join a controller to a live session. Returns false if the code is unknown.
    pub async fn add_controller(
        &self,
        connection: &ConnectionHandle,
        session_id: &SessionCode,
        controller_id: impl Into<String>,
    ) -> bool {
        let controller_id = controller_id.into();
        let attached = {
            let _lock = self.write().await;
            self.sessions.attach(
                session_id,
                ControllerAttachment {
                    controller_id: controller_id.clone(),
                    connection: connection.clone(),
                },
            )
        };

        if attached {
            tracing::info!(
                "Controller {} joined session {} on {}",
                controller_id,
                session_id,
                connection.id()
            );
        } else {
            tracing::info!(
                "Controller {} asked for unknown session {}",
                controller_id,
                session_id
            );
        }
        attached
    }

    /// Detach a controller connection from every session.
    ///
    /// Returns how many sessions it was attached to. Sessions are never
    /// destroyed by losing their last controller.
    pub async fn remove_controller_by_connection(&self, connection: ConnectionId) -> usize {
        let detached = {
            let _lock = self.write().await;
            self.sessions.detach_connection(connection)
        };
        tracing::debug!("Controller {} detached from sessions {:?}", connection, detached);
        detached.len()
    }

    /// Forward a command to the agent owning `command.session_id`.
    ///
    /// Invalid commands and resolution misses are dropped and logged; the
    /// sender is never told.
    pub async fn forward_command(&self, command: CommandMessage) -> ForwardOutcome {
        if command.slide_command().is_none() {
            tracing::warn!(
                "Dropping unsupported command {:?} for session {}",
                command.command,
                command.session_id
            );
            return ForwardOutcome::InvalidCommand;
        }

        let target = {
            let _lock = self.read().await;
            match self.sessions.agent_for(&command.session_id) {
                None => Err(ForwardOutcome::UnknownSession),
                Some(agent_id) => match self.agents.connection(&agent_id) {
                    Some(connection) => Ok((agent_id, connection)),
                    None => Err(ForwardOutcome::AgentMissing),
                },
            }
        };

        let (agent_id, connection) = match target {
            Ok(target) => target,
            Err(outcome) => {
                tracing::warn!(
                    "Dropping command {} for session {}: {:?}",
                    command.command,
                    command.session_id,
                    outcome
                );
                return outcome;
            }
        };

        let session_id = command.session_id.clone();
        let name = command.command.clone();
        match connection.send(Message::Command(command)).await {
            Ok(()) => {
                tracing::debug!("Forwarded {} for session {} to agent {}", name, session_id, agent_id);
                ForwardOutcome::Delivered { agent_id }
            }
            Err(e) => {
                tracing::warn!("Dropping command {} for session {}: {}", name, session_id, e);
                ForwardOutcome::SendFailed
            }
        }
    }

    /// Connection of the agent that owns a session
    pub async fn resolve(&self, session_id: &SessionCode) -> Option<ConnectionHandle> {
        let _lock = self.read().await;
        let agent_id = self.sessions.agent_for(session_id)?;
        self.agents.connection(&agent_id)
    }

    /// Whether a session code is live
    pub fn has_session(&self, session_id: &SessionCode) -> bool {
        self.sessions.contains(session_id)
    }

    /// Controllers joined to a session
    pub fn controller_count(&self, session_id: &SessionCode) -> usize {
        self.sessions.controller_count(session_id)
    }

    /// Number of registered agents
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
