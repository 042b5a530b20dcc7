//! Agent channel protocol
//!
//! ```text
//! AwaitingRegister --agent_register--> Registered --disconnect--> Closed
//!        |                                  |
//!        +--anything else--> Closed(4000)   +--agent_heartbeat--> Registered
//!        +--bad secret----> Closed(4401)
//! ```

use std::sync::Arc;

use futures::{Stream, StreamExt};

use sr_core::types::AgentId;
use sr_protocol::{CloseSignal, Message, SessionCode};

use super::ConnectionEnd;
use crate::connection::ConnectionHandle;
use crate::state::RelayState;

/// Where an agent connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentPhase {
    /// Waiting for the first frame
    AwaitingRegister,
    /// Registered and holding a session
    Registered {
        /// Identity registered on this connection
        agent_id: AgentId,
        /// Session opened by the registration
        session_id: SessionCode,
    },
    /// Channel finished
    Closed,
}

/// Per-connection state machine for `/ws/agent`
pub struct AgentProtocolHandler {
    state: Arc<RelayState>,
    connection: ConnectionHandle,
    phase: AgentPhase,
}

impl AgentProtocolHandler {
    /// Create a handler for a freshly accepted connection
    pub fn new(state: Arc<RelayState>, connection: ConnectionHandle) -> Self {
        Self {
            state,
            connection,
            phase: AgentPhase::AwaitingRegister,
        }
    }

    /// Current phase
    pub fn phase(&self) -> &AgentPhase {
        &self.phase
    }

    /// Drive the channel until the peer leaves or the relay closes it,
    /// then release the agent's registry entries.
    pub async fn run<S>(mut self, mut inbound: S) -> ConnectionEnd
    where
        S: Stream<Item = String> + Unpin,
    {
        let mut end = ConnectionEnd::Disconnected;
        while let Some(text) = inbound.next().await {
            if let Some(signal) = self.handle_frame(&text).await {
                end = ConnectionEnd::Closed(signal);
                break;
            }
        }
        self.finish().await;
        end
    }

    /// Process one inbound text frame. Returns the close signal if the
    /// frame ended the channel.
    pub async fn handle_frame(&mut self, text: &str) -> Option<CloseSignal> {
        match self.phase {
            AgentPhase::AwaitingRegister => self.handle_register(text).await,
            AgentPhase::Registered { .. } => {
                self.handle_registered(text).await;
                None
            }
            AgentPhase::Closed => None,
        }
    }

    async fn handle_register(&mut self, text: &str) -> Option<CloseSignal> {
        let (agent_id, version, secret) = match Message::from_json(text) {
            Ok(Message::AgentRegister {
                agent_id,
                version,
                secret,
            }) => (agent_id, version, secret),
            Ok(other) => {
                tracing::warn!(
                    "Agent {} sent {} before registering",
                    self.connection.id(),
                    other.message_type()
                );
                return self.close(CloseSignal::AgentUnexpectedFirstMessage).await;
            }
            Err(e) => {
                tracing::warn!("Agent {} sent invalid first frame: {}", self.connection.id(), e);
                return self.close(CloseSignal::AgentUnexpectedFirstMessage).await;
            }
        };

        if !self.state.is_authorized(secret.as_deref()) {
            tracing::warn!(
                "Agent {} on {} presented a bad secret",
                agent_id,
                self.connection.id()
            );
            if let Err(e) = self
                .connection
                .send(Message::error(CloseSignal::Unauthorized.reason()))
                .await
            {
                tracing::debug!("Could not send error to {}: {}", self.connection.id(), e);
            }
            return self.close(CloseSignal::Unauthorized).await;
        }

        let agent_id = AgentId::new(agent_id);
        let session_id = self
            .state
            .registry
            .register_agent(&self.connection, agent_id.clone(), version)
            .await;
        self.phase = AgentPhase::Registered {
            agent_id,
            session_id,
        };
        None
    }

    async fn handle_registered(&mut self, text: &str) {
        let AgentPhase::Registered { agent_id, .. } = &self.phase else {
            return;
        };

        match Message::from_json(text) {
            Ok(Message::AgentHeartbeat { agent_id: claimed }) => {
                if claimed != agent_id.as_str() {
                    tracing::debug!(
                        "Heartbeat on {} names {} but connection is registered as {}",
                        self.connection.id(),
                        claimed,
                        agent_id
                    );
                }
                self.state
                    .registry
                    .touch_agent(agent_id, self.connection.id())
                    .await;
            }
            Ok(other) => {
                tracing::debug!("Ignoring {} from agent {}", other.message_type(), agent_id);
            }
            Err(e) => {
                tracing::warn!("Ignoring malformed frame from agent {}: {}", agent_id, e);
            }
        }
    }

    async fn close(&mut self, signal: CloseSignal) -> Option<CloseSignal> {
        if let Err(e) = self.connection.close(signal).await {
            tracing::debug!("Could not close {}: {}", self.connection.id(), e);
        }
        self.phase = AgentPhase::Closed;
        Some(signal)
    }

    async fn finish(&mut self) {
        let previous = std::mem::replace(&mut self.phase, AgentPhase::Closed);
        if let AgentPhase::Registered { agent_id, .. } = previous {
            tracing::info!("Agent {} left {}", agent_id, self.connection.id());
            self.state
                .registry
                .remove_agent_by_connection(self.connection.id())
                .await;
        }
    }
}
