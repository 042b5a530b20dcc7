//! Controller channel protocol
//!
//! ```text
//! AwaitingJoin --join_session--> Joined --disconnect--> Closed
//!      |              |             |
//!      |              |             +--command--> forwarded, Joined
//!      |              +--unknown code--> Closed(4404)
//!      +--anything else--> Closed(4001)
//! ```
//!
//! The relay never answers a controller except with `error` right before
//! closing. Dropped commands are only logged.

use std::sync::Arc;

use futures::{Stream, StreamExt};

use sr_protocol::{CloseSignal, Message, SessionCode};

use super::ConnectionEnd;
use crate::connection::ConnectionHandle;
use crate::state::RelayState;

/// Where a controller connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerPhase {
    /// Waiting for the first frame
    AwaitingJoin,
    /// Attached to a session
    Joined {
        /// Session joined
        session_id: SessionCode,
        /// Identity given in `join_session`
        controller_id: String,
    },
    /// Channel finished
    Closed,
}

/// Per-connection state machine for `/ws/controller`
pub struct ControllerProtocolHandler {
    state: Arc<RelayState>,
    connection: ConnectionHandle,
    phase: ControllerPhase,
}

impl ControllerProtocolHandler {
    /// Create a handler for a freshly accepted connection
    pub fn new(state: Arc<RelayState>, connection: ConnectionHandle) -> Self {
        Self {
            state,
            connection,
            phase: ControllerPhase::AwaitingJoin,
        }
    }

    /// Current phase
    pub fn phase(&self) -> &ControllerPhase {
        &self.phase
    }

    /// Drive the channel until the peer leaves or the relay closes it,
    /// then detach from every session.
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
            ControllerPhase::AwaitingJoin => self.handle_join(text).await,
            ControllerPhase::Joined { .. } => {
                self.handle_joined(text).await;
                None
            }
            ControllerPhase::Closed => None,
        }
    }

    async fn handle_join(&mut self, text: &str) -> Option<CloseSignal> {
        let (session_id, controller_id) = match Message::from_json(text) {
            Ok(Message::JoinSession {
                session_id,
                controller_id,
            }) => (session_id, controller_id),
            Ok(other) => {
                tracing::warn!(
                    "Controller {} sent {} before joining",
                    self.connection.id(),
                    other.message_type()
                );
                return self.close(CloseSignal::ControllerUnexpectedFirstMessage).await;
            }
            Err(e) => {
                tracing::warn!(
                    "Controller {} sent invalid first frame: {}",
                    self.connection.id(),
                    e
                );
                return self.close(CloseSignal::ControllerUnexpectedFirstMessage).await;
            }
        };

        let joined = self
            .state
            .registry
            .add_controller(&self.connection, &session_id, controller_id.clone())
            .await;
        if !joined {
            if let Err(e) = self
                .connection
                .send(Message::error(CloseSignal::SessionNotFound.reason()))
                .await
            {
                tracing::debug!("Could not send error to {}: {}", self.connection.id(), e);
            }
            return self.close(CloseSignal::SessionNotFound).await;
        }

        self.phase = ControllerPhase::Joined {
            session_id,
            controller_id,
        };
        None
    }

    async fn handle_joined(&mut self, text: &str) {
        let ControllerPhase::Joined {
            session_id,
            controller_id,
        } = &self.phase
        else {
            return;
        };

        match Message::from_json(text) {
            Ok(Message::Command(command)) => {
                if &command.session_id != session_id {
                    tracing::debug!(
                        "Controller {} joined {} but addressed {}",
                        controller_id,
                        session_id,
                        command.session_id
                    );
                }
                self.state.registry.forward_command(command).await;
            }
            Ok(other) => {
                tracing::debug!(
                    "Ignoring {} from controller {}",
                    other.message_type(),
                    controller_id
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed frame from controller {}: {}",
                    controller_id,
                    e
                );
            }
        }
    }

    async fn close(&mut self, signal: CloseSignal) -> Option<CloseSignal> {
        if let Err(e) = self.connection.close(signal).await {
            tracing::debug!("Could not close {}: {}", self.connection.id(), e);
        }
        self.phase = ControllerPhase::Closed;
        Some(signal)
    }

    async fn finish(&mut self) {
        let previous = std::mem::replace(&mut self.phase, ControllerPhase::Closed);
        if let ControllerPhase::Joined { controller_id, .. } = previous {
            tracing::info!("Controller {} left {}", controller_id, self.connection.id());
            self.state
                .registry
                .remove_controller_by_connection(self.connection.id())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use sr_core::config::RelayConfig;
    use sr_protocol::CommandMessage;
    use tokio::sync::mpsc;

    use crate::connection::Outbound;

    struct Fixture {
        state: Arc<RelayState>,
        agent_rx: mpsc::Receiver<Outbound>,
        code: SessionCode,
    }

    async fn fixture() -> Fixture {
        let state = Arc::new(RelayState::new(RelayConfig::default()));
        let (agent, mut agent_rx) = ConnectionHandle::channel();
        let code = state
            .registry
            .register_agent(&agent, "pc-1".into(), "0.1.0")
            .await;
        // session_assigned
        agent_rx.recv().await;
        Fixture {
            state,
            agent_rx,
            code,
        }
    }

    fn handler(state: &Arc<RelayState>) -> (ControllerProtocolHandler, mpsc::Receiver<Outbound>) {
        let (connection, rx) = ConnectionHandle::channel();
        (ControllerProtocolHandler::new(Arc::clone(state), connection), rx)
    }

    fn join(code: &SessionCode, controller_id: &str) -> String {
        Message::JoinSession {
            session_id: code.clone(),
            controller_id: controller_id.to_string(),
        }
        .to_json()
        .unwrap()
    }

    fn command(code: &SessionCode, name: &str) -> String {
        Message::Command(CommandMessage::new(code.clone(), name))
            .to_json()
            .unwrap()
    }

    #[tokio::test]
    async fn test_join_then_command_reaches_agent() {
        let mut f = fixture().await;
        let (mut controller, _rx) = handler(&f.state);

        assert_eq!(controller.handle_frame(&join(&f.code, "phone")).await, None);
        assert_eq!(f.state.registry.controller_count(&f.code), 1);

        controller.handle_frame(&command(&f.code, "next")).await;
        assert_eq!(
            f.agent_rx.recv().await,
            Some(Outbound::Message(Message::Command(CommandMessage::new(
                f.code.clone(),
                "next"
            ))))
        );
    }

    #[tokio::test]
    async fn test_unknown_session_gets_error_then_4404() {
        let f = fixture().await;
        let (mut controller, mut rx) = handler(&f.state);

        let signal = controller.handle_frame(&join(&"000000".into(), "phone")).await;

        assert_eq!(signal, Some(CloseSignal::SessionNotFound));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Message(Message::error("session_not_found")))
        );
        assert_eq!(rx.recv().await, Some(Outbound::Close(CloseSignal::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_command_before_join_closes_4001() {
        let f = fixture().await;
        let (mut controller, mut rx) = handler(&f.state);

        let signal = controller.handle_frame(&command(&f.code, "next")).await;

        assert_eq!(signal, Some(CloseSignal::ControllerUnexpectedFirstMessage));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close(CloseSignal::ControllerUnexpectedFirstMessage))
        );
    }

    #[tokio::test]
    async fn test_invalid_command_is_dropped_silently() {
        let mut f = fixture().await;
        let (mut controller, mut rx) = handler(&f.state);
        controller.handle_frame(&join(&f.code, "phone")).await;

        assert_eq!(controller.handle_frame(&command(&f.code, "jump")).await, None);
        assert_eq!(controller.handle_frame("garbage").await, None);
        assert_eq!(
            controller
                .handle_frame(r#"{"type":"agent_heartbeat","agent_id":"pc-1"}"#)
                .await,
            None
        );

        assert!(f.agent_rx.try_recv().is_err());
        assert!(rx.try_recv().is_err());
        assert!(matches!(controller.phase(), ControllerPhase::Joined { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_detaches_but_keeps_session() {
        let f = fixture().await;
        let (controller, _rx) = handler(&f.state);

        let end = controller
            .run(stream::iter(vec![join(&f.code, "phone")]))
            .await;

        assert_eq!(end, ConnectionEnd::Disconnected);
        assert_eq!(f.state.registry.controller_count(&f.code), 0);
        assert!(f.state.registry.has_session(&f.code));
    }
}
