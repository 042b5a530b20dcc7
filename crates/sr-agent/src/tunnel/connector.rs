//! Outbound relay connector
//!
//! Establishes the agent WebSocket, registers, and keeps the connection
//! alive across drops. Each connected period looks like:
//!
//! 1. Connect to `backend_url` (bounded by `connect_timeout`)
//! 2. Send `agent_register`, wait for `session_assigned`
//! 3. Publish the session code, start the heartbeat task
//! 4. Dispatch `command` envelopes until the socket closes
//! 5. Cancel and await the heartbeat, close the socket, back off, repeat

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use sr_core::config::AgentConfig;
use sr_core::types::AgentId;
use sr_protocol::{CloseSignal, Message, MessageType, ProtocolError, SessionCode, PROTOCOL_VERSION};

use super::heartbeat::run_heartbeat;
use super::reconnect::ExponentialBackoff;
use crate::executor::{dispatch, CommandExecutor};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Why a connection attempt or session failed
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Transport or WebSocket failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Connecting or registering took too long
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The relay rejected our shared secret
    #[error("Relay rejected the shared secret")]
    Unauthorized,

    /// The relay closed the channel with a protocol signal
    #[error("Relay closed the channel: {0}")]
    Rejected(CloseSignal),

    /// The relay answered registration with an error envelope
    #[error("Relay refused registration: {0}")]
    Refused(String),

    /// Socket ended before `session_assigned`
    #[error("Connection closed before a session was assigned")]
    ClosedDuringHandshake,

    /// Relay sent something other than `session_assigned` first
    #[error("Unexpected {0} before session assignment")]
    UnexpectedMessage(MessageType),

    /// Relay sent an undecodable envelope during registration
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    /// Errors that retrying cannot fix
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectionError::Unauthorized | ConnectionError::Rejected(_))
    }
}

/// How a registered session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested
    Cancelled,
    /// The relay went away
    Disconnected,
}

/// Keeps the agent registered with the relay
pub struct TunnelConnector {
    /// Agent configuration
    config: AgentConfig,
    /// Identity reused across reconnects
    agent_id: AgentId,
    /// Receives slide commands
    executor: Arc<dyn CommandExecutor>,
    /// Current session code, `None` while disconnected
    session_tx: watch::Sender<Option<SessionCode>>,
}

impl TunnelConnector {
    /// Create a connector. The agent identity is resolved once here.
    pub fn new(config: AgentConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let agent_id = config.resolve_agent_id();
        let (session_tx, _) = watch::channel(None);
        Self {
            config,
            agent_id,
            executor,
            session_tx,
        }
    }

    /// Identity this agent registers under
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Watch the current session code
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionCode>> {
        self.session_tx.subscribe()
    }

    /// Stay connected until `cancel` fires.
    ///
    /// Transport failures are retried with exponential backoff, reset after
    /// every session that registered. Fatal errors (bad secret, protocol
    /// rejection) are returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ConnectionError> {
        let mut backoff = ExponentialBackoff::from_config(&self.config.backoff);

        loop {
            match self.run_session(&cancel).await {
                Ok(SessionEnd::Cancelled) => return Ok(()),
                Ok(SessionEnd::Disconnected) => {
                    tracing::warn!("Disconnected from relay");
                    backoff.reset();
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Giving up: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Connection to {} failed: {}", self.config.backend_url, e);
                }
            }

            let delay = backoff.next_delay();
            tracing::info!("Reconnecting in {:?} (attempt {})", delay, backoff.attempts());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// One connect → register → serve cycle
    pub async fn run_session(&self, cancel: &CancellationToken) -> Result<SessionEnd, ConnectionError> {
        tracing::info!(
            "Connecting to relay at {} as agent_id={}",
            self.config.backend_url,
            self.agent_id
        );

        let timeout = self.config.connect_timeout;
        let established = tokio::select! {
            result = tokio::time::timeout(timeout, self.establish()) => result,
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
        };
        let (sink, stream, session_id) = established.map_err(|_| ConnectionError::Timeout(timeout))??;

        tracing::info!("Registered as {} with session {}", self.agent_id, session_id);
        self.session_tx.send_replace(Some(session_id));

        let end = self.serve(sink, stream, cancel).await;

        self.session_tx.send_replace(None);
        Ok(end)
    }

    async fn establish(&self) -> Result<(WsSink, WsSource, SessionCode), ConnectionError> {
        let (ws, _) = connect_async(self.config.backend_url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        match self.register(&mut sink, &mut stream).await {
            Ok(session_id) => Ok((sink, stream, session_id)),
            Err(e) => {
                let _ = sink.close().await;
                Err(e)
            }
        }
    }

    async fn register(&self, sink: &mut WsSink, stream: &mut WsSource) -> Result<SessionCode, ConnectionError> {
        let register = Message::AgentRegister {
            agent_id: self.agent_id.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            secret: self.config.secret.clone().filter(|s| !s.is_empty()),
        };
        sink.send(WsMessage::Text(register.to_json()?)).await?;

        while let Some(frame) = stream.next().await {
            match frame? {
                WsMessage::Text(text) => {
                    return match Message::from_json(&text)? {
                        Message::SessionAssigned { session_id } => Ok(session_id),
                        Message::Error { error } if error == CloseSignal::Unauthorized.reason() => {
                            Err(ConnectionError::Unauthorized)
                        }
                        Message::Error { error } => Err(ConnectionError::Refused(error)),
                        other => Err(ConnectionError::UnexpectedMessage(other.message_type())),
                    };
                }
                WsMessage::Close(frame) => {
                    let signal = frame.and_then(|f| CloseSignal::from_code(u16::from(f.code)));
                    return Err(match signal {
                        Some(CloseSignal::Unauthorized) => ConnectionError::Unauthorized,
                        Some(signal) => ConnectionError::Rejected(signal),
                        None => ConnectionError::ClosedDuringHandshake,
                    });
                }
                _ => {}
            }
        }
        Err(ConnectionError::ClosedDuringHandshake)
    }

    async fn serve(&self, sink: WsSink, mut stream: WsSource, cancel: &CancellationToken) -> SessionEnd {
        let heartbeat_cancel = cancel.child_token();
        let heartbeat = tokio::spawn(run_heartbeat(
            sink,
            self.agent_id.clone(),
            self.config.heartbeat_interval,
            heartbeat_cancel.clone(),
        ));

        tracing::info!("Waiting for commands (next/prev)...");
        let end = loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => self.handle_text(&text),
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!("Relay closed the connection: {:?}", frame);
                    break SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Read error: {}", e);
                    break SessionEnd::Disconnected;
                }
                None => break SessionEnd::Disconnected,
            }
        };

        heartbeat_cancel.cancel();
        match heartbeat.await {
            Ok(mut sink) => {
                if let Err(e) = sink.close().await {
                    tracing::debug!("Close after session failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("Heartbeat task failed: {}", e),
        }
        end
    }

    fn handle_text(&self, text: &str) {
        match Message::from_json(text) {
            Ok(Message::Command(command)) => {
                tracing::info!(
                    "Received command for session {}: {}",
                    command.session_id,
                    command.command
                );
                dispatch(self.executor.as_ref(), &command.command);
            }
            Ok(other) => {
                tracing::debug!("Ignoring {} from relay", other.message_type());
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid frame from relay: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(ConnectionError::Unauthorized.is_fatal());
        assert!(ConnectionError::Rejected(CloseSignal::AgentUnexpectedFirstMessage).is_fatal());
        assert!(!ConnectionError::ClosedDuringHandshake.is_fatal());
        assert!(!ConnectionError::Timeout(Duration::from_secs(30)).is_fatal());
        assert!(!ConnectionError::Refused("busy".to_string()).is_fatal());
    }

    #[test]
    fn test_agent_id_is_stable_per_connector() {
        let connector = TunnelConnector::new(AgentConfig::default(), Arc::new(crate::LoggingExecutor));
        let first = connector.agent_id().clone();
        assert!(first.as_str().starts_with("pc-"));
        assert_eq!(connector.agent_id(), &first);
        assert!(connector.subscribe().borrow().is_none());
    }
}
