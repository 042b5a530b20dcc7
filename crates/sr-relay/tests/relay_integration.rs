//! Relay integration tests
//!
//! Runs a real relay on 127.0.0.1 and drives it with WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use sr_core::config::RelayConfig;
use sr_protocol::{CommandMessage, Message, SessionCode};
use sr_relay::{RelayServer, RelayState};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestRelay {
    addr: SocketAddr,
    state: Arc<RelayState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TestRelay {
    async fn start(secret: Option<&str>) -> Self {
        let config = RelayConfig {
            bind_address: "127.0.0.1:0".to_string(),
            shared_secret: secret.map(str::to_owned),
        };
        let state = Arc::new(RelayState::new(config));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();

        let cancel = CancellationToken::new();
        let server = RelayServer::new(Arc::clone(&state), cancel.clone());
        let task = tokio::spawn(async move {
            server.serve(listener).await.expect("Relay server failed");
        });

        Self {
            addr,
            state,
            cancel,
            task,
        }
    }

    async fn connect(&self, path: &str) -> Ws {
        let url = format!("ws://{}{}", self.addr, path);
        let (ws, _) = connect_async(url.as_str())
            .await
            .unwrap_or_else(|e| panic!("Failed to connect to {}: {}", url, e));
        ws
    }

    /// Connect an agent and complete registration
    async fn register_agent(&self, agent_id: &str) -> (Ws, SessionCode) {
        let mut ws = self.connect("/ws/agent").await;
        send(
            &mut ws,
            &Message::AgentRegister {
                agent_id: agent_id.to_string(),
                version: "0.1.0".to_string(),
                secret: None,
            },
        )
        .await;
        match recv(&mut ws).await {
            Message::SessionAssigned { session_id } => (ws, session_id),
            other => panic!("expected session_assigned, got {:?}", other),
        }
    }

    /// Connect a controller and join `code`
    async fn join(&self, code: &SessionCode, controller_id: &str) -> Ws {
        let mut ws = self.connect("/ws/controller").await;
        send(
            &mut ws,
            &Message::JoinSession {
                session_id: code.clone(),
                controller_id: controller_id.to_string(),
            },
        )
        .await;
        ws
    }

    /// Poll until `check` holds
    async fn eventually(&self, check: impl Fn(&RelayState) -> bool) {
        timeout(WAIT, async {
            while !check(&self.state) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("Relay state never converged");
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        let _ = timeout(WAIT, self.task).await;
    }
}

async fn send(ws: &mut Ws, message: &Message) {
    let text = message.to_json().expect("Failed to encode message");
    ws.send(WsMessage::Text(text))
        .await
        .expect("Failed to send frame");
}

async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(WsMessage::Text(text.to_string()))
        .await
        .expect("Failed to send frame");
}

/// Next JSON envelope, skipping control frames
async fn recv(ws: &mut Ws) -> Message {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("Timed out waiting for frame")
            .expect("Connection ended")
            .expect("Read error");
        match frame {
            WsMessage::Text(text) => {
                return Message::from_json(&text).expect("Relay sent invalid JSON");
            }
            WsMessage::Close(frame) => panic!("Unexpected close: {:?}", frame),
            _ => continue,
        }
    }
}

/// Read until the close frame and return its code
async fn expect_close(ws: &mut Ws) -> u16 {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("Timed out waiting for close")
            .expect("Connection ended without close frame")
            .expect("Read error");
        match frame {
            WsMessage::Close(Some(frame)) => return u16::from(frame.code),
            WsMessage::Close(None) => panic!("Close frame without code"),
            WsMessage::Text(text) => panic!("Unexpected frame before close: {}", text),
            _ => continue,
        }
    }
}

fn command(code: &SessionCode, name: &str) -> Message {
    Message::Command(CommandMessage::new(code.clone(), name))
}

#[tokio::test]
async fn test_register_then_command_reaches_agent() {
    let relay = TestRelay::start(None).await;
    let (mut agent, code) = relay.register_agent("pc-1").await;

    assert!(code.is_well_formed());
    assert!(relay.state.registry.resolve(&code).await.is_some());

    let mut phone = relay.join(&code, "phone").await;
    send(&mut phone, &command(&code, "next")).await;

    assert_eq!(recv(&mut agent).await, command(&code, "next"));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_commands_from_two_controllers_arrive_in_order() {
    let relay = TestRelay::start(None).await;
    let (mut agent, code) = relay.register_agent("pc-1").await;

    let mut phone = relay.join(&code, "phone").await;
    let mut tablet = relay.join(&code, "tablet").await;
    relay
        .eventually(|s| s.registry.controller_count(&code) == 2)
        .await;

    send(&mut phone, &command(&code, "next")).await;
    assert_eq!(recv(&mut agent).await, command(&code, "next"));

    send(&mut tablet, &command(&code, "prev")).await;
    assert_eq!(recv(&mut agent).await, command(&code, "prev"));

    // Per-connection order, with invalid commands dropped in between
    send(&mut phone, &command(&code, "jump")).await;
    send_raw(&mut phone, "not json").await;
    send(&mut phone, &command(&code, "prev")).await;
    send(&mut phone, &command(&code, "next")).await;
    assert_eq!(recv(&mut agent).await, command(&code, "prev"));
    assert_eq!(recv(&mut agent).await, command(&code, "next"));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_join_unknown_session_gets_error_and_4404() {
    let relay = TestRelay::start(None).await;

    let mut phone = relay.join(&"000000".into(), "phone").await;

    assert_eq!(recv(&mut phone).await, Message::error("session_not_found"));
    assert_eq!(expect_close(&mut phone).await, 4404);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_controller_first_message_must_be_join() {
    let relay = TestRelay::start(None).await;

    let mut phone = relay.connect("/ws/controller").await;
    send(&mut phone, &command(&"ABCDEF".into(), "next")).await;

    assert_eq!(expect_close(&mut phone).await, 4001);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_agent_first_message_must_be_register() {
    let relay = TestRelay::start(None).await;

    let mut agent = relay.connect("/ws/agent").await;
    send(
        &mut agent,
        &Message::AgentHeartbeat {
            agent_id: "pc-1".to_string(),
        },
    )
    .await;

    assert_eq!(expect_close(&mut agent).await, 4000);
    assert_eq!(relay.state.registry.agent_count(), 0);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_missing_secret_is_rejected() {
    let relay = TestRelay::start(Some("abc")).await;

    let mut agent = relay.connect("/ws/agent").await;
    send(
        &mut agent,
        &Message::AgentRegister {
            agent_id: "pc-1".to_string(),
            version: "0.1.0".to_string(),
            secret: None,
        },
    )
    .await;

    assert_eq!(recv(&mut agent).await, Message::error("unauthorized"));
    assert_eq!(expect_close(&mut agent).await, 4401);
    assert_eq!(relay.state.registry.session_count(), 0);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_correct_secret_is_accepted() {
    let relay = TestRelay::start(Some("abc")).await;

    let mut agent = relay.connect("/ws/agent").await;
    send(
        &mut agent,
        &Message::AgentRegister {
            agent_id: "pc-1".to_string(),
            version: "0.1.0".to_string(),
            secret: Some("abc".to_string()),
        },
    )
    .await;

    assert!(matches!(
        recv(&mut agent).await,
        Message::SessionAssigned { .. }
    ));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_agent_disconnect_removes_session() {
    let relay = TestRelay::start(None).await;
    let (mut agent, code) = relay.register_agent("pc-1").await;
    let mut phone = relay.join(&code, "phone").await;
    relay
        .eventually(|s| s.registry.controller_count(&code) == 1)
        .await;

    agent.close(None).await.expect("Failed to close agent");
    relay.eventually(|s| s.registry.agent_count() == 0).await;
    assert!(!relay.state.registry.has_session(&code));

    // The dangling controller can still send; the command is dropped
    send(&mut phone, &command(&code, "next")).await;

    // A fresh controller can no longer join the old code
    let mut late = relay.join(&code, "late").await;
    assert_eq!(recv(&mut late).await, Message::error("session_not_found"));
    assert_eq!(expect_close(&mut late).await, 4404);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_controller_disconnect_keeps_session() {
    let relay = TestRelay::start(None).await;
    let (mut agent, code) = relay.register_agent("pc-1").await;

    let mut phone = relay.join(&code, "phone").await;
    relay
        .eventually(|s| s.registry.controller_count(&code) == 1)
        .await;
    phone.close(None).await.expect("Failed to close controller");
    relay
        .eventually(|s| s.registry.controller_count(&code) == 0)
        .await;

    assert!(relay.state.registry.has_session(&code));
    let mut tablet = relay.join(&code, "tablet").await;
    send(&mut tablet, &command(&code, "prev")).await;
    assert_eq!(recv(&mut agent).await, command(&code, "prev"));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_heartbeats_keep_connection_open() {
    let relay = TestRelay::start(None).await;
    let (mut agent, code) = relay.register_agent("pc-1").await;

    for _ in 0..3 {
        send(
            &mut agent,
            &Message::AgentHeartbeat {
                agent_id: "pc-1".to_string(),
            },
        )
        .await;
    }

    let mut phone = relay.join(&code, "phone").await;
    send(&mut phone, &command(&code, "next")).await;
    assert_eq!(recv(&mut agent).await, command(&code, "next"));

    relay.shutdown().await;
}
