//! Agent heartbeat task

use std::fmt::Display;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use sr_core::types::AgentId;
use sr_protocol::Message;

/// Send `agent_heartbeat` every `period` until cancelled or a write fails.
///
/// The first heartbeat goes out one period after start. The sink is handed
/// back so the caller can close the socket once the task is done.
pub async fn run_heartbeat<S>(
    mut sink: S,
    agent_id: AgentId,
    period: Duration,
    cancel: CancellationToken,
) -> S
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    let heartbeat = Message::AgentHeartbeat {
        agent_id: agent_id.to_string(),
    };
    let text = match heartbeat.to_json() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode heartbeat: {}", e);
            return sink;
        }
    };

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sink.send(WsMessage::Text(text.clone())).await {
                    tracing::debug!("Heartbeat send failed, stopping: {}", e);
                    break;
                }
                tracing::trace!("Heartbeat sent for {}", agent_id);
            }
            _ = cancel.cancelled() => break,
        }
    }

    sink
}
