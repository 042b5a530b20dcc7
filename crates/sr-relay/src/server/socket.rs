//! WebSocket split into an inbound text stream and a writer task
//!
//! The read half is handed to a protocol handler as a stream of text
//! payloads. The write half is owned by a dedicated task draining the
//! connection's outbound queue, so registry sends never touch the socket.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{BoxStream, SplitSink};
use futures::{future, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionHandle, ConnectionId, Outbound};

/// Handle on a connection's writer task
pub struct SocketWriter {
    id: ConnectionId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SocketWriter {
    /// Stop the writer and wait for it.
    ///
    /// Anything already queued is flushed first; a queued close ends the
    /// writer on its own.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Writer task for {} failed: {}", self.id, e);
        }
    }
}

/// Split an upgraded socket.
///
/// Returns the connection's handle, a stream of inbound text payloads that
/// ends at the peer's close or a transport error, and the writer handle.
pub fn split_socket(socket: WebSocket) -> (ConnectionHandle, BoxStream<'static, String>, SocketWriter) {
    let (sink, stream) = socket.split();
    let (connection, rx) = ConnectionHandle::channel();
    let id = connection.id();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(write_loop(id, sink, rx, cancel.clone()));

    let inbound = stream
        .take_while(move |frame| {
            let open = match frame {
                Ok(WsMessage::Close(_)) => false,
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!("Read error on {}: {}", id, e);
                    false
                }
            };
            future::ready(open)
        })
        .filter_map(|frame| {
            let text = match frame {
                Ok(WsMessage::Text(text)) => Some(text),
                Ok(WsMessage::Binary(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                _ => None,
            };
            future::ready(text)
        })
        .boxed();

    (connection, inbound, SocketWriter { id, cancel, task })
}

async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) {
    loop {
        let outbound = tokio::select! {
            biased;
            outbound = rx.recv() => outbound,
            _ = cancel.cancelled() => break,
        };

        match outbound {
            Some(Outbound::Message(message)) => {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode {} for {}: {}", message.message_type(), id, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    tracing::debug!("Write to {} failed: {}", id, e);
                    break;
                }
            }
            Some(Outbound::Close(signal)) => {
                tracing::debug!("Closing {} with {}", id, signal);
                let frame = CloseFrame {
                    code: signal.code(),
                    reason: signal.reason().into(),
                };
                if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
                    tracing::debug!("Close on {} failed: {}", id, e);
                }
                break;
            }
            None => break,
        }
    }

    let _ = sink.close().await;
    tracing::debug!("Writer task for {} ended", id);
}
