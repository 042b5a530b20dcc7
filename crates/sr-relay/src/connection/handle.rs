//! Per-connection outbound handle
//!
//! Every accepted WebSocket gets a [`ConnectionHandle`]. The registry keeps
//! clones of it to reach agents, and the socket's writer task drains the
//! other end of the channel. Equality and lookup are by [`ConnectionId`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

use sr_protocol::{CloseSignal, Message};

/// Capacity of each connection's outbound queue.
///
/// Agents receive at most one `session_assigned` plus commands at human
/// click rate, so a small buffer suffices. A full queue applies
/// backpressure to the forwarding controller only.
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// Process-unique identifier of an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Item queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON envelope sent as a text frame
    Message(Message),
    /// Close the channel with the given signal; nothing is sent after this
    Close(CloseSignal),
}

/// The writer side of the connection has gone away
#[derive(Debug, Error)]
#[error("connection {0} is closed")]
pub struct ConnectionClosed(pub ConnectionId);

/// Cloneable sender half addressing one connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Wrap an existing sender under a fresh identifier
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: ConnectionId::next(),
            tx,
        }
    }

    /// Create a handle together with the receiver its writer drains
    pub fn channel() -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        (Self::new(tx), rx)
    }

    /// Identifier of this connection
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an envelope for delivery
    pub async fn send(&self, message: Message) -> Result<(), ConnectionClosed> {
        self.tx
            .send(Outbound::Message(message))
            .await
            .map_err(|_| ConnectionClosed(self.id))
    }

    /// Queue a close; the writer stops after sending it
    pub async fn close(&self, signal: CloseSignal) -> Result<(), ConnectionClosed> {
        self.tx
            .send(Outbound::Close(signal))
            .await
            .map_err(|_| ConnectionClosed(self.id))
    }

    /// Whether the writer side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[tokio::test]
    async fn test_send_and_close_are_queued_in_order() {
        let (handle, mut rx) = ConnectionHandle::channel();

        handle.send(Message::error("unauthorized")).await.unwrap();
        handle.close(CloseSignal::Unauthorized).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Message(Message::error("unauthorized")))
        );
        assert_eq!(rx.recv().await, Some(Outbound::Close(CloseSignal::Unauthorized)));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (handle, rx) = ConnectionHandle::channel();
        drop(rx);

        assert!(handle.is_closed());
        let err = handle.send(Message::error("x")).await.unwrap_err();
        assert_eq!(err.0, handle.id());
    }

    #[test]
    fn test_clones_compare_equal() {
        let (handle, _rx) = ConnectionHandle::channel();
        let (other, _rx2) = ConnectionHandle::channel();
        assert_eq!(handle, handle.clone());
        assert_ne!(handle, other);
    }
}
