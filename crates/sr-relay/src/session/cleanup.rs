//! Idle agent sweep
//!
//! A background task that periodically evicts agents which have not
//! registered or sent a heartbeat within the liveness TTL. Eviction cascades
//! through the registry: the agent's sessions and their controller
//! attachments go with it.
//!
//! Evicted agents' sockets are left open. If such an agent keeps talking,
//! its heartbeats are ignored as coming from an unknown identity.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::{AgentRemoval, ConnectionRegistry};

/// Interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Recurring sweep driving TTL eviction through the registry
pub struct CleanupScheduler {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl CleanupScheduler {
    /// Create a scheduler with the default sweep interval
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_interval(registry, SWEEP_INTERVAL)
    }

    /// Create a scheduler with a custom sweep interval
    pub fn with_interval(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run until `cancel` fires.
    ///
    /// The first sweep happens one interval after start. Each sweep runs in
    /// its own task so that a panic inside it is logged and the next tick
    /// still fires.
    pub async fn run(self, cancel: CancellationToken) {
        self.run_with(cancel, |registry| async move {
            registry.evict_stale(Instant::now()).await
        })
        .await
    }

    async fn run_with<F, Fut>(self, cancel: CancellationToken, sweep: F)
    where
        F: Fn(Arc<ConnectionRegistry>) -> Fut + Send + Sync,
        Fut: Future<Output = Vec<AgentRemoval>> + Send + 'static,
    {
        let mut interval = interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Starting idle agent sweep (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep(&sweep).await;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Idle agent sweep shutting down");
                    break;
                }
            }
        }
    }

    async fn sweep<F, Fut>(&self, sweep: &F)
    where
        F: Fn(Arc<ConnectionRegistry>) -> Fut,
        Fut: Future<Output = Vec<AgentRemoval>> + Send + 'static,
    {
        let task = tokio::spawn(sweep(Arc::clone(&self.registry)));

        match task.await {
            Ok(removed) if !removed.is_empty() => {
                tracing::info!("Swept {} idle agent(s)", removed.len());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Idle agent sweep failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sr_protocol::{CommandMessage, SessionCode};
    use tokio::sync::mpsc;

    use crate::connection::{ConnectionHandle, LivenessTracker, Outbound, SESSION_TTL};
    use crate::registry::ForwardOutcome;

    #[test]
    fn test_sweep_interval_is_shorter_than_ttl() {
        assert_eq!(SWEEP_INTERVAL, Duration::from_secs(60));
        assert!(SWEEP_INTERVAL < SESSION_TTL);
    }

    async fn start(registry: &Arc<ConnectionRegistry>) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(CleanupScheduler::new(Arc::clone(registry)).run(cancel.clone()));
        (cancel, task)
    }

    async fn register(
        registry: &ConnectionRegistry,
    ) -> (ConnectionHandle, mpsc::Receiver<Outbound>, SessionCode) {
        let (conn, rx) = ConnectionHandle::channel();
        let code = registry.register_agent(&conn, "pc-1".into(), "0.1.0").await;
        (conn, rx, code)
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_agent_is_evicted() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, mut rx, code) = register(&registry).await;
        let (phone, _phone_rx) = ConnectionHandle::channel();
        registry.add_controller(&phone, &code, "phone").await;
        let (cancel, task) = start(&registry).await;

        tokio::time::sleep(Duration::from_secs(601 + 60)).await;

        assert!(!registry.has_session(&code));
        assert!(registry.resolve(&code).await.is_none());
        assert_eq!(registry.agent_count(), 0);
        assert!(registry.remove_agent_by_connection(conn.id()).await.is_none());

        // The phone never detached, yet its commands go nowhere
        let outcome = registry
            .forward_command(CommandMessage::new(code.clone(), "next").with_controller("phone"))
            .await;
        assert_eq!(outcome, ForwardOutcome::UnknownSession);
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Message(sr_protocol::Message::SessionAssigned { .. }))
        ));
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_inside_ttl_prevents_eviction() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (conn, _rx, code) = register(&registry).await;
        let (cancel, task) = start(&registry).await;

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(registry.touch_agent(&"pc-1".into(), conn.id()).await);
        tokio::time::sleep(Duration::from_secs(361)).await;

        assert!(registry.has_session(&code));
        assert_eq!(registry.resolve(&code).await, Some(conn));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sweep_does_not_stop_scheduler() {
        let registry = Arc::new(ConnectionRegistry::with_liveness(LivenessTracker::new(
            Duration::from_secs(30),
        )));
        let (_conn, _rx, code) = register(&registry).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let sweep = {
            let calls = Arc::clone(&calls);
            move |registry: Arc<ConnectionRegistry>| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        panic!("sweep blew up");
                    }
                    registry.evict_stale(Instant::now()).await
                }
            }
        };
        let cancel = CancellationToken::new();
        let scheduler = CleanupScheduler::with_interval(Arc::clone(&registry), Duration::from_secs(60));
        let task = tokio::spawn(scheduler.run_with(cancel.clone(), sweep));

        // First tick panics; the stale agent survives it
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.has_session(&code));

        // Second tick still runs and evicts
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!registry.has_session(&code));
        assert_eq!(registry.agent_count(), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_scheduler() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (cancel, task) = start(&registry).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
