//! Global relay state

use std::sync::Arc;

use sr_core::config::RelayConfig;

use crate::registry::ConnectionRegistry;

/// Global state shared by every connection task
pub struct RelayState {
    /// Connection registry
    pub registry: Arc<ConnectionRegistry>,
    /// Agent shared secret, captured once at construction
    shared_secret: Option<String>,
}

impl RelayState {
    /// Create new relay state with an empty registry
    pub fn new(config: RelayConfig) -> Self {
        Self::with_registry(config, Arc::new(ConnectionRegistry::new()))
    }

    /// Create new relay state around an existing registry
    pub fn with_registry(config: RelayConfig, registry: Arc<ConnectionRegistry>) -> Self {
        let shared_secret = config.effective_secret().map(str::to_owned);
        Self {
            registry,
            shared_secret,
        }
    }

    /// Whether agents must present a secret
    pub fn requires_secret(&self) -> bool {
        self.shared_secret.is_some()
    }

    /// Check a secret presented in `agent_register`.
    ///
    /// Always true when no secret is configured.
    pub fn is_authorized(&self, presented: Option<&str>) -> bool {
        match (&self.shared_secret, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => secrets_match(presented, expected),
            (Some(_), None) => false,
        }
    }
}

/// Constant-time string comparison
fn secrets_match(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
