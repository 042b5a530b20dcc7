//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_secs, empty_as_none};
use crate::types::AgentId;

/// Environment variable overriding the relay URL
pub const BACKEND_URL_ENV: &str = "SLIDE_BACKEND_URL";

/// Environment variable overriding the agent identity
pub const AGENT_ID_ENV: &str = "SLIDE_AGENT_ID";

/// Environment variable holding the shared secret sent on registration
pub const AGENT_SECRET_ENV: &str = "SLIDE_AGENT_SECRET";

/// Configuration for the desktop agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// WebSocket URL of the relay's agent endpoint
    pub backend_url: String,

    /// Agent identity (generated once per process when unset)
    pub agent_id: Option<String>,

    /// Shared secret to present on registration
    #[serde(deserialize_with = "empty_as_none::deserialize")]
    pub secret: Option<String>,

    /// Interval between heartbeats
    #[serde(with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend_url: "ws://127.0.0.1:8000/ws/agent".to_string(),
            agent_id: None,
            secret: None,
            heartbeat_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Apply overrides from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BACKEND_URL_ENV) {
            self.backend_url = url;
        }
        if let Some(id) = lookup(AGENT_ID_ENV) {
            self.agent_id = Some(id);
        }
        if let Some(secret) = lookup(AGENT_SECRET_ENV) {
            self.secret = Some(secret);
        }
    }

    /// Resolve the agent identity, generating one when none is configured.
    ///
    /// Call once per process so reconnects reuse the same identity.
    pub fn resolve_agent_id(&self) -> AgentId {
        self.agent_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(AgentId::from)
            .unwrap_or_else(AgentId::generate)
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}
