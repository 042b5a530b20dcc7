//! Relay configuration

use serde::{Deserialize, Serialize};

use super::serde_utils::empty_as_none;

/// Environment variable holding the optional agent shared secret
pub const SHARED_SECRET_ENV: &str = "AGENT_SHARED_SECRET";

/// Environment variable overriding the bind address
pub const BIND_ADDRESS_ENV: &str = "SLIDE_RELAY_BIND";

/// Configuration for the relay server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to bind the HTTP/WebSocket server to
    pub bind_address: String,

    /// Shared secret agents must present on registration.
    ///
    /// `None` (or an empty string) disables the check.
    #[serde(deserialize_with = "empty_as_none::deserialize")]
    pub shared_secret: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            shared_secret: None,
        }
    }
}

impl RelayConfig {
    /// Apply overrides from the environment.
    ///
    /// `lookup` is normally `|key| std::env::var(key).ok()`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup(BIND_ADDRESS_ENV) {
            self.bind_address = bind;
        }
        if let Some(secret) = lookup(SHARED_SECRET_ENV) {
            self.shared_secret = Some(secret);
        }
    }

    /// The effective shared secret, treating an empty string as unset
    pub fn effective_secret(&self) -> Option<&str> {
        self.shared_secret.as_deref().filter(|s| !s.is_empty())
    }
}
