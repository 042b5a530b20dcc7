//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix used for generated agent identities
const AGENT_ID_PREFIX: &str = "pc-";

/// Number of uuid hex characters kept in a generated agent identity
const AGENT_ID_SUFFIX_LEN: usize = 8;

/// Identity an agent registers under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new agent ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identity of the form `pc-1a2b3c4d`
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", AGENT_ID_PREFIX, &uuid[..AGENT_ID_SUFFIX_LEN]))
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_agent_id_shape() {
        let id = AgentId::generate();
        assert!(id.as_str().starts_with("pc-"));
        assert_eq!(id.as_str().len(), 3 + 8);
        assert!(id.as_str()[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_agent_ids_differ() {
        assert_ne!(AgentId::generate(), AgentId::generate());
    }

    #[test]
    fn test_agent_id_display() {
        assert_eq!(format!("{}", AgentId::new("pc-1")), "pc-1");
    }
}
