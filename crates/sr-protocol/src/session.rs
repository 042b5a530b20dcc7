//! Session code type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of characters in a session code
pub const SESSION_CODE_LENGTH: usize = 6;

/// Short, human-typed code addressing one session (e.g. `3FA9C1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCode(String);

impl SessionCode {
    /// Wrap a code as received on the wire. No validation is performed,
    /// since an unknown or malformed code simply fails to resolve.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the raw code
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this code has the issued shape: fixed length, upper-case hex
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == SESSION_CODE_LENGTH
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_code_display() {
        let code = SessionCode::new("0A1B2C");
        assert_eq!(format!("{}", code), "0A1B2C");
    }

    #[test]
    fn test_session_code_well_formed() {
        assert!(SessionCode::new("0A1B2C").is_well_formed());
        assert!(SessionCode::new("FFFFFF").is_well_formed());
        assert!(!SessionCode::new("0a1b2c").is_well_formed());
        assert!(!SessionCode::new("0A1B2").is_well_formed());
        assert!(!SessionCode::new("0A1B2CD").is_well_formed());
        assert!(!SessionCode::new("GHIJKL").is_well_formed());
    }

    #[test]
    fn test_session_code_is_transparent_on_the_wire() {
        let json = serde_json::to_string(&SessionCode::new("ABC123")).unwrap();
        assert_eq!(json, r#""ABC123""#);
    }
}
