//! Close signals sent when the relay terminates a channel

use std::fmt;

/// Reason the relay closed a channel, carried as a WebSocket close code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseSignal {
    /// First frame on the agent channel was not a valid `agent_register`
    AgentUnexpectedFirstMessage,
    /// First frame on the controller channel was not a valid `join_session`
    ControllerUnexpectedFirstMessage,
    /// Registration secret did not match
    Unauthorized,
    /// `join_session` referenced a code with no live session
    SessionNotFound,
}

impl CloseSignal {
    /// All close signals
    pub const ALL: [CloseSignal; 4] = [
        CloseSignal::AgentUnexpectedFirstMessage,
        CloseSignal::ControllerUnexpectedFirstMessage,
        CloseSignal::Unauthorized,
        CloseSignal::SessionNotFound,
    ];

    /// WebSocket close code (application range 4000-4999)
    pub fn code(&self) -> u16 {
        match self {
            CloseSignal::AgentUnexpectedFirstMessage => 4000,
            CloseSignal::ControllerUnexpectedFirstMessage => 4001,
            CloseSignal::Unauthorized => 4401,
            CloseSignal::SessionNotFound => 4404,
        }
    }

    /// Map a received close code back to a signal
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Short reason text sent alongside the close code
    pub fn reason(&self) -> &'static str {
        match self {
            CloseSignal::AgentUnexpectedFirstMessage
            | CloseSignal::ControllerUnexpectedFirstMessage => "unexpected first message",
            CloseSignal::Unauthorized => "unauthorized",
            CloseSignal::SessionNotFound => "session_not_found",
        }
    }
}

impl fmt::Display for CloseSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}
