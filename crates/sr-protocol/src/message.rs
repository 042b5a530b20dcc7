//! Message types for the slide-remote protocol
//!
//! Every WebSocket text frame carries exactly one JSON envelope whose `type`
//! field selects the variant. Decoding lives in `codec.rs`.
//!
//! # Message Flow
//!
//! Agent channel:
//!
//! 1. Agent connects and sends `agent_register` (with `secret` if the relay
//!    requires one)
//! 2. Relay responds with `session_assigned`
//! 3. Agent sends `agent_heartbeat` periodically
//! 4. Relay forwards `command` envelopes from controllers
//!
//! Controller channel:
//!
//! 1. Controller connects and sends `join_session`
//! 2. Controller sends `command` envelopes
//! 3. Relay only ever answers with `error` immediately before closing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::session::SessionCode;

/// Version string reported by agents in `agent_register`.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Message type identifier, mirrors the `type` tag on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Registration message (agent → relay)
    AgentRegister,
    /// Liveness ping (agent → relay)
    AgentHeartbeat,
    /// Session code assignment (relay → agent)
    SessionAssigned,
    /// Join request (controller → relay)
    JoinSession,
    /// Slide command (controller → relay → agent)
    Command,
    /// Error response (relay → controller/agent)
    Error,
}

impl MessageType {
    /// All known message types
    pub const ALL: [MessageType; 6] = [
        MessageType::AgentRegister,
        MessageType::AgentHeartbeat,
        MessageType::SessionAssigned,
        MessageType::JoinSession,
        MessageType::Command,
        MessageType::Error,
    ];

    /// Wire tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AgentRegister => "agent_register",
            MessageType::AgentHeartbeat => "agent_heartbeat",
            MessageType::SessionAssigned => "session_assigned",
            MessageType::JoinSession => "join_session",
            MessageType::Command => "command",
            MessageType::Error => "error",
        }
    }

    /// Look up a type from its wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of commands a controller may send.
///
/// Anything outside this set is dropped by the relay and ignored by agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideCommand {
    /// Advance one slide
    Next,
    /// Go back one slide
    Prev,
}

impl SlideCommand {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SlideCommand::Next => "next",
            SlideCommand::Prev => "prev",
        }
    }
}

impl FromStr for SlideCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(SlideCommand::Next),
            "prev" => Ok(SlideCommand::Prev),
            other => Err(format!("unsupported command '{}'", other)),
        }
    }
}

impl fmt::Display for SlideCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `command` envelope.
///
/// The relay forwards this verbatim, so `command` stays a raw string here and
/// is validated against [`SlideCommand`] at the forwarding point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Session the command is addressed to
    pub session_id: SessionCode,
    /// Command string (`next` / `prev`)
    pub command: String,
    /// Sending controller, if it identified itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
}

impl CommandMessage {
    /// Create a new command envelope body
    pub fn new(session_id: SessionCode, command: impl Into<String>) -> Self {
        Self {
            session_id,
            command: command.into(),
            controller_id: None,
        }
    }

    /// Attach the sending controller's identity
    pub fn with_controller(mut self, controller_id: impl Into<String>) -> Self {
        self.controller_id = Some(controller_id.into());
        self
    }

    /// Parse the command string against the allowed set
    pub fn slide_command(&self) -> Option<SlideCommand> {
        self.command.parse().ok()
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Agent registration.
    ///
    /// Must be the first frame on the agent channel.
    AgentRegister {
        /// Stable agent identity (e.g. `pc-1a2b3c4d`)
        agent_id: String,
        /// Agent software version
        version: String,
        /// Shared secret, required when the relay has one configured
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },

    /// Agent heartbeat
    AgentHeartbeat {
        /// Identity of the sending agent
        agent_id: String,
    },

    /// Session code assigned to a freshly registered agent
    SessionAssigned {
        /// Code controllers use to join
        session_id: SessionCode,
    },

    /// Controller join request.
    ///
    /// Must be the first frame on the controller channel.
    JoinSession {
        /// Code shown by the agent
        session_id: SessionCode,
        /// Identity of the controller
        controller_id: String,
    },

    /// Slide command
    Command(CommandMessage),

    /// Error response, always followed by a close
    Error {
        /// Machine-readable error string (`unauthorized`, `session_not_found`)
        error: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::AgentRegister { .. } => MessageType::AgentRegister,
            Message::AgentHeartbeat { .. } => MessageType::AgentHeartbeat,
            Message::SessionAssigned { .. } => MessageType::SessionAssigned,
            Message::JoinSession { .. } => MessageType::JoinSession,
            Message::Command(_) => MessageType::Command,
            Message::Error { .. } => MessageType::Error,
        }
    }

    /// Build an error envelope
    pub fn error(error: impl Into<String>) -> Self {
        Message::Error {
            error: error.into(),
        }
    }
}
