//! Protocol error types

use thiserror::Error;

use crate::message::MessageType;

/// Errors that can occur while decoding or encoding envelopes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Envelope has no string `type` tag
    #[error("Missing message type")]
    MissingType,

    /// Envelope carries a type tag that is not part of the protocol
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Type tag is known but the payload does not match its shape
    #[error("Invalid {message_type} payload: {source}")]
    InvalidPayload {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Message type of the offending envelope, when the tag was recognised
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            ProtocolError::InvalidPayload { message_type, .. } => Some(*message_type),
            _ => None,
        }
    }
}
