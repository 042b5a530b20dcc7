//! JSON text-frame codec
//!
//! Decoding is two-step so that an unknown `type` tag surfaces as
//! [`ProtocolError::UnknownMessageType`] rather than a generic parse failure,
//! and a known tag with a bad body surfaces as
//! [`ProtocolError::InvalidPayload`].

use serde_json::Value;

use crate::error::ProtocolError;
use crate::message::{Message, MessageType};

impl Message {
    /// Decode a single text frame
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

        let message_type = {
            let tag = value
                .get("type")
                .and_then(Value::as_str)
                .ok_or(ProtocolError::MissingType)?;
            MessageType::from_tag(tag)
                .ok_or_else(|| ProtocolError::UnknownMessageType(tag.to_string()))?
        };

        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidPayload { message_type, source })
    }

    /// Encode into a single text frame
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
