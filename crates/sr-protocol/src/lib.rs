//! sr-protocol: Wire protocol for slide-remote
//!
//! This crate defines the JSON envelopes exchanged over the agent and
//! controller WebSocket channels, the session code type, and the close
//! signals the relay uses to terminate a channel.

pub mod close;
pub mod codec;
pub mod error;
pub mod message;
pub mod session;

pub use close::CloseSignal;
pub use error::ProtocolError;
pub use message::{CommandMessage, Message, MessageType, SlideCommand, PROTOCOL_VERSION};
pub use session::{SessionCode, SESSION_CODE_LENGTH};
