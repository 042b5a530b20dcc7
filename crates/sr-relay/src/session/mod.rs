//! Session management

mod cleanup;
mod code;
mod manager;

pub use cleanup::{CleanupScheduler, SWEEP_INTERVAL};
pub use code::SessionCodeGenerator;
pub use manager::{ControllerAttachment, SessionEntry, SessionManager};
