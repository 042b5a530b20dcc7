//! Command execution boundary
//!
//! Turning a slide command into a local key press is platform specific and
//! lives outside this crate. The agent only needs something implementing
//! [`CommandExecutor`].

use sr_protocol::SlideCommand;

/// Executes slide commands against the local environment
pub trait CommandExecutor: Send + Sync {
    /// Perform one command
    fn execute(&self, command: SlideCommand);
}

/// Executor that only logs what it would do
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

impl CommandExecutor for LoggingExecutor {
    fn execute(&self, command: SlideCommand) {
        match command {
            SlideCommand::Next => tracing::info!("Executing NEXT (right arrow)"),
            SlideCommand::Prev => tracing::info!("Executing PREV (left arrow)"),
        }
    }
}

/// Parse a raw command string and run it.
///
/// Empty and unrecognised strings are logged and ignored. Returns the
/// command that was executed, if any.
pub fn dispatch(executor: &dyn CommandExecutor, raw: &str) -> Option<SlideCommand> {
    if raw.is_empty() {
        tracing::warn!("Received empty command; ignoring");
        return None;
    }

    match raw.parse::<SlideCommand>() {
        Ok(command) => {
            executor.execute(command);
            Some(command)
        }
        Err(e) => {
            tracing::warn!("{}; ignoring", e);
            None
        }
    }
}
