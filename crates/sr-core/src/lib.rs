//! sr-core: Shared types and configuration for slide-remote
//!
//! This crate provides the identity types and configuration structures
//! used by both the relay and the agent.

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::AgentId;
