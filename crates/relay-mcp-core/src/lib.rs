//! # relay-mcp-core
//!
//! Core types for the relay MCP server.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other relay-mcp crates. It provides:
//!
//! - Session configuration and reconfiguration patches
//! - Wire envelope types (join/send payloads, reply envelopes)
//! - Connection state and session events
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other relay-mcp crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all modules
pub mod config;
pub mod envelope;
pub mod error;
pub mod session;

// Re-export commonly used types
pub use config::{
    SessionConfig, SessionConfigPatch, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RESPONSE_TIMEOUT_MS,
    DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS, SWITCH_GRACE_DELAY_MS,
};
pub use envelope::{
    new_correlation_id, JoinPayload, OutboundEnvelope, ReplyEnvelope, SendPayload, TargetInfo,
    MESSAGE_SOURCE,
};
pub use error::{Error, Result};
pub use session::{ConnectionState, SessionEvent};
