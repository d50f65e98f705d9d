//! # relay-mcp-session
//!
//! Session engine for the relay bridge.
//!
//! This crate provides:
//! - The bridge session: lifecycle, channel membership, reconfiguration
//! - Reply correlation between sends and inbound broadcasts
//! - Event fan-out to session subscribers
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on relay-mcp-core and
//! relay-mcp-transport and drives one logical connection per session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod correlation;
pub mod session;

// Re-export commonly used types
pub use correlation::ReplyRouter;
pub use session::{AwaitOutcome, BridgeSession, ReconfigureOutcome, StatusReport};
