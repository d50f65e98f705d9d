//! # relay-mcp-transport
//!
//! Socket transport for the relay MCP server.
//!
//! This crate provides:
//! - The [`Transport`] seam sessions open connections through
//! - A WebSocket implementation with bounded connect retries
//! - Transport events (connect lifecycle, broadcast traffic)
//! - The HTTP agent-directory client
//! - A scripted mock transport for tests
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on relay-mcp-core and
//! carries no session semantics; it only moves envelopes and reports what
//! happened to the connection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod directory;
pub mod event;
pub mod testing;
pub mod websocket;

// Re-export commonly used types
pub use connection::{ConnectOptions, Connection, Emitter, Transport};
pub use directory::DirectoryClient;
pub use event::TransportEvent;
pub use websocket::WsTransport;
