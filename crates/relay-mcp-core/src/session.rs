//! Session state and event types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::envelope::ReplyEnvelope;

/// Connection lifecycle state of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No live transport
    Disconnected,
    /// Transport opening, outcome pending
    Connecting,
    /// Transport live, sends possible
    Connected,
    /// Last connect attempt failed terminally
    Error,
}

impl ConnectionState {
    /// True only for the fully established state.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Notification fanned out to session subscribers.
///
/// Delivery is broadcast-based and non-blocking; a lagging subscriber is
/// dropped rather than allowed to stall the others.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection state moved; never emitted for no-op transitions
    StateChanged {
        /// State before the transition
        from: ConnectionState,
        /// State after the transition
        to: ConnectionState,
    },
    /// An inbound envelope arrived (valid or not)
    MessageReceived(ReplyEnvelope),
    /// A connection-level error was observed
    Error {
        /// Human-readable description
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
        let state: ConnectionState = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(state, ConnectionState::Error);
    }

    #[test]
    fn test_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Error.is_connected());
    }

    #[test]
    fn test_event_clone() {
        let event = SessionEvent::StateChanged {
            from: ConnectionState::Disconnected,
            to: ConnectionState::Connecting,
        };
        let cloned = event.clone();
        assert!(matches!(
            cloned,
            SessionEvent::StateChanged {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connecting,
            }
        ));
    }
}
