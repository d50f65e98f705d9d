//! Events reported by a transport connection.

use relay_mcp_core::ReplyEnvelope;

/// Lifecycle and traffic events emitted by a connection task.
///
/// A connection emits either `Connected` followed eventually by exactly one
/// `Disconnected`, or attempt errors followed by `RetriesExhausted`.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The socket is established and ready for traffic
    Connected,
    /// One connection attempt failed; retries may follow
    ConnectError(String),
    /// A retry is about to run (attempt number, 1-based)
    ReconnectAttempt(u32),
    /// Every attempt failed; the connection task has ended
    RetriesExhausted(u32),
    /// An inbound reply envelope arrived on the broadcast event
    Broadcast(ReplyEnvelope),
    /// The server signalled that a message finished processing
    MessageComplete,
    /// The connection ended; no further events will follow
    Disconnected {
        /// Close reason, best effort
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_debug_format() {
        let event = TransportEvent::Disconnected {
            reason: "closed by server".to_string(),
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("closed by server"));
    }

    #[test]
    fn test_broadcast_carries_envelope() {
        let event = TransportEvent::Broadcast(ReplyEnvelope::new("agent-1", "hi"));
        match event {
            TransportEvent::Broadcast(reply) => assert_eq!(reply.sender_id, "agent-1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
