//! Connection handles and the transport seam.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use relay_mcp_core::{
    Error, OutboundEnvelope, Result, DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS,
};

use crate::event::TransportEvent;

/// Options controlling how a connection is established.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// WebSocket endpoint to dial
    pub url: String,
    /// Connection attempts before giving up
    pub retry_count: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl ConnectOptions {
    /// Options for `url` with the default retry budget.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Commands accepted by a live connection task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Serialize and send an envelope
    Emit(OutboundEnvelope),
    /// Close the socket politely
    Close,
}

/// Cheap cloneable handle for pushing envelopes onto a connection.
///
/// Emitting never blocks; envelopes queue until the connection task picks
/// them up. Once the connection has ended every emit fails.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<Command>,
}

impl Emitter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Queue an envelope for delivery.
    pub fn emit(&self, envelope: OutboundEnvelope) -> Result<()> {
        self.tx
            .send(Command::Emit(envelope))
            .map_err(|_| Error::Transport("connection closed".to_string()))
    }

    /// Ask the connection to close. Closing an already-dead connection is
    /// not an error.
    pub fn close(&self) {
        let _ = self.tx.send(Command::Close);
    }
}

/// An establishing or live connection: emit handle plus event stream.
pub struct Connection {
    /// Handle for outbound envelopes
    pub emitter: Emitter,
    /// Stream of lifecycle and traffic events
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Seam for opening connections to the messaging server.
///
/// `open` returns promptly; establishment runs in the background and
/// reports progress through the returned event stream, so callers can race
/// the outcome against their own deadline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin establishing a connection with the given options.
    async fn open(&self, opts: ConnectOptions) -> Connection;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_defaults() {
        let opts = ConnectOptions::new("ws://localhost:3000/ws");
        assert_eq!(opts.url, "ws://localhost:3000/ws");
        assert_eq!(opts.retry_count, DEFAULT_RETRY_COUNT);
        assert_eq!(opts.retry_delay, Duration::from_millis(DEFAULT_RETRY_DELAY_MS));
    }

    #[tokio::test]
    async fn test_emitter_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Emitter::new(tx);
        drop(rx);

        let envelope = OutboundEnvelope::Join(relay_mcp_core::JoinPayload {
            channel_id: "agent-1".to_string(),
            target_ids: vec!["agent-1".to_string()],
        });
        assert!(emitter.emit(envelope).is_err());
        // Close after the fact must stay silent
        emitter.close();
    }
}
