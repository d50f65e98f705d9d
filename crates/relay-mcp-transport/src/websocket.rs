//! WebSocket transport against the messaging server.
//!
//! Frames are JSON objects of the form `{"event": <name>, "data": <json>}`.
//! Outbound envelopes travel under a single generic event name; inbound
//! frames are mapped onto [`TransportEvent`]s and everything unrecognized
//! is dropped after a debug log.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use relay_mcp_core::{OutboundEnvelope, ReplyEnvelope, Result};

use crate::connection::{Command, ConnectOptions, Connection, Emitter, Transport};
use crate::event::TransportEvent;

/// Event name carrying outbound envelopes.
const OUTBOUND_EVENT: &str = "message";

/// Event name carrying reply envelopes from the server.
const BROADCAST_EVENT: &str = "broadcast";

/// Event name signalling that the server finished processing a message.
const MESSAGE_COMPLETE_EVENT: &str = "message_complete";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport backed by `tokio-tungstenite`.
#[derive(Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Create the transport. Connections are opened per [`Transport::open`]
    /// call; the value itself holds no state.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, opts: ConnectOptions) -> Connection {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(connection_task(opts, cmd_rx, event_tx));
        Connection {
            emitter: Emitter::new(cmd_tx),
            events: event_rx,
        }
    }
}

/// Drives one connection from first dial to final disconnect.
async fn connection_task(
    opts: ConnectOptions,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws = match establish(&opts, &event_tx).await {
        Some(ws) => ws,
        None => return,
    };
    if event_tx.send(TransportEvent::Connected).is_err() {
        return;
    }
    info!("Transport connected: url={}", opts.url);

    let reason = drive(ws, &mut cmd_rx, &event_tx).await;
    info!("Transport disconnected: reason={}", reason);
    let _ = event_tx.send(TransportEvent::Disconnected { reason });
}

/// Dial with a bounded number of attempts and a fixed delay between them.
async fn establish(
    opts: &ConnectOptions,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> Option<WsStream> {
    let attempts = opts.retry_count.max(1);
    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(opts.retry_delay).await;
            let _ = event_tx.send(TransportEvent::ReconnectAttempt(attempt));
        }
        match connect_async(opts.url.as_str()).await {
            Ok((ws, _)) => return Some(ws),
            Err(e) => {
                warn!(
                    "Connection attempt {}/{} failed: {}",
                    attempt, attempts, e
                );
                let _ = event_tx.send(TransportEvent::ConnectError(e.to_string()));
            }
        }
    }
    let _ = event_tx.send(TransportEvent::RetriesExhausted(attempts));
    None
}

/// Pump commands out and frames in until either side ends the connection.
/// Returns the close reason.
async fn drive(
    ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
) -> String {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Emit(envelope)) => {
                    let frame = match encode_frame(&envelope) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Dropping unserializable envelope: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        return format!("send failed: {e}");
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return "closed by client".to_string();
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode_frame(&text) {
                        if event_tx.send(event).is_err() {
                            return "event receiver dropped".to_string();
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return format!("pong failed: {e}");
                    }
                }
                Some(Ok(Message::Close(_))) => return "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("socket error: {e}"),
                None => return "connection closed".to_string(),
            },
        }
    }
}

fn encode_frame(envelope: &OutboundEnvelope) -> Result<String> {
    let data = serde_json::to_value(envelope)?;
    let frame = serde_json::json!({ "event": OUTBOUND_EVENT, "data": data });
    Ok(frame.to_string())
}

fn decode_frame(text: &str) -> Option<TransportEvent> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Unparseable frame: {e}");
            return None;
        }
    };
    match value.get("event").and_then(|e| e.as_str()) {
        Some(BROADCAST_EVENT) => {
            let data = value
                .get("data")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            match serde_json::from_value::<ReplyEnvelope>(data) {
                Ok(reply) => Some(TransportEvent::Broadcast(reply)),
                Err(e) => {
                    warn!("Malformed broadcast payload: {e}");
                    None
                }
            }
        }
        Some(MESSAGE_COMPLETE_EVENT) => Some(TransportEvent::MessageComplete),
        Some(other) => {
            debug!("Ignoring unknown event: {other}");
            None
        }
        None => {
            debug!("Frame without an event name");
            None
        }
    }
}
