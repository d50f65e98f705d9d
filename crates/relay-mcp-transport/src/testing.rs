//! Mock transport for exercising sessions without a server.
//!
//! Tests script how each `open` behaves, then drive inbound traffic and
//! inspect outbound envelopes through [`MockConnectionHandle`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use relay_mcp_core::{OutboundEnvelope, ReplyEnvelope};

use crate::connection::{Command, ConnectOptions, Connection, Emitter, Transport};
use crate::event::TransportEvent;

/// How one `open` call should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenScript {
    /// Report `Connected` immediately
    Connect,
    /// Report nothing, leaving the caller to its own deadline
    Silent,
    /// Report `RetriesExhausted` immediately
    Exhaust,
}

/// Handle over one mock connection.
///
/// Outbound envelopes are recorded by a forwarding task, so tests should
/// yield to the runtime (or await any session call) before inspecting
/// [`emitted`](Self::emitted) or [`was_closed`](Self::was_closed).
pub struct MockConnectionHandle {
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    buffer: Arc<Mutex<Vec<OutboundEnvelope>>>,
    closed: Arc<AtomicBool>,
    opts: ConnectOptions,
}

impl MockConnectionHandle {
    /// Inject a transport event as if the server produced it.
    pub fn send_event(&self, event: TransportEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Inject a broadcast reply envelope.
    pub fn broadcast(&self, reply: ReplyEnvelope) {
        self.send_event(TransportEvent::Broadcast(reply));
    }

    /// Report the connection as dropped.
    pub fn disconnect(&self, reason: &str) {
        self.send_event(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Drain every envelope emitted since the last call.
    pub fn emitted(&self) -> Vec<OutboundEnvelope> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }

    /// True once the session asked this connection to close.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Options the connection was opened with.
    pub fn options(&self) -> &ConnectOptions {
        &self.opts
    }
}

/// Scripted transport: records opens and hands out inspectable connections.
///
/// Opens beyond the scripted list behave as [`OpenScript::Connect`]. A
/// close command makes the connection report `Disconnected` the way the
/// real transport does, unless [`MockTransport::without_auto_disconnect`]
/// is used.
pub struct MockTransport {
    scripts: Mutex<VecDeque<OpenScript>>,
    handles: Mutex<Vec<Arc<MockConnectionHandle>>>,
    open_count: AtomicUsize,
    auto_disconnect: bool,
}

impl MockTransport {
    /// Transport where every open connects immediately.
    pub fn new() -> Self {
        Self::with_scripts([])
    }

    /// Transport with per-open behavior scripted up front.
    pub fn with_scripts(scripts: impl IntoIterator<Item = OpenScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            handles: Mutex::new(Vec::new()),
            open_count: AtomicUsize::new(0),
            auto_disconnect: true,
        }
    }

    /// Keep connections from acknowledging close with a disconnect event.
    pub fn without_auto_disconnect(mut self) -> Self {
        self.auto_disconnect = false;
        self
    }

    /// Queue behavior for a later open.
    pub fn push_script(&self, script: OpenScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Number of connections opened so far.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Handle for the `index`-th open (0-based).
    pub fn handle(&self, index: usize) -> Arc<MockConnectionHandle> {
        self.handles.lock().unwrap()[index].clone()
    }

    /// Handle for the most recent open.
    pub fn last_handle(&self) -> Arc<MockConnectionHandle> {
        self.handles
            .lock()
            .unwrap()
            .last()
            .expect("no connection opened yet")
            .clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, opts: ConnectOptions) -> Connection {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OpenScript::Connect);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let handle = Arc::new(MockConnectionHandle {
            event_tx: event_tx.clone(),
            buffer: Arc::clone(&buffer),
            closed: Arc::clone(&closed),
            opts: opts.clone(),
        });

        match script {
            OpenScript::Connect => {
                let _ = event_tx.send(TransportEvent::Connected);
            }
            OpenScript::Silent => {}
            OpenScript::Exhaust => {
                let _ = event_tx.send(TransportEvent::RetriesExhausted(opts.retry_count));
            }
        }

        let auto_disconnect = self.auto_disconnect;
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    Command::Emit(envelope) => buffer.lock().unwrap().push(envelope),
                    Command::Close => {
                        closed.store(true, Ordering::SeqCst);
                        if auto_disconnect {
                            let _ = event_tx.send(TransportEvent::Disconnected {
                                reason: "closed by client".to_string(),
                            });
                        }
                        break;
                    }
                }
            }
        });

        self.handles.lock().unwrap().push(handle);
        Connection {
            emitter: Emitter::new(cmd_tx),
            events: event_rx,
        }
    }
}
