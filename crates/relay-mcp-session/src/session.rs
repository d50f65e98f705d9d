//! Bridge session over one logical connection to the messaging server.
//!
//! The session owns the connection lifecycle, channel membership, and the
//! pairing of outbound sends with inbound replies. All shared state lives
//! behind one mutex; a router task per connection translates transport
//! events into state changes and reply deliveries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use relay_mcp_core::{
    new_correlation_id, ConnectionState, Error, JoinPayload, OutboundEnvelope, ReplyEnvelope,
    Result, SendPayload, SessionConfig, SessionConfigPatch, SessionEvent, TargetInfo,
    MESSAGE_SOURCE, SWITCH_GRACE_DELAY_MS,
};
use relay_mcp_transport::{
    ConnectOptions, Connection, DirectoryClient, Emitter, Transport, TransportEvent,
};

use crate::correlation::ReplyRouter;

/// Capacity of the subscriber broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Poll interval while waiting for a teardown to settle.
const DISCONNECT_POLL_MS: u64 = 20;

/// Poll attempts before a teardown proceeds without settling.
const DISCONNECT_WAIT_STEPS: u32 = 100;

/// Outcome of a correlated send.
///
/// A reply that never arrives is reported in-band: `reply` is `None` and
/// `error` carries the timeout description. Transport and session failures
/// surface as errors instead.
#[derive(Debug, Clone)]
pub struct AwaitOutcome {
    /// The reply that settled the wait, if one arrived in time.
    pub reply: Option<ReplyEnvelope>,
    /// Timeout description when no reply arrived.
    pub error: Option<String>,
    /// Time from send to settle, in milliseconds.
    pub elapsed_ms: u64,
}

impl AwaitOutcome {
    fn replied(reply: ReplyEnvelope, elapsed: Duration) -> Self {
        Self {
            reply: Some(reply),
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    fn timed_out(target: &str, waited_ms: u64, elapsed: Duration) -> Self {
        let error = Error::ResponseTimeout {
            target: target.to_string(),
            waited_ms,
        };
        Self {
            reply: None,
            error: Some(error.to_string()),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// True when the wait expired without a reply.
    pub fn is_timeout(&self) -> bool {
        self.reply.is_none()
    }
}

/// What a reconfiguration did to the live session.
#[derive(Debug, Clone)]
pub struct ReconfigureOutcome {
    /// Configuration after the merge.
    pub config: SessionConfig,
    /// Connection state after any teardown or reconnect.
    pub state: ConnectionState,
    /// True when an identity field changed.
    pub critical: bool,
    /// True when the session tore down and reconnected.
    pub reconnected: bool,
}

/// Point-in-time view of session internals.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Current connection state
    pub state: ConnectionState,
    /// True once the channel join envelope went out on this connection
    pub joined: bool,
    /// Replies queued with no waiter to take them
    pub queued_replies: usize,
    /// Waiters with no reply yet
    pub outstanding_waiters: usize,
    /// Duration of the last successful connect, in milliseconds
    pub last_connect_ms: Option<u64>,
}

/// State shared between the session API and its router task.
struct Shared {
    config: SessionConfig,
    state: ConnectionState,
    joined: bool,
    /// Bumped for every connection attempt; events from older connections
    /// are discarded.
    epoch: u64,
    emitter: Option<Emitter>,
    connect_tx: Option<oneshot::Sender<Result<()>>>,
    router: ReplyRouter,
    router_task: Option<JoinHandle<()>>,
    last_connect_ms: Option<u64>,
}

impl Shared {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            joined: false,
            epoch: 0,
            emitter: None,
            connect_tx: None,
            router: ReplyRouter::new(),
            router_task: None,
            last_connect_ms: None,
        }
    }
}

/// A persistent session bridging local callers to one remote target agent.
///
/// The session is cheap to share behind an [`Arc`]; every method takes
/// `&self`. Connection management is mostly implicit: `send` establishes
/// and joins on demand, and reconfiguration tears down and reconnects when
/// identity fields change.
pub struct BridgeSession {
    transport: Arc<dyn Transport>,
    directory: DirectoryClient,
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<SessionEvent>,
}

impl BridgeSession {
    /// Create a session for `config`, validating it first.
    ///
    /// No connection is opened until [`connect`](Self::connect) or a send.
    pub fn new(config: SessionConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating bridge session: server='{}', target='{}'",
            config.server_url, config.target_id
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            transport,
            directory: DirectoryClient::new(),
            shared: Arc::new(Mutex::new(Shared::new(config))),
            events,
        })
    }

    /// Subscribe to session events.
    ///
    /// Each subscriber gets an independent receiver; a dropped or lagging
    /// receiver never affects the others.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().unwrap().state
    }

    /// Copy of the current configuration.
    pub fn config(&self) -> SessionConfig {
        self.shared.lock().unwrap().config.clone()
    }

    /// Consistent snapshot of state, membership, and correlation counts.
    pub fn status(&self) -> StatusReport {
        let shared = self.shared.lock().unwrap();
        StatusReport {
            state: shared.state,
            joined: shared.joined,
            queued_replies: shared.router.queued(),
            outstanding_waiters: shared.router.waiting(),
            last_connect_ms: shared.last_connect_ms,
        }
    }

    /// Establish the connection and join the configured channel.
    ///
    /// Requires target and channel to be set. Returns `Ok` immediately when
    /// already connected. The attempt races transport establishment against
    /// the configured connect timeout; on timeout the state is left at
    /// [`ConnectionState::Error`] and the half-open connection is dropped.
    /// A concurrent connect supersedes this one.
    pub async fn connect(&self) -> Result<()> {
        let start = Instant::now();
        let (rx, opts, epoch, timeout_ms) = {
            let mut shared = self.shared.lock().unwrap();
            shared.config.validate_identity()?;
            if !shared.config.has_routable_target() {
                return Err(Error::Config(
                    "target_id and channel_id must be set before connecting".to_string(),
                ));
            }
            if shared.config.server_url.is_empty() {
                return Err(Error::Config("server_url is not set".to_string()));
            }
            if shared.state.is_connected() {
                debug!("Connect requested while already connected");
                return Ok(());
            }
            shared.epoch += 1;
            let epoch = shared.epoch;
            transition(&mut shared, &self.events, ConnectionState::Connecting);
            let (tx, rx) = oneshot::channel();
            shared.connect_tx = Some(tx);
            let opts = ConnectOptions::new(shared.config.ws_url());
            (rx, opts, epoch, shared.config.connect_timeout_ms)
        };

        info!("Connecting: url={}, budget={}ms", opts.url, timeout_ms);
        let Connection { emitter, events } = self.transport.open(opts).await;
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.epoch != epoch {
                emitter.close();
                return Err(Error::SessionReset(
                    "connect superseded by a newer attempt".to_string(),
                ));
            }
            shared.emitter = Some(emitter);
        }
        self.spawn_router(events, epoch);

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(Ok(()))) => {
                let elapsed = start.elapsed().as_millis() as u64;
                let target = {
                    let mut shared = self.shared.lock().unwrap();
                    shared.last_connect_ms = Some(elapsed);
                    shared.config.target_id.clone()
                };
                info!("Session connected: target={}, elapsed={}ms", target, elapsed);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::SessionReset(
                "connect superseded by a newer attempt".to_string(),
            )),
            Err(_) => {
                let mut shared = self.shared.lock().unwrap();
                if shared.epoch == epoch {
                    shared.connect_tx = None;
                    shared.epoch += 1;
                    if let Some(emitter) = shared.emitter.take() {
                        emitter.close();
                    }
                    transition(&mut shared, &self.events, ConnectionState::Error);
                }
                warn!("Connect timed out after {}ms", timeout_ms);
                Err(Error::ConnectTimeout(timeout_ms))
            }
        }
    }

    /// Ask the transport to close.
    ///
    /// The state moves to [`ConnectionState::Disconnected`] once the
    /// transport reports the close, not synchronously. Disconnecting with
    /// no open transport is quiet.
    pub fn disconnect(&self) {
        let emitter = self.shared.lock().unwrap().emitter.clone();
        match emitter {
            Some(emitter) => {
                info!("Closing transport connection");
                emitter.close();
            }
            None => debug!("Disconnect requested with no open transport"),
        }
    }

    /// Send `text` to the configured target.
    ///
    /// Connects and joins on demand when the session is down. Returns the
    /// correlation id stamped on the outbound envelope. The server does not
    /// echo the id back on replies; it exists for log correlation.
    pub async fn send(&self, text: &str) -> Result<String> {
        if !self.state().is_connected() {
            debug!("Send requested while disconnected, connecting first");
            self.connect().await?;
        }
        let mut shared = self.shared.lock().unwrap();
        if !shared.state.is_connected() {
            return Err(Error::NotConnected);
        }
        join_channel(&mut shared);
        if !shared.joined {
            return Err(Error::Transport("channel join failed".to_string()));
        }
        let correlation_id = new_correlation_id();
        let envelope = OutboundEnvelope::Send(SendPayload {
            sender_id: shared.config.user_id.clone(),
            text: text.to_string(),
            channel_id: shared.config.channel_id.clone(),
            target_id: shared.config.target_id.clone(),
            world_id: shared.config.world_id.clone(),
            correlation_id: correlation_id.clone(),
            source: MESSAGE_SOURCE.to_string(),
        });
        match &shared.emitter {
            Some(emitter) => emitter.emit(envelope)?,
            None => return Err(Error::NotConnected),
        }
        info!(
            "Message sent: target={}, correlation_id={}, length={}",
            shared.config.target_id,
            correlation_id,
            text.len()
        );
        Ok(correlation_id)
    }

    /// Send `text` and wait for the next valid reply.
    ///
    /// The waiter is registered before the send goes out, so a reply cannot
    /// slip through between the two. Expiry is soft: the outcome carries an
    /// error description instead of failing the call. Replies pair with
    /// waiters in arrival order, so under concurrent sends a reply may
    /// settle a different caller's wait.
    pub async fn send_and_await(&self, text: &str) -> Result<AwaitOutcome> {
        if !self.state().is_connected() {
            self.connect().await?;
        }
        let start = Instant::now();
        let (waiter_id, mut rx, target, budget_ms) = {
            let mut shared = self.shared.lock().unwrap();
            let (id, rx) = shared.router.register();
            (
                id,
                rx,
                shared.config.target_id.clone(),
                shared.config.response_timeout_ms,
            )
        };
        if let Err(e) = self.send(text).await {
            self.shared.lock().unwrap().router.remove(waiter_id);
            return Err(e);
        }
        match tokio::time::timeout(Duration::from_millis(budget_ms), &mut rx).await {
            Ok(Ok(Ok(reply))) => Ok(AwaitOutcome::replied(reply, start.elapsed())),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::SessionReset("reply channel dropped".to_string())),
            Err(_) => {
                let removed = self.shared.lock().unwrap().router.remove(waiter_id);
                if !removed {
                    // A reply settled the waiter while the timer fired.
                    if let Ok(Ok(reply)) = rx.try_recv() {
                        return Ok(AwaitOutcome::replied(reply, start.elapsed()));
                    }
                }
                warn!("No reply from {} within {}ms", target, budget_ms);
                Ok(AwaitOutcome::timed_out(&target, budget_ms, start.elapsed()))
            }
        }
    }

    /// Wait for the next valid reply without sending anything.
    ///
    /// Pops a queued reply immediately when one is available. `timeout_ms`
    /// overrides the configured response timeout. Unlike
    /// [`send_and_await`](Self::send_and_await), expiry here is a hard
    /// failure; the expired waiter is withdrawn so a late reply queues for
    /// the next caller instead.
    pub async fn wait_for_next(&self, timeout_ms: Option<u64>) -> Result<ReplyEnvelope> {
        let (waiter_id, mut rx, target, budget_ms) = {
            let mut shared = self.shared.lock().unwrap();
            if let Some(reply) = shared.router.pop_queued() {
                debug!("Returning queued reply: sender={}", reply.sender_id);
                return Ok(reply);
            }
            let (id, rx) = shared.router.register();
            let budget = timeout_ms.unwrap_or(shared.config.response_timeout_ms);
            (id, rx, shared.config.target_id.clone(), budget)
        };
        match tokio::time::timeout(Duration::from_millis(budget_ms), &mut rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::SessionReset("reply channel dropped".to_string())),
            Err(_) => {
                let removed = self.shared.lock().unwrap().router.remove(waiter_id);
                if !removed {
                    if let Ok(Ok(reply)) = rx.try_recv() {
                        return Ok(reply);
                    }
                }
                Err(Error::ResponseTimeout {
                    target,
                    waited_ms: budget_ms,
                })
            }
        }
    }

    /// Point the session at a different target agent.
    ///
    /// Target and channel must be equal. Tears down the live connection,
    /// clears correlation state, waits a short grace period for the server
    /// to release the old membership, then reconnects with the new
    /// identity.
    pub async fn switch_target(&self, target_id: &str, channel_id: &str) -> Result<()> {
        if target_id != channel_id {
            return Err(Error::TargetChannelMismatch {
                target: target_id.to_string(),
                channel: channel_id.to_string(),
            });
        }
        if target_id.is_empty() {
            return Err(Error::Config("target_id must not be empty".to_string()));
        }
        let previous = self.shared.lock().unwrap().config.target_id.clone();
        info!("Switching target: '{}' → '{}'", previous, target_id);
        self.teardown("target switched").await;
        tokio::time::sleep(Duration::from_millis(SWITCH_GRACE_DELAY_MS)).await;
        {
            let mut shared = self.shared.lock().unwrap();
            shared.config.target_id = target_id.to_string();
            shared.config.channel_id = channel_id.to_string();
        }
        self.connect().await
    }

    /// Merge a configuration patch into the session.
    ///
    /// The merged configuration is validated before anything is applied; a
    /// rejected patch leaves the session untouched. A critical change (any
    /// identity field) tears the connection down and fails outstanding
    /// waiters; the session then reconnects only when every identity field
    /// is populated afterwards.
    pub async fn set_config(&self, patch: SessionConfigPatch) -> Result<ReconfigureOutcome> {
        if patch.is_empty() {
            let shared = self.shared.lock().unwrap();
            return Ok(ReconfigureOutcome {
                config: shared.config.clone(),
                state: shared.state,
                critical: false,
                reconnected: false,
            });
        }
        let (critical, identity_complete) = {
            let mut shared = self.shared.lock().unwrap();
            let mut candidate = shared.config.clone();
            let critical = candidate.apply(&patch);
            candidate.validate()?;
            shared.config = candidate;
            (critical, shared.config.is_identity_complete())
        };
        info!("Reconfiguring session: critical={}", critical);
        if !critical {
            let shared = self.shared.lock().unwrap();
            return Ok(ReconfigureOutcome {
                config: shared.config.clone(),
                state: shared.state,
                critical,
                reconnected: false,
            });
        }
        self.teardown("reconfigured").await;
        let reconnected = if identity_complete {
            info!("Identity complete after critical change, reconnecting");
            self.connect().await?;
            true
        } else {
            info!("Identity incomplete after critical change, staying disconnected");
            false
        };
        let shared = self.shared.lock().unwrap();
        Ok(ReconfigureOutcome {
            config: shared.config.clone(),
            state: shared.state,
            critical,
            reconnected,
        })
    }

    /// List the agents the server's directory currently advertises.
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        let server_url = self.shared.lock().unwrap().config.server_url.clone();
        if server_url.is_empty() {
            return Err(Error::Config("server_url is not set".to_string()));
        }
        self.directory.list_targets(&server_url).await
    }

    /// Close the connection, fail waiters with `reason`, and wait for the
    /// state to settle out of the live states.
    async fn teardown(&self, reason: &str) {
        let emitter = {
            let mut shared = self.shared.lock().unwrap();
            shared.joined = false;
            let (dropped, failed) = shared.router.clear(reason);
            if dropped > 0 || failed > 0 {
                info!(
                    "Cleared correlation state: queued={}, waiters={} ({})",
                    dropped, failed, reason
                );
            }
            shared.emitter.clone()
        };
        if let Some(emitter) = emitter {
            emitter.close();
            self.wait_until_disconnected().await;
        }
    }

    async fn wait_until_disconnected(&self) {
        for _ in 0..DISCONNECT_WAIT_STEPS {
            {
                let shared = self.shared.lock().unwrap();
                if !matches!(
                    shared.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(DISCONNECT_POLL_MS)).await;
        }
        warn!(
            "Transport did not settle within {}ms, proceeding",
            u64::from(DISCONNECT_WAIT_STEPS) * DISCONNECT_POLL_MS
        );
    }

    fn spawn_router(&self, events: mpsc::UnboundedReceiver<TransportEvent>, epoch: u64) {
        let shared = Arc::clone(&self.shared);
        let subscribers = self.events.clone();
        let task = tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.recv().await {
                if !route_event(&shared, &subscribers, epoch, event) {
                    break;
                }
            }
            debug!("Event router stopped: epoch={}", epoch);
        });
        // Superseded routers exit on their own once they see a stale epoch.
        self.shared.lock().unwrap().router_task = Some(task);
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if let Ok(mut shared) = self.shared.lock() {
            if let Some(task) = shared.router_task.take() {
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock().unwrap();
        f.debug_struct("BridgeSession")
            .field("state", &shared.state)
            .field("target", &shared.config.target_id)
            .field("joined", &shared.joined)
            .finish()
    }
}

/// Move the state machine, notifying subscribers. No-op transitions are
/// suppressed.
fn transition(shared: &mut Shared, events: &broadcast::Sender<SessionEvent>, to: ConnectionState) {
    if shared.state == to {
        return;
    }
    let from = shared.state;
    shared.state = to;
    info!("Session state changed: {} → {}", from, to);
    let _ = events.send(SessionEvent::StateChanged { from, to });
}

/// Emit the channel join envelope once per connection.
fn join_channel(shared: &mut Shared) {
    if shared.joined || !shared.state.is_connected() || !shared.config.has_routable_target() {
        return;
    }
    let Some(emitter) = shared.emitter.clone() else {
        return;
    };
    let envelope = OutboundEnvelope::Join(JoinPayload {
        channel_id: shared.config.channel_id.clone(),
        target_ids: vec![shared.config.target_id.clone()],
    });
    match emitter.emit(envelope) {
        Ok(()) => {
            shared.joined = true;
            info!("Joined channel: {}", shared.config.channel_id);
        }
        Err(e) => warn!("Channel join failed: {}", e),
    }
}

/// A reply is routable when it carries non-blank text and came from the
/// configured target.
fn is_valid_reply(config: &SessionConfig, reply: &ReplyEnvelope) -> bool {
    reply.has_text() && reply.sender_id == config.target_id
}

/// Apply one transport event to the session. Returns false when the router
/// for this connection should stop.
fn route_event(
    shared: &Mutex<Shared>,
    events: &broadcast::Sender<SessionEvent>,
    epoch: u64,
    event: TransportEvent,
) -> bool {
    let mut shared = shared.lock().unwrap();
    if shared.epoch != epoch {
        debug!("Dropping event from superseded connection: epoch={}", epoch);
        return false;
    }
    match event {
        TransportEvent::Connected => {
            transition(&mut shared, events, ConnectionState::Connected);
            join_channel(&mut shared);
            if let Some(tx) = shared.connect_tx.take() {
                let _ = tx.send(Ok(()));
            }
            true
        }
        TransportEvent::ConnectError(reason) => {
            warn!("Connect attempt failed: {}", reason);
            let _ = events.send(SessionEvent::Error { message: reason });
            true
        }
        TransportEvent::ReconnectAttempt(attempt) => {
            info!("Retrying connection: attempt={}", attempt);
            true
        }
        TransportEvent::RetriesExhausted(attempts) => {
            shared.emitter = None;
            transition(&mut shared, events, ConnectionState::Error);
            let _ = events.send(SessionEvent::Error {
                message: format!("connection failed after {attempts} attempts"),
            });
            if let Some(tx) = shared.connect_tx.take() {
                let _ = tx.send(Err(Error::RetriesExhausted(attempts)));
            }
            false
        }
        TransportEvent::Broadcast(reply) => {
            // Observers see every envelope; only valid replies are routed.
            let _ = events.send(SessionEvent::MessageReceived(reply.clone()));
            if is_valid_reply(&shared.config, &reply) {
                debug!(
                    "Routing reply: sender={}, length={}",
                    reply.sender_id,
                    reply.text.len()
                );
                shared.router.deliver(reply);
            } else {
                debug!(
                    "Ignoring envelope: sender={}, target={}, has_text={}",
                    reply.sender_id,
                    shared.config.target_id,
                    reply.has_text()
                );
            }
            true
        }
        TransportEvent::MessageComplete => {
            debug!("Server finished processing a message");
            true
        }
        TransportEvent::Disconnected { reason } => {
            info!("Transport disconnected: {}", reason);
            shared.joined = false;
            shared.emitter = None;
            let (dropped, failed) = shared.router.clear("disconnected");
            if dropped > 0 || failed > 0 {
                info!(
                    "Cleared correlation state: queued={}, waiters={} (disconnected)",
                    dropped, failed
                );
            }
            transition(&mut shared, events, ConnectionState::Disconnected);
            if let Some(tx) = shared.connect_tx.take() {
                let _ = tx.send(Err(Error::Transport(format!(
                    "disconnected during connect: {reason}"
                ))));
            }
            false
        }
    }
}
