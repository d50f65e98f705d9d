//! Reply correlation between outbound sends and inbound broadcasts.
//!
//! The platform does not echo correlation ids back on replies, so pairing
//! is strictly arrival-ordered: the oldest queued reply settles the oldest
//! outstanding waiter. Under concurrent sends a reply can therefore settle
//! a waiter whose send it does not answer. That is inherent to the wire
//! protocol; callers treat replies as a conversation stream rather than
//! tagged responses.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use relay_mcp_core::{Error, ReplyEnvelope, Result};

/// One caller waiting for the next valid reply.
struct Waiter {
    id: u64,
    tx: oneshot::Sender<Result<ReplyEnvelope>>,
    registered_at: Instant,
}

/// FIFO pairing of inbound replies with outstanding waiters.
///
/// Replies that arrive with no waiter outstanding are queued; waiters that
/// register with no reply queued wait on a oneshot channel. Either side
/// drains the other in arrival order.
pub struct ReplyRouter {
    queue: VecDeque<ReplyEnvelope>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

impl ReplyRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            waiters: VecDeque::new(),
            next_waiter_id: 0,
        }
    }

    /// Hand a validated reply to the router.
    ///
    /// Settles the oldest outstanding waiter, or queues the reply when no
    /// waiter is outstanding.
    pub fn deliver(&mut self, reply: ReplyEnvelope) {
        self.queue.push_back(reply);
        self.drain();
    }

    /// Pop the oldest queued reply without registering a waiter.
    pub fn pop_queued(&mut self) -> Option<ReplyEnvelope> {
        self.queue.pop_front()
    }

    /// Register a waiter for the next reply.
    ///
    /// Returns the waiter id (for [`remove`](Self::remove)) and the channel
    /// the reply arrives on. If replies are already queued, the waiter is
    /// settled before this returns.
    pub fn register(&mut self) -> (u64, oneshot::Receiver<Result<ReplyEnvelope>>) {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(Waiter {
            id,
            tx,
            registered_at: Instant::now(),
        });
        self.drain();
        (id, rx)
    }

    /// Withdraw a waiter that gave up.
    ///
    /// Returns false when the waiter is no longer outstanding, which means
    /// a reply settled it concurrently.
    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|waiter| waiter.id != id);
        self.waiters.len() != before
    }

    /// Drop every queued reply and fail every waiter with a reset error.
    ///
    /// Returns the number of replies dropped and waiters failed.
    pub fn clear(&mut self, reason: &str) -> (usize, usize) {
        let dropped = self.queue.len();
        self.queue.clear();
        let failed = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            let _ = waiter
                .tx
                .send(Err(Error::SessionReset(reason.to_string())));
        }
        (dropped, failed)
    }

    /// Number of replies queued with no waiter to take them.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of waiters with no reply yet.
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    fn drain(&mut self) {
        while !self.queue.is_empty() && !self.waiters.is_empty() {
            let waiter = match self.waiters.pop_front() {
                Some(waiter) => waiter,
                None => break,
            };
            let reply = match self.queue.pop_front() {
                Some(reply) => reply,
                None => break,
            };
            match waiter.tx.send(Ok(reply)) {
                Ok(()) => debug!(
                    "Reply settled waiter: id={}, waited={}ms",
                    waiter.id,
                    waiter.registered_at.elapsed().as_millis()
                ),
                Err(returned) => {
                    // Caller dropped its receiver; the reply goes back to
                    // the front for the next taker.
                    if let Ok(reply) = returned {
                        self.queue.push_front(reply);
                    }
                }
            }
        }
    }
}

impl Default for ReplyRouter {
    fn default() -> Self {
        Self::new()
    }
}
