//! Correlation of replies with the callers waiting for them.
//!
//! Each in-flight request id owns a single-slot channel. The slot is created
//! by whichever side arrives first: the reader thread pushing a reply or the
//! caller popping it. The caller removes the slot once it has its answer, so
//! the map never holds more than the number of outstanding requests.
//!
//! Closing the router wakes every waiter with [`ClientError::Disconnected`].
//! Replies that were already routed stay deliverable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{trace, warn};

use crate::error::ClientError;
use crate::protocol::Reply;

const ROUTER_TARGET: &str = "mpv_ipc::router";

#[derive(Debug)]
struct Slot {
    sender: Option<Sender<Reply>>,
    receiver: Receiver<Reply>,
    waiting: bool,
}

impl Slot {
    fn open() -> Self {
        let (sender, receiver) = bounded(1);
        Self {
            sender: Some(sender),
            receiver,
            waiting: false,
        }
    }
}

#[derive(Debug, Default)]
struct RouterState {
    slots: HashMap<i64, Slot>,
    closed: bool,
}

/// Keyed one-shot queues for command replies.
#[derive(Debug, Default)]
pub struct ReplyRouter {
    state: Mutex<RouterState>,
}

impl ReplyRouter {
    /// Creates an open router with no pending requests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers `reply` to the caller waiting on `request_id`.
    ///
    /// A second reply for the same id, or any reply after
    /// [`close`](Self::close), is logged and dropped.
    pub fn push(&self, request_id: i64, reply: Reply) {
        let mut state = self.lock();
        if state.closed {
            warn!(
                target: ROUTER_TARGET,
                request_id, "dropping reply routed after the connection closed"
            );
            return;
        }

        let slot = state.slots.entry(request_id).or_insert_with(Slot::open);
        let Some(sender) = slot.sender.as_ref() else {
            return;
        };
        match sender.try_send(reply) {
            Ok(()) => trace!(target: ROUTER_TARGET, request_id, "reply routed"),
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                warn!(
                    target: ROUTER_TARGET,
                    request_id, "dropping duplicate reply"
                );
            }
        }
    }

    /// Blocks until the reply for `request_id` arrives, then forgets the id.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] when the router is closed before
    /// a reply was routed, and [`ClientError::DuplicateWaiter`] when another
    /// caller is already waiting on the same id.
    pub fn pop(&self, request_id: i64) -> Result<Reply, ClientError> {
        let receiver = {
            let mut state = self.lock();
            let closed = state.closed;
            if closed && !state.slots.contains_key(&request_id) {
                return Err(ClientError::Disconnected);
            }
            let slot = state.slots.entry(request_id).or_insert_with(Slot::open);
            if slot.waiting {
                return Err(ClientError::DuplicateWaiter { request_id });
            }
            slot.waiting = true;
            slot.receiver.clone()
        };

        let outcome = receiver.recv().map_err(|_| ClientError::Disconnected);
        self.lock().slots.remove(&request_id);
        outcome
    }

    /// Fails every current and future waiter with
    /// [`ClientError::Disconnected`].
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        for slot in state.slots.values_mut() {
            slot.sender = None;
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of request ids with a pending reply or waiter.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().slots.len()
    }
}
