//! Event fan-out to callbacks, property observers, and message handlers.
//!
//! Lookups happen on the reader thread, in stream order, against the shared
//! [`Registry`]. Only the callback invocations are deferred to the worker
//! pool, so unregistering a handler after its teardown command has been
//! answered cannot race with events mpv emitted earlier.

mod pool;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace};

use crate::error::ClientError;
use crate::protocol::{Event, EventKind, Message, ObserverId, PropertyChange};
use crate::transport::EventSink;

use self::pool::{Mailbox, WorkerPool};

const DISPATCH_TARGET: &str = "mpv_ipc::dispatch";

/// Callback receiving every event.
pub type EventCallback = dyn FnMut(&Event) + Send;

/// Callback receiving changes of one observed property.
pub type ObserverCallback = dyn FnMut(&PropertyChange) + Send;

/// Callback receiving messages addressed to one name.
pub type MessageCallback = dyn FnMut(&Message) + Send;

/// A registered callback with its own mailbox on the worker pool.
struct Subscriber<F: ?Sized> {
    mailbox: Arc<Mailbox>,
    callback: Mutex<Box<F>>,
}

impl<F: ?Sized> Subscriber<F> {
    fn new(callback: Box<F>) -> Arc<Self> {
        Arc::new(Self {
            mailbox: Arc::new(Mailbox::default()),
            callback: Mutex::new(callback),
        })
    }

    fn invoke(&self, call: impl FnOnce(&mut F)) {
        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        call(&mut **callback);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client-owned callback tables shared by the caller and the reader thread.
#[derive(Default)]
pub(crate) struct Registry {
    callbacks: Mutex<Vec<Arc<Subscriber<EventCallback>>>>,
    observers: Mutex<HashMap<ObserverId, Arc<Subscriber<ObserverCallback>>>>,
    handlers: Mutex<HashMap<String, Arc<Subscriber<MessageCallback>>>>,
}

impl Registry {
    /// Adds a callback for every event.
    pub(crate) fn add_callback(&self, callback: Box<EventCallback>) {
        let subscriber = Subscriber::new(callback);
        lock(&self.callbacks).push(subscriber);
    }

    /// Installs the observer for `id`, replacing any previous one.
    pub(crate) fn insert_observer(&self, id: ObserverId, callback: Box<ObserverCallback>) {
        let subscriber = Subscriber::new(callback);
        lock(&self.observers).insert(id, subscriber);
    }

    /// Removes the observer for `id`; returns whether one existed.
    pub(crate) fn remove_observer(&self, id: ObserverId) -> bool {
        lock(&self.observers).remove(&id).is_some()
    }

    /// Installs the handler for `name`, replacing any previous one.
    pub(crate) fn insert_handler(&self, name: String, callback: Box<MessageCallback>) {
        let subscriber = Subscriber::new(callback);
        lock(&self.handlers).insert(name, subscriber);
    }

    /// Removes the handler for `name`; returns whether one existed.
    pub(crate) fn remove_handler(&self, name: &str) -> bool {
        lock(&self.handlers).remove(name).is_some()
    }

    /// Whether a handler is registered under `name`.
    pub(crate) fn has_handler(&self, name: &str) -> bool {
        lock(&self.handlers).contains_key(name)
    }

    fn callbacks(&self) -> Vec<Arc<Subscriber<EventCallback>>> {
        lock(&self.callbacks).clone()
    }

    fn observer(&self, id: ObserverId) -> Option<Arc<Subscriber<ObserverCallback>>> {
        lock(&self.observers).get(&id).cloned()
    }

    fn handler(&self, name: &str) -> Option<Arc<Subscriber<MessageCallback>>> {
        lock(&self.handlers).get(name).cloned()
    }
}

/// Routes each event to the callbacks interested in it.
pub(crate) struct Dispatcher {
    registry: Arc<Registry>,
    pool: WorkerPool,
}

impl Dispatcher {
    /// Starts a dispatcher with its own worker pool.
    pub(crate) fn new(registry: Arc<Registry>, workers: NonZeroUsize) -> Result<Self, ClientError> {
        let pool = WorkerPool::new(workers)?;
        debug!(target: DISPATCH_TARGET, workers = pool.size(), "dispatch pool started");
        Ok(Self { registry, pool })
    }

    fn dispatch_event(&self, received: Event) {
        let event = Arc::new(received);

        for subscriber in self.registry.callbacks() {
            let shared = Arc::clone(&event);
            let mailbox = Arc::clone(&subscriber.mailbox);
            self.pool.submit(&mailbox, move || {
                subscriber.invoke(|callback| callback(shared.as_ref()));
            });
        }

        match &event.kind {
            EventKind::PropertyChange(change) => self.dispatch_change(change),
            EventKind::ClientMessage { target, message } => {
                self.dispatch_message(target, message);
            }
            EventKind::Other => {}
        }
    }

    fn dispatch_change(&self, change: &PropertyChange) {
        let Some(subscriber) = self.registry.observer(change.id) else {
            error!(
                target: DISPATCH_TARGET,
                id = change.id,
                property = %change.name,
                "property change for an unknown observer"
            );
            return;
        };
        let owned = change.clone();
        let mailbox = Arc::clone(&subscriber.mailbox);
        self.pool.submit(&mailbox, move || {
            subscriber.invoke(|callback| callback(&owned));
        });
    }

    fn dispatch_message(&self, target: &str, message: &Message) {
        let Some(subscriber) = self.registry.handler(target) else {
            trace!(target: DISPATCH_TARGET, name = target, "no handler for client message");
            return;
        };
        let owned = message.clone();
        let mailbox = Arc::clone(&subscriber.mailbox);
        self.pool.submit(&mailbox, move || {
            subscriber.invoke(|callback| callback(&owned));
        });
    }
}

impl EventSink for Dispatcher {
    fn dispatch(&self, event: Event) {
        self.dispatch_event(event);
    }
}
