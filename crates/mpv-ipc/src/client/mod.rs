//! The client facade: commands, properties, observers, messages, overlays.
//!
//! A [`Client`] owns one connection to mpv. Cloning it is cheap and every
//! clone talks over the same socket. The socket is shut down when the last
//! clone is dropped.

mod keybindings;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use camino::Utf8Path;
use mpv_ass::Text;
use mpv_config::{Config, DEFAULT_DISPATCH_WORKERS};
use once_cell::sync::OnceCell;
use serde_json::{Value, json};
use tracing::debug;

use crate::dispatch::{Dispatcher, Registry};
use crate::error::ClientError;
use crate::ids::{IdAllocator, IdRange};
use crate::overlay::{OsdId, OsdMessage, OverlayManager, OverlaySink};
use crate::protocol::{
    CommandFrame, Event, Message, ObserverId, PropertyChange, Reply, command_name,
};
use crate::router::ReplyRouter;
use crate::transport::Transport;

pub use keybindings::{DEFAULT_EXIT_KEY, KeybindingOptions, SectionFlags};

const CLIENT_TARGET: &str = "mpv_ipc::client";

/// Runtime knobs for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    dispatch_workers: NonZeroUsize,
    id_range: IdRange,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            dispatch_workers: NonZeroUsize::new(DEFAULT_DISPATCH_WORKERS)
                .unwrap_or(NonZeroUsize::MIN),
            id_range: IdRange::default(),
        }
    }
}

impl ClientOptions {
    /// Reads the options from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidIdRange`] when the configured id bounds
    /// are unusable.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Ok(Self {
            dispatch_workers: NonZeroUsize::new(config.dispatch_workers())
                .unwrap_or(NonZeroUsize::MIN),
            id_range: IdRange::from_config(config)?,
        })
    }

    /// Sets the number of callback worker threads.
    #[must_use]
    pub const fn with_dispatch_workers(mut self, workers: NonZeroUsize) -> Self {
        self.dispatch_workers = workers;
        self
    }

    /// Sets the bounds of allocated request and observer ids.
    #[must_use]
    pub const fn with_id_range(mut self, range: IdRange) -> Self {
        self.id_range = range;
        self
    }

    /// Number of callback worker threads.
    #[must_use]
    pub const fn dispatch_workers(&self) -> NonZeroUsize {
        self.dispatch_workers
    }

    /// Bounds of allocated ids.
    #[must_use]
    pub const fn id_range(&self) -> IdRange {
        self.id_range
    }
}

/// The command path: id allocation, framing, and reply correlation.
struct Connection {
    ids: Arc<IdAllocator>,
    router: Arc<ReplyRouter>,
    transport: Transport,
}

impl Connection {
    fn request(&self, command: &[Value]) -> Result<Reply, ClientError> {
        let request_id = self.ids.next_id();
        let line = CommandFrame::new(command, request_id).to_line()?;
        debug!(
            target: CLIENT_TARGET,
            request_id,
            command = %command_name(command),
            "sending command"
        );
        self.transport.send(&line).map_err(|error| {
            if self.transport.is_alive() {
                error
            } else {
                ClientError::Disconnected
            }
        })?;
        self.router.pop(request_id)
    }
}

impl OverlaySink for Connection {
    fn send_command(&self, command: &[Value]) -> Result<Reply, ClientError> {
        self.request(command)
    }
}

struct ClientInner {
    connection: Arc<Connection>,
    registry: Arc<Registry>,
    overlay: Arc<OverlayManager>,
    sections: Mutex<HashMap<String, String>>,
    client_name: OnceCell<String>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.connection.transport.shutdown();
    }
}

/// Connection to a running mpv instance over its JSON IPC socket.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connects to the socket mpv was started with via
    /// `--input-ipc-server`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] when the socket cannot be reached, or
    /// an I/O error when the worker threads cannot be started.
    pub fn connect(path: impl AsRef<Utf8Path>) -> Result<Self, ClientError> {
        Self::connect_with_options(path, ClientOptions::default())
    }

    /// Connects with explicit runtime options.
    ///
    /// # Errors
    ///
    /// See [`Client::connect`].
    pub fn connect_with_options(
        path: impl AsRef<Utf8Path>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let socket = path.as_ref();
        let stream =
            UnixStream::connect(socket.as_std_path()).map_err(|source| ClientError::Connect {
                path: socket.to_string(),
                source: Arc::new(source),
            })?;
        Self::from_stream_with_options(stream, options)
    }

    /// Connects to the socket named in `config`, using its runtime options.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidIdRange`] for unusable id bounds, and
    /// otherwise the errors of [`Client::connect`].
    pub fn connect_with_config(config: &Config) -> Result<Self, ClientError> {
        let options = ClientOptions::from_config(config)?;
        Self::connect_with_options(config.socket_path(), options)
    }

    /// Wraps a descriptor mpv handed over via `--input-ipc-client=fd://N`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the worker threads cannot be started.
    pub fn from_fd(fd: OwnedFd) -> Result<Self, ClientError> {
        Self::from_stream(UnixStream::from(fd))
    }

    /// Wraps an already connected stream.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the worker threads cannot be started.
    pub fn from_stream(stream: UnixStream) -> Result<Self, ClientError> {
        Self::from_stream_with_options(stream, ClientOptions::default())
    }

    /// Wraps an already connected stream with explicit runtime options.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the stream cannot be cloned or the worker
    /// threads cannot be started.
    pub fn from_stream_with_options(
        stream: UnixStream,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let ids = Arc::new(IdAllocator::new(options.id_range()));
        let router = Arc::new(ReplyRouter::new());
        let registry = Arc::new(Registry::default());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), options.dispatch_workers())?;
        let transport = Transport::start(stream, Arc::clone(&router), dispatcher)?;

        let connection = Arc::new(Connection {
            ids: Arc::clone(&ids),
            router,
            transport,
        });
        let sink: Arc<dyn OverlaySink> = Arc::clone(&connection) as Arc<dyn OverlaySink>;
        let overlay = Arc::new(OverlayManager::new(sink, ids));

        Ok(Self {
            inner: Arc::new(ClientInner {
                connection,
                registry,
                overlay,
                sections: Mutex::new(HashMap::new()),
                client_name: OnceCell::new(),
            }),
        })
    }

    /// Whether the connection's reader is still running.
    ///
    /// Once this turns false every command fails with
    /// [`ClientError::Disconnected`].
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.connection.transport.is_alive()
    }

    /// Sends a command and waits for mpv's reply.
    ///
    /// A non-success status is returned as data; see
    /// [`Client::command_data`] for the unwrapping form.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] when the connection is gone and
    /// I/O or codec errors when the frame cannot be written.
    pub fn command<I, A>(&self, args: I) -> Result<Reply, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Value>,
    {
        let command: Vec<Value> = args.into_iter().map(Into::into).collect();
        self.inner.connection.request(&command)
    }

    /// Sends a command and returns its data, failing on a non-success status.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Command`] when mpv rejects the command, plus the
    /// errors of [`Client::command`].
    pub fn command_data<I, A>(&self, args: I) -> Result<Value, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Value>,
    {
        let command: Vec<Value> = args.into_iter().map(Into::into).collect();
        let reply = self.inner.connection.request(&command)?;
        reply.into_data(command_name(&command))
    }

    /// Reads a property.
    ///
    /// # Errors
    ///
    /// See [`Client::command`].
    pub fn get_property(&self, name: &str) -> Result<Reply, ClientError> {
        self.command([json!("get_property"), json!(name)])
    }

    /// Writes a property.
    ///
    /// # Errors
    ///
    /// See [`Client::command`].
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<Reply, ClientError> {
        self.command([json!("set_property"), json!(name), value.into()])
    }

    /// Calls `callback` with every change of property `name`.
    ///
    /// mpv reports the current value straight away, so the first call
    /// usually arrives without any change having happened.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Command`] when mpv refuses the observation, plus
    /// the errors of [`Client::command`]. The observer is not kept on error.
    pub fn observe_property<F>(&self, name: &str, callback: F) -> Result<ObserverId, ClientError>
    where
        F: FnMut(&PropertyChange) + Send + 'static,
    {
        let id = self.inner.connection.ids.next_id();
        self.inner.registry.insert_observer(id, Box::new(callback));
        match self.command_data([json!("observe_property"), json!(id), json!(name)]) {
            Ok(_) => Ok(id),
            Err(error) => {
                self.inner.registry.remove_observer(id);
                Err(error)
            }
        }
    }

    /// Stops an observation started with [`Client::observe_property`].
    ///
    /// The callback is dropped once mpv has acknowledged the request.
    ///
    /// # Errors
    ///
    /// See [`Client::command`].
    pub fn unobserve_property(&self, id: ObserverId) -> Result<Reply, ClientError> {
        let outcome = self.command([json!("unobserve_property"), json!(id)]);
        self.inner.registry.remove_observer(id);
        outcome
    }

    /// Calls `callback` for every client message whose first argument is
    /// `name`, replacing any handler already registered under that name.
    pub fn register_message_handler<F>(&self, name: impl Into<String>, callback: F)
    where
        F: FnMut(&Message) + Send + 'static,
    {
        self.inner
            .registry
            .insert_handler(name.into(), Box::new(callback));
    }

    /// Removes the handler registered under `name`; returns whether one
    /// existed.
    pub fn unregister_message_handler(&self, name: &str) -> bool {
        self.inner.registry.remove_handler(name)
    }

    /// Calls `callback` for every event mpv sends.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.inner.registry.add_callback(Box::new(callback));
    }

    /// The name mpv knows this client by, as used in `script-binding`
    /// targets.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedData`] when mpv reports a non-string
    /// name, plus the errors of [`Client::command_data`].
    pub fn client_name(&self) -> Result<&str, ClientError> {
        self.inner
            .client_name
            .get_or_try_init(|| {
                let data = self.command_data(["get_property", "client_name"])?;
                data.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ClientError::UnexpectedData {
                        command: String::from("get_property"),
                        message: format!("client_name is not a string: {data}"),
                    })
            })
            .map(String::as_str)
    }

    /// Asks mpv to quit and closes the connection.
    ///
    /// Losing the connection while waiting for the reply counts as success.
    ///
    /// # Errors
    ///
    /// Returns I/O or codec errors from writing the command.
    pub fn quit(&self) -> Result<(), ClientError> {
        let outcome = match self.command(["quit"]) {
            Ok(_) | Err(ClientError::Disconnected) => Ok(()),
            Err(error) => Err(error),
        };
        self.inner.connection.transport.shutdown();
        outcome
    }

    /// Shows `text` on screen and returns its handle.
    ///
    /// A positive `timeout` removes the message once it elapses.
    ///
    /// # Errors
    ///
    /// Returns the render command's failure.
    pub fn create_osd_message(
        &self,
        text: impl Into<Text>,
        timeout: Option<Duration>,
    ) -> Result<OsdId, ClientError> {
        self.inner.overlay.create(text.into(), timeout)
    }

    /// Replaces the text shown under `id`.
    ///
    /// # Errors
    ///
    /// Returns the render command's failure.
    pub fn edit_osd_message(
        &self,
        id: OsdId,
        text: impl Into<Text>,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.inner.overlay.edit(id, text.into(), timeout)
    }

    /// Removes the message `id`, now or after `delay`.
    ///
    /// # Errors
    ///
    /// Returns the render command's failure for immediate removals.
    pub fn delete_osd_message(&self, id: OsdId, delay: Option<Duration>) -> Result<(), ClientError> {
        self.inner.overlay.delete(id, delay)
    }

    /// Removes every on-screen message.
    ///
    /// # Errors
    ///
    /// Returns the render command's failure.
    pub fn clear_osd_messages(&self) -> Result<(), ClientError> {
        self.inner.overlay.clear()
    }

    /// The on-screen messages in render order.
    #[must_use]
    pub fn osd_messages(&self) -> Vec<(OsdId, OsdMessage)> {
        self.inner.overlay.snapshot()
    }

    fn sections(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn downgrade(&self) -> WeakClient {
        WeakClient(Arc::downgrade(&self.inner))
    }
}

/// Non-owning handle used by callbacks that must not keep the client alive.
struct WeakClient(Weak<ClientInner>);

impl WeakClient {
    fn upgrade(&self) -> Option<Client> {
        self.0.upgrade().map(|inner| Client { inner })
    }
}
