//! Client engine for mpv's JSON IPC protocol.
//!
//! A [`Client`] owns one Unix socket to a running mpv. Commands are framed
//! as newline-delimited JSON with a unique `request_id`, and callers block
//! until the matching reply arrives. A single reader thread owns the socket's
//! read half: replies go to the [`ReplyRouter`], everything else is an event
//! handed to the dispatcher.
//!
//! Events fan out to a fixed pool of worker threads. Each registered callback
//! queues its events in its own mailbox and runs on whichever worker is free,
//! so a given property observer or message handler sees its events in wire
//! order while unrelated callbacks run in parallel.
//!
//! On top of that sit two conveniences scripts usually want:
//!
//! - keybinding sections, including a single-shot modal prompt that shows a
//!   message and waits for one key;
//! - an on-screen message registry that composes every message into mpv's
//!   overlay slot and removes timed messages on its own.
//!
//! ```no_run
//! use mpv_ipc::Client;
//!
//! # fn main() -> Result<(), mpv_ipc::ClientError> {
//! let client = Client::connect("/tmp/mpv.sock")?;
//! client.set_property("volume", 50.0)?;
//! client.observe_property("volume", |change| println!("{}", change.data))?;
//! # Ok(())
//! # }
//! ```

mod client;
mod dispatch;
mod error;
mod fence;
mod ids;
mod overlay;
mod protocol;
mod router;
pub mod telemetry;
mod transport;

pub use client::{Client, ClientOptions, DEFAULT_EXIT_KEY, KeybindingOptions, SectionFlags};
pub use dispatch::{EventCallback, MessageCallback, ObserverCallback};
pub use error::{ClientError, ProtocolError};
pub use fence::{DEFAULT_FENCE_TIMEOUT, Fence};
pub use ids::{IdAllocator, IdRange};
pub use overlay::{OVERLAY_ID, OsdId, OsdMessage, render_command};
pub use protocol::{
    Event, EventKind, KeyEvent, KeyState, Message, ObserverId, PropertyChange, Reply,
};
pub use router::ReplyRouter;
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
