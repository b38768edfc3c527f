//! Error types for the IPC client.
//!
//! I/O and JSON errors are wrapped in `Arc` so every error stays `Clone`;
//! the reply router hands the same failure to several waiters.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced to callers of the client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Connecting to the mpv socket failed.
    #[error("failed to connect to mpv socket '{path}': {source}")]
    Connect {
        /// Socket path that was dialled.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Writing a frame or spawning a worker thread failed.
    #[error("I/O error on mpv connection: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A command could not be encoded as JSON.
    #[error("JSON codec error: {0}")]
    Codec(#[source] Arc<serde_json::Error>),

    /// The transport loop has exited; no reply will ever arrive.
    #[error("connection to mpv is closed")]
    Disconnected,

    /// A second caller tried to wait on a request id that already has a waiter.
    #[error("request id {request_id} already has a waiting caller")]
    DuplicateWaiter {
        /// The contested request id.
        request_id: i64,
    },

    /// mpv answered a command with a non-success status.
    #[error("mpv rejected command '{command}': {error}")]
    Command {
        /// Name of the rejected command.
        command: String,
        /// Error string reported by mpv.
        error: String,
    },

    /// mpv answered successfully but the payload had an unexpected shape.
    #[error("unexpected reply data for '{command}': {message}")]
    UnexpectedData {
        /// Name of the command whose reply was inspected.
        command: String,
        /// Description of the mismatch.
        message: String,
    },

    /// The keybinding section is not registered on this client.
    #[error("keybinding section '{section}' is not registered")]
    UnknownSection {
        /// Bare section name that was looked up.
        section: String,
    },

    /// The configured id bounds cannot produce valid ids.
    #[error("invalid id range: floor {floor} must be non-negative and below ceiling {ceiling}")]
    InvalidIdRange {
        /// Exclusive lower bound.
        floor: i64,
        /// Inclusive upper bound.
        ceiling: i64,
    },
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(Arc::new(error))
    }
}

/// Errors raised while decoding inbound frames.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The line was not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[source] Arc<serde_json::Error>),

    /// The line was JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The frame lacked `event` and did not decode as a reply.
    #[error("reply frame has an invalid shape: {0}")]
    InvalidReply(#[source] Arc<serde_json::Error>),

    /// An event lacked a field its name requires.
    #[error("'{event}' event is missing field '{field}'")]
    MissingField {
        /// Event name.
        event: String,
        /// Missing field.
        field: &'static str,
    },

    /// An event field had the wrong type.
    #[error("'{event}' event has an invalid '{field}' field")]
    InvalidField {
        /// Event name.
        event: String,
        /// Offending field.
        field: &'static str,
    },

    /// A key-binding message carried an unknown state marker.
    #[error("unknown key state '{0}'")]
    InvalidKeyState(String),
}

impl ProtocolError {
    /// Whether the error means the byte stream itself can no longer be
    /// trusted.
    ///
    /// Frame-level failures end the transport loop. Event payload failures
    /// only drop the offending event.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidJson(_) | Self::NotAnObject | Self::InvalidReply(_)
        )
    }
}
