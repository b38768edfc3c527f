//! Wire types for mpv's JSON IPC protocol.
//!
//! Frames are newline-delimited JSON objects. Outbound commands look like
//! `{"command": [...], "request_id": N}`. Inbound frames are either replies
//! (`{"data": ..., "error": "success", "request_id": N}`) or events, which
//! carry an `"event"` name. Inbound frames are classified exactly once, here,
//! into [`Frame`]; nothing downstream probes raw JSON fields again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ProtocolError};

/// Status string mpv uses for successful replies.
pub const SUCCESS: &str = "success";

/// Event name for observed property updates.
pub const PROPERTY_CHANGE: &str = "property-change";

/// Event name for script and key-binding messages.
pub const CLIENT_MESSAGE: &str = "client-message";

/// Leading argument marking a client message as a key-binding notification.
pub const KEY_BINDING: &str = "key-binding";

/// Observer handle returned by `observe_property`.
pub type ObserverId = i64;

/// Outbound command frame.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame<'a> {
    /// Positional command arguments, command name first.
    pub command: &'a [Value],
    /// Correlation id echoed back in the reply.
    pub request_id: i64,
}

impl<'a> CommandFrame<'a> {
    /// Builds a frame for `command` tagged with `request_id`.
    #[must_use]
    pub const fn new(command: &'a [Value], request_id: i64) -> Self {
        Self {
            command,
            request_id,
        }
    }

    /// Serialises the frame as one newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Codec`] when encoding fails.
    pub fn to_line(&self) -> Result<Vec<u8>, ClientError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Name of a command for diagnostics: its first argument when that is a string.
#[must_use]
pub fn command_name(command: &[Value]) -> String {
    match command.first() {
        Some(Value::String(name)) => name.clone(),
        Some(other) => other.to_string(),
        None => String::from("<empty>"),
    }
}

/// mpv's answer to a single command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Command result; only meaningful on success.
    #[serde(default)]
    pub data: Value,
    /// `"success"` or an error description.
    pub error: String,
    /// Id of the command this reply answers.
    #[serde(default)]
    pub request_id: i64,
}

impl Reply {
    /// Whether mpv reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error == SUCCESS
    }

    /// Unwraps the reply data, turning a failure status into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Command`] when the status is not `"success"`.
    pub fn into_data(self, command: impl Into<String>) -> Result<Value, ClientError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ClientError::Command {
                command: command.into(),
                error: self.error,
            })
        }
    }
}

/// Key transition reported by a key-binding message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// The key went down and is held.
    Down,
    /// The key was released.
    Up,
    /// Auto-repeat while held.
    Repeat,
    /// A down/up pair mpv could not report separately.
    Press,
}

impl KeyState {
    /// Parses mpv's state marker (`d-`, `u-`, `r-`, `p-`); only the first
    /// character is significant.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidKeyState`] for unknown markers.
    pub fn parse(marker: &str) -> Result<Self, ProtocolError> {
        match marker.chars().next() {
            Some('d') => Ok(Self::Down),
            Some('u') => Ok(Self::Up),
            Some('r') => Ok(Self::Repeat),
            Some('p') => Ok(Self::Press),
            _ => Err(ProtocolError::InvalidKeyState(marker.to_owned())),
        }
    }
}

/// A key press delivered to a keybinding section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Bare section name the binding belongs to.
    pub section: String,
    /// Transition that triggered the message.
    pub state: KeyState,
    /// Key name as written in the binding, e.g. `ESC` or `y`.
    pub key: String,
    /// Text the key produced, when mpv reports it.
    pub key2: Option<String>,
}

impl KeyEvent {
    /// Builds a key event from the arguments following `key-binding`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] when the section, state, or
    /// key is absent and [`ProtocolError::InvalidKeyState`] for an unknown
    /// state marker.
    pub fn from_args(args: &[String]) -> Result<Self, ProtocolError> {
        let missing = |field| ProtocolError::MissingField {
            event: String::from(KEY_BINDING),
            field,
        };
        let mut parts = args.iter();
        let section = parts.next().ok_or_else(|| missing("section"))?;
        let state = parts.next().ok_or_else(|| missing("state"))?;
        let key = parts.next().ok_or_else(|| missing("key"))?;
        Ok(Self {
            section: section.clone(),
            state: KeyState::parse(state)?,
            key: key.clone(),
            key2: parts.next().cloned(),
        })
    }
}

/// Payload handed to a message handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Plain `script-message` arguments, message name removed.
    Script(Vec<String>),
    /// A key-binding notification.
    Key(KeyEvent),
}

/// A change notification for an observed property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Observer the change belongs to.
    pub id: ObserverId,
    /// Property name.
    pub name: String,
    /// New value; `Null` when the property became unavailable.
    pub data: Value,
    /// The whole event frame.
    pub raw: Value,
}

/// Classified event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `property-change` for an observer.
    PropertyChange(PropertyChange),
    /// `client-message`, routed to the handler registered under `target`.
    ///
    /// For key bindings `target` is the section name; otherwise it is the
    /// message name.
    ClientMessage {
        /// Handler key.
        target: String,
        /// Decoded arguments.
        message: Message,
    },
    /// Any other event; only generic callbacks see it.
    Other,
}

/// An unsolicited server message.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name, e.g. `pause` or `property-change`.
    pub name: String,
    /// Structured payload for the events the client understands.
    pub kind: EventKind,
    /// The frame exactly as received.
    pub raw: Value,
}

impl Event {
    fn from_object(name: String, raw: Map<String, Value>) -> Result<Self, ProtocolError> {
        let kind = match name.as_str() {
            PROPERTY_CHANGE => EventKind::PropertyChange(decode_property_change(&name, &raw)?),
            CLIENT_MESSAGE => decode_client_message(&name, &raw)?,
            _ => EventKind::Other,
        };
        Ok(Self {
            name,
            kind,
            raw: Value::Object(raw),
        })
    }
}

fn decode_property_change(
    event: &str,
    raw: &Map<String, Value>,
) -> Result<PropertyChange, ProtocolError> {
    let id = raw
        .get("id")
        .ok_or_else(|| ProtocolError::MissingField {
            event: event.to_owned(),
            field: "id",
        })?
        .as_i64()
        .ok_or_else(|| ProtocolError::InvalidField {
            event: event.to_owned(),
            field: "id",
        })?;
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let data = raw.get("data").cloned().unwrap_or(Value::Null);
    Ok(PropertyChange {
        id,
        name,
        data,
        raw: Value::Object(raw.clone()),
    })
}

fn decode_client_message(
    event: &str,
    raw: &Map<String, Value>,
) -> Result<EventKind, ProtocolError> {
    let invalid = || ProtocolError::InvalidField {
        event: event.to_owned(),
        field: "args",
    };
    let values = raw
        .get("args")
        .ok_or_else(|| ProtocolError::MissingField {
            event: event.to_owned(),
            field: "args",
        })?
        .as_array()
        .ok_or_else(invalid)?;
    let args = values
        .iter()
        .map(|value| value.as_str().map(str::to_owned).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()?;

    let Some((name, rest)) = args.split_first() else {
        return Err(ProtocolError::MissingField {
            event: event.to_owned(),
            field: "args[0]",
        });
    };

    if name == KEY_BINDING {
        let key = KeyEvent::from_args(rest)?;
        return Ok(EventKind::ClientMessage {
            target: key.section.clone(),
            message: Message::Key(key),
        });
    }

    Ok(EventKind::ClientMessage {
        target: name.clone(),
        message: Message::Script(rest.to_vec()),
    })
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Answer to a command.
    Reply(Reply),
    /// Unsolicited event.
    Event(Event),
}

impl Frame {
    /// Parses and classifies one line.
    ///
    /// # Errors
    ///
    /// Fatal errors ([`ProtocolError::is_fatal`]) mean the line was not a
    /// usable frame at all. Non-fatal errors mean the frame was an event
    /// whose payload did not match its name.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|error| ProtocolError::InvalidJson(error.into()))?;
        let Value::Object(object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let event_name = match object.get("event") {
            Some(Value::String(event)) => Some(event.clone()),
            Some(_) => {
                return Err(ProtocolError::InvalidField {
                    event: String::from("<unnamed>"),
                    field: "event",
                });
            }
            None => None,
        };

        match event_name {
            Some(name) => Event::from_object(name, object).map(Self::Event),
            None => serde_json::from_value(Value::Object(object))
                .map(Self::Reply)
                .map_err(|error| ProtocolError::InvalidReply(error.into())),
        }
    }
}
