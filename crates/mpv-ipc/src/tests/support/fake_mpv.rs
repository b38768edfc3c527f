//! A scripted stand-in for mpv's IPC server.
//!
//! The fake runs on the far end of a socket pair and keeps just enough state
//! to answer the commands the client issues: a property table, observers,
//! and keybinding sections. Key presses are simulated with mpv's own
//! `keypress` command, which makes the fake emit the `key-binding` message a
//! real player would send for the bound section.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::{Value, json};

/// Name the fake reports for `client_name`.
pub const CLIENT_NAME: &str = "ipc_test";

/// Volume the fake starts with.
const INITIAL_VOLUME: f64 = 100.0;

/// `(key, script-binding target)` pairs of one section.
type Bindings = Vec<(String, String)>;

#[derive(Debug, Default)]
struct MpvState {
    properties: HashMap<String, Value>,
    observers: Vec<(i64, String)>,
    sections: HashMap<String, Bindings>,
    enabled: Vec<String>,
    commands: Vec<Vec<Value>>,
    silent: bool,
}

#[derive(Debug, Default)]
struct Outcome {
    frames: Vec<Value>,
    close: bool,
}

fn text(args: &[Value], index: usize) -> &str {
    args.get(index).and_then(Value::as_str).unwrap_or_default()
}

fn property_change(id: i64, name: &str, data: &Value) -> Value {
    json!({"event": "property-change", "id": id, "name": name, "data": data})
}

fn client_message(args: &[Value]) -> Value {
    json!({"event": "client-message", "args": args})
}

impl MpvState {
    fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(String::from("volume"), json!(INITIAL_VOLUME));
        properties.insert(String::from("pause"), json!(false));
        properties.insert(String::from("client_name"), json!(CLIENT_NAME));
        Self {
            properties,
            ..Self::default()
        }
    }

    fn handle(&mut self, request: &Value) -> Outcome {
        let request_id = request
            .get("request_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let command = request
            .get("command")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        self.commands.push(command.clone());
        if self.silent {
            return Outcome::default();
        }

        let (name, args) = command
            .split_first()
            .map(|(first, rest)| (first.as_str().unwrap_or_default(), rest))
            .unwrap_or_default();
        let mut events = Vec::new();
        let mut close = false;
        let result = match name {
            "get_property" => self
                .properties
                .get(text(args, 0))
                .cloned()
                .ok_or("property unavailable"),
            "set_property" => {
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                self.set_property(text(args, 0), value, &mut events);
                Ok(Value::Null)
            }
            "observe_property" => {
                let id = args.first().and_then(Value::as_i64).unwrap_or_default();
                let property = text(args, 1);
                let current = self.properties.get(property).cloned().unwrap_or(Value::Null);
                self.observers.push((id, property.to_owned()));
                events.push(property_change(id, property, &current));
                Ok(Value::Null)
            }
            "unobserve_property" => {
                let id = args.first().and_then(Value::as_i64).unwrap_or_default();
                let before = self.observers.len();
                self.observers.retain(|(observer, _)| *observer != id);
                if self.observers.len() == before {
                    Err("error running command")
                } else {
                    Ok(Value::Null)
                }
            }
            "script-message" => {
                events.push(client_message(args));
                Ok(Value::Null)
            }
            "keypress" => {
                events.extend(self.press(text(args, 0)));
                Ok(Value::Null)
            }
            "define-section" => {
                self.define_section(text(args, 0), text(args, 1));
                Ok(Value::Null)
            }
            "enable-section" => {
                self.enable_section(text(args, 0));
                Ok(Value::Null)
            }
            "disable-section" => {
                self.disable_section(text(args, 0));
                Ok(Value::Null)
            }
            "osd-overlay" => Ok(Value::Null),
            "quit" => {
                close = true;
                Ok(Value::Null)
            }
            _ => Err("invalid parameter"),
        };

        let reply = match result {
            Ok(data) => json!({"request_id": request_id, "error": "success", "data": data}),
            Err(error) => json!({"request_id": request_id, "error": error}),
        };
        let mut frames = vec![reply];
        frames.extend(events);
        Outcome { frames, close }
    }

    fn set_property(&mut self, name: &str, value: Value, events: &mut Vec<Value>) {
        for (id, property) in &self.observers {
            if property == name {
                events.push(property_change(*id, name, &value));
            }
        }
        self.properties.insert(name.to_owned(), value);
    }

    fn define_section(&mut self, name: &str, contents: &str) {
        let bindings = contents
            .lines()
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                let key = words.next()?;
                let command = words.next()?;
                let target = words.next()?;
                (command == "script-binding").then(|| (key.to_owned(), target.to_owned()))
            })
            .collect();
        self.sections.insert(name.to_owned(), bindings);
    }

    fn enable_section(&mut self, name: &str) {
        self.enabled.retain(|section| section != name);
        self.enabled.push(name.to_owned());
    }

    fn disable_section(&mut self, name: &str) {
        self.enabled.retain(|section| section != name);
    }

    /// The most recently enabled section binding `key` wins.
    fn press(&self, key: &str) -> Option<Value> {
        let target = self.enabled.iter().rev().find_map(|name| {
            self.sections
                .get(name)?
                .iter()
                .find(|(bound, _)| bound == key)
                .map(|(_, target)| target.as_str())
        })?;
        let binding = target
            .split_once('/')
            .map_or(target, |(_, binding)| binding);
        Some(client_message(&[
            json!("key-binding"),
            json!(binding),
            json!("p-"),
            json!(key),
            json!(key),
        ]))
    }
}

fn lock(state: &Mutex<MpvState>) -> MutexGuard<'_, MpvState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write_frame(writer: &Mutex<UnixStream>, frame: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(frame).context("encode frame")?;
    line.push(b'\n');
    let mut stream = writer.lock().unwrap_or_else(PoisonError::into_inner);
    stream.write_all(&line).context("write frame")
}

fn serve(stream: &UnixStream, state: &Mutex<MpvState>, writer: &Mutex<UnixStream>) -> Result<()> {
    let reader = BufReader::new(stream.try_clone().context("clone fake mpv socket")?);
    for read in reader.lines() {
        let line = read.context("read command")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = serde_json::from_str(&line).context("parse command")?;
        let outcome = lock(state).handle(&request);
        for frame in &outcome.frames {
            write_frame(writer, frame)?;
        }
        if outcome.close {
            stream.shutdown(Shutdown::Both).context("close after quit")?;
            break;
        }
    }
    Ok(())
}

/// Handle to a running fake server.
pub struct FakeMpv {
    state: Arc<Mutex<MpvState>>,
    writer: Arc<Mutex<UnixStream>>,
}

impl FakeMpv {
    /// Starts the server and returns it with the client's end of the socket.
    pub fn spawn() -> Result<(Self, UnixStream)> {
        let (client, server) = UnixStream::pair().context("create socket pair")?;
        let state = Arc::new(Mutex::new(MpvState::new()));
        let writer = Arc::new(Mutex::new(
            server.try_clone().context("clone fake mpv writer")?,
        ));

        let served_state = Arc::clone(&state);
        let served_writer = Arc::clone(&writer);
        thread::Builder::new()
            .name(String::from("fake-mpv"))
            .spawn(move || {
                if let Err(error) = serve(&server, &served_state, &served_writer) {
                    tracing::debug!(%error, "fake mpv stopped");
                }
            })
            .context("spawn fake mpv")?;

        Ok((Self { state, writer }, client))
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<Vec<Value>> {
        lock(&self.state).commands.clone()
    }

    /// Commands received so far whose name is `name`.
    pub fn commands_named(&self, name: &str) -> Vec<Vec<Value>> {
        self.commands()
            .into_iter()
            .filter(|command| command.first().and_then(Value::as_str) == Some(name))
            .collect()
    }

    /// Waits until at least `count` commands named `name` have arrived.
    pub fn wait_for_commands(&self, name: &str, count: usize, patience: Duration) -> bool {
        let deadline = Instant::now() + patience;
        while Instant::now() < deadline {
            if self.commands_named(name).len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Stops answering commands; they are still recorded.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// Writes `line` to the client verbatim.
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut stream = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        stream
            .write_all(format!("{line}\n").as_bytes())
            .context("write raw line")
    }

    /// Closes the server's end of the socket.
    pub fn disconnect(&self) -> Result<()> {
        let stream = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        stream.shutdown(Shutdown::Both).context("disconnect fake mpv")
    }
}

mod tests {
    use rstest::rstest;

    use super::*;

    fn request(command: Value) -> Value {
        json!({"command": command, "request_id": 1})
    }

    #[rstest]
    fn key_presses_follow_the_latest_enabled_section() {
        let mut state = MpvState::new();
        state.handle(&request(json!([
            "define-section",
            "ipc_test/section-1",
            "c script-binding ipc_test/section-1",
            "force"
        ])));
        state.handle(&request(json!(["enable-section", "ipc_test/section-1"])));

        let outcome = state.handle(&request(json!(["keypress", "c"])));
        assert_eq!(
            outcome.frames.get(1),
            Some(&json!({
                "event": "client-message",
                "args": ["key-binding", "section-1", "p-", "c", "c"]
            }))
        );

        state.handle(&request(json!(["disable-section", "ipc_test/section-1"])));
        let silent = state.handle(&request(json!(["keypress", "c"])));
        assert_eq!(silent.frames.len(), 1);
    }
}
