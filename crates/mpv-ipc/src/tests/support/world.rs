//! BDD test world: one client wired to a fake mpv, plus spies for every
//! callback the scenarios register.

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};

use crate::{Client, ClientError, Fence, KeybindingOptions, Message, ObserverId, OsdId, Reply};

use super::fake_mpv::FakeMpv;

/// How long a step waits for something to happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// How long a step waits to be sure something does not happen.
pub const QUIET: Duration = Duration::from_millis(200);

/// Scenario world shared across BDD steps.
#[derive(Default)]
pub struct TestWorld {
    fake: Option<FakeMpv>,
    client: Option<Client>,
    reply: Option<Reply>,
    error: Option<ClientError>,
    observed: Fence<Value>,
    observer: Option<ObserverId>,
    handlers: HashMap<String, Fence<Vec<String>>>,
    keys: Fence<String>,
    section: Option<String>,
    messages: HashMap<String, OsdId>,
    background: Option<JoinHandle<Result<Reply, ClientError>>>,
    names: Vec<String>,
}

/// Builds an empty world.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}

impl TestWorld {
    /// Starts the fake and connects a client to it.
    pub fn connect(&mut self) -> Result<()> {
        let (fake, stream) = FakeMpv::spawn()?;
        let client = Client::from_stream(stream).context("wrap fake mpv socket")?;
        self.fake = Some(fake);
        self.client = Some(client);
        Ok(())
    }

    /// The connected client.
    pub fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or_else(|| anyhow!("no client connected"))
    }

    /// The fake server.
    pub fn fake(&self) -> Result<&FakeMpv> {
        self.fake.as_ref().ok_or_else(|| anyhow!("fake mpv not running"))
    }

    fn record<T>(&mut self, outcome: Result<T, ClientError>) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.error = None;
                Some(value)
            }
            Err(error) => {
                self.error = Some(error);
                None
            }
        }
    }

    /// Sends `command` and keeps the reply or the error.
    pub fn send(&mut self, command: Vec<Value>) -> Result<()> {
        let outcome = self.client()?.command(command);
        self.reply = self.record(outcome);
        Ok(())
    }

    /// Sends `command` and fails unless mpv accepts it.
    pub fn send_ok(&self, command: Vec<Value>) -> Result<()> {
        self.client()?
            .command_data(command)
            .map(drop)
            .context("command rejected")
    }

    /// Reply to the last command sent through [`TestWorld::send`].
    pub fn reply(&self) -> Result<&Reply> {
        self.reply
            .as_ref()
            .ok_or_else(|| anyhow!("no reply recorded; last error: {:?}", self.error))
    }

    /// Error of the last recorded operation.
    pub const fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    /// Reads `property` into the recorded reply.
    pub fn get_property(&mut self, property: &str) -> Result<()> {
        let outcome = self.client()?.get_property(property);
        self.reply = self.record(outcome);
        Ok(())
    }

    /// Writes `property` and fails unless mpv accepts it.
    pub fn set_property(&self, property: &str, value: Value) -> Result<()> {
        self.client()?
            .set_property(property, value)?
            .into_data("set_property")
            .map(drop)
            .context("set_property rejected")
    }

    /// Observes `property`, recording every value it reports.
    pub fn observe(&mut self, property: &str) -> Result<()> {
        let mut record = self.observed.recorder();
        let id = self
            .client()?
            .observe_property(property, move |change| record(&change.data))?;
        self.observer = Some(id);
        Ok(())
    }

    /// Stops the observation started by [`TestWorld::observe`].
    pub fn unobserve(&self) -> Result<()> {
        let id = self.observer.context("no observer registered")?;
        self.client()?
            .unobserve_property(id)?
            .into_data("unobserve_property")
            .map(drop)
            .context("unobserve_property rejected")
    }

    /// Values the observer saw.
    pub fn observed(&self, count: usize, patience: Duration) -> Vec<Value> {
        self.observed.wait(count, patience)
    }

    /// Installs a handler for `name` recording the script arguments it gets.
    pub fn handle_messages(&mut self, name: &str) -> Result<()> {
        let fence = Fence::new();
        let spy = fence.clone();
        self.client()?.register_message_handler(name, move |message: &Message| {
            if let Message::Script(args) = message {
                spy.record(args.clone());
            }
        });
        self.handlers.insert(name.to_owned(), fence);
        Ok(())
    }

    /// Arguments the handler for `name` received.
    pub fn handled(&self, name: &str, count: usize, patience: Duration) -> Result<Vec<Vec<String>>> {
        let fence = self
            .handlers
            .get(name)
            .with_context(|| format!("no handler named {name}"))?;
        Ok(fence.wait(count, patience))
    }

    /// Binds `keys` in a fresh section, recording every key pressed.
    pub fn bind(&mut self, keys: &[&str]) -> Result<()> {
        let fence = self.keys.clone();
        let section = self.client()?.register_keybindings(
            keys.iter().copied(),
            KeybindingOptions::new(),
            move |key| fence.record(key.key.clone()),
        )?;
        self.section = Some(section);
        Ok(())
    }

    /// Enters modal mode showing `prompt` for `keys`.
    pub fn enter_modal(&mut self, prompt: &str, keys: &[&str]) -> Result<()> {
        let fence = self.keys.clone();
        let section = self.client()?.enter_modal_mode(
            prompt,
            keys.iter().copied(),
            crate::DEFAULT_EXIT_KEY,
            move |key| fence.record(key.key.clone()),
        )?;
        self.section = Some(section);
        Ok(())
    }

    /// Unregisters `section`, or the last registered one, keeping the error.
    pub fn unbind(&mut self, section: Option<&str>) -> Result<()> {
        let name = match section {
            Some(name) => name.to_owned(),
            None => self.section.clone().context("no section registered")?,
        };
        let outcome = self.client()?.unregister_keybindings(&name);
        self.record(outcome);
        Ok(())
    }

    /// The section registered last.
    pub fn section(&self) -> Result<&str> {
        self.section.as_deref().context("no section registered")
    }

    /// Keys the section callbacks saw.
    pub fn keys(&self, count: usize, patience: Duration) -> Vec<String> {
        self.keys.wait(count, patience)
    }

    /// Presses `key` through mpv's input layer.
    pub fn press(&self, key: &str) -> Result<()> {
        self.send_ok(vec![json!("keypress"), json!(key)])
    }

    /// Shows `text`, removing it after `timeout` when given.
    pub fn show(&mut self, text: &str, timeout: Option<Duration>) -> Result<()> {
        let id = self.client()?.create_osd_message(text, timeout)?;
        self.messages.insert(text.to_owned(), id);
        Ok(())
    }

    fn message_id(&self, text: &str) -> Result<OsdId> {
        self.messages
            .get(text)
            .copied()
            .with_context(|| format!("no message showing {text}"))
    }

    /// Replaces the message created with `old` by `new`.
    pub fn edit(&mut self, old: &str, new: &str) -> Result<()> {
        let id = self.message_id(old)?;
        self.client()?.edit_osd_message(id, new, None)?;
        self.messages.insert(new.to_owned(), id);
        Ok(())
    }

    /// Removes the message showing `text`.
    pub fn remove(&self, text: &str) -> Result<()> {
        let id = self.message_id(text)?;
        self.client()?.delete_osd_message(id, None)?;
        Ok(())
    }

    /// Texts currently in the overlay registry.
    pub fn overlay(&self) -> Result<Vec<String>> {
        Ok(self
            .client()?
            .osd_messages()
            .iter()
            .map(|(_, message)| message.text().text().to_owned())
            .collect())
    }

    /// Waits until the overlay registry holds exactly `expected`.
    pub fn wait_for_overlay(&self, expected: &[&str], patience: Duration) -> Result<()> {
        let deadline = Instant::now() + patience;
        loop {
            let current = self.overlay()?;
            if current == expected {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("overlay shows {current:?}, expected {expected:?}");
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Last overlay command mpv received.
    pub fn last_render(&self) -> Result<Vec<Value>> {
        self.fake()?
            .commands_named("osd-overlay")
            .pop()
            .context("mpv never received an overlay command")
    }

    /// Sends `get_property` from a background thread.
    pub fn spawn_background_read(&mut self, property: &str) -> Result<()> {
        let client = self.client()?.clone();
        let name = property.to_owned();
        let handle = thread::Builder::new()
            .name(String::from("background-command"))
            .spawn(move || client.get_property(&name))
            .context("spawn background command")?;
        self.background = Some(handle);
        Ok(())
    }

    /// Outcome of the background command.
    pub fn join_background(&mut self) -> Result<Result<Reply, ClientError>> {
        let handle = self.background.take().context("no background command")?;
        handle
            .join()
            .map_err(|_| anyhow!("background command panicked"))
    }

    /// Waits for the client's reader to stop.
    pub fn wait_until_dead(&self, patience: Duration) -> Result<()> {
        let deadline = Instant::now() + patience;
        while self.client()?.is_alive() {
            if Instant::now() >= deadline {
                bail!("client still alive after {patience:?}");
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    /// Asks the client for its name and keeps the answer.
    pub fn request_name(&mut self) -> Result<()> {
        let name = self.client()?.client_name()?.to_owned();
        self.names.push(name);
        Ok(())
    }

    /// Names returned by [`TestWorld::request_name`].
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Asks mpv to quit, keeping the error.
    pub fn quit(&mut self) -> Result<()> {
        let outcome = self.client()?.quit();
        self.record(outcome);
        Ok(())
    }
}
