//! On-screen message registry rendered into mpv's single overlay slot.
//!
//! Messages are kept in insertion order. Every mutation re-renders the whole
//! registry: the styled texts joined with the ASS line break, or the `none`
//! form when nothing is left. Mutations and their render run under one lock,
//! so the most recent render always matches the registry contents.
//!
//! Timed removals run on their own threads. A removal scheduled by
//! [`OverlayManager::create`] or [`OverlayManager::edit`] only fires if the
//! message was not edited again in the meantime. It is scheduled before the
//! render, so a failed render never leaves a timed message on screen for
//! good.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use mpv_ass::{LINE_BREAK, Text};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::ids::IdAllocator;
use crate::protocol::Reply;

const OVERLAY_TARGET: &str = "mpv_ipc::overlay";

/// Overlay slot owned by this client.
pub const OVERLAY_ID: i64 = 999;

/// Handle of an on-screen message.
pub type OsdId = i64;

/// Issues the render command.
pub(crate) trait OverlaySink: Send + Sync {
    /// Sends `command` and returns mpv's reply.
    fn send_command(&self, command: &[Value]) -> Result<Reply, ClientError>;
}

/// A message currently shown on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsdMessage {
    text: Text,
    generation: u64,
}

impl OsdMessage {
    /// The styled text.
    #[must_use]
    pub const fn text(&self) -> &Text {
        &self.text
    }
}

/// Builds the overlay command for the given messages.
#[must_use]
pub fn render_command<'a>(texts: impl IntoIterator<Item = &'a Text>) -> Vec<Value> {
    let scripts: Vec<String> = texts.into_iter().map(Text::to_script).collect();
    if scripts.is_empty() {
        vec![json!("osd-overlay"), json!(OVERLAY_ID), json!("none"), json!("")]
    } else {
        vec![
            json!("osd-overlay"),
            json!(OVERLAY_ID),
            json!("ass-events"),
            json!(scripts.join(LINE_BREAK)),
        ]
    }
}

/// Owner of the on-screen message registry.
pub(crate) struct OverlayManager {
    sink: Arc<dyn OverlaySink>,
    ids: Arc<IdAllocator>,
    generations: AtomicU64,
    messages: Mutex<Vec<(OsdId, OsdMessage)>>,
}

impl OverlayManager {
    pub(crate) fn new(sink: Arc<dyn OverlaySink>, ids: Arc<IdAllocator>) -> Self {
        Self {
            sink,
            ids,
            generations: AtomicU64::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(OsdId, OsdMessage)>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    /// Shows `text` and returns its handle.
    ///
    /// A positive `timeout` schedules the message's removal.
    pub(crate) fn create(
        self: &Arc<Self>,
        text: Text,
        timeout: Option<Duration>,
    ) -> Result<OsdId, ClientError> {
        let id = self.ids.next_id();
        self.store(id, text, timeout, true)?;
        Ok(id)
    }

    /// Replaces the text shown under `id`, inserting it when absent.
    ///
    /// Any removal pending from an earlier create or edit is cancelled; a
    /// positive `timeout` schedules a new one.
    pub(crate) fn edit(
        self: &Arc<Self>,
        id: OsdId,
        text: Text,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        self.store(id, text, timeout, false)
    }

    /// Inserts or replaces `id`, schedules its removal, then renders.
    ///
    /// The removal is scheduled under the registry lock, so it cannot run
    /// before the new generation is stored. When the render fails a fresh
    /// message is taken out again, since its caller never learns its id.
    fn store(
        self: &Arc<Self>,
        id: OsdId,
        text: Text,
        timeout: Option<Duration>,
        fresh: bool,
    ) -> Result<(), ClientError> {
        let generation = self.next_generation();
        let mut messages = self.lock();
        let message = OsdMessage { text, generation };
        match messages.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, slot)) => *slot = message,
            None => messages.push((id, message)),
        }
        if let Some(delay) = timeout.filter(|pending| !pending.is_zero()) {
            self.schedule_removal(id, Some(generation), delay);
        }

        let rendered = self.render(&messages);
        if rendered.is_err() && fresh {
            warn!(target: OVERLAY_TARGET, id, "overlay render failed; dropping new message");
            messages.retain(|(existing, _)| *existing != id);
        }
        rendered
    }

    /// Removes `id` now, or after `delay` without blocking the caller.
    pub(crate) fn delete(
        self: &Arc<Self>,
        id: OsdId,
        delay: Option<Duration>,
    ) -> Result<(), ClientError> {
        match delay.filter(|pending| !pending.is_zero()) {
            Some(pending) => {
                self.schedule_removal(id, None, pending);
                Ok(())
            }
            None => self.remove(id, None),
        }
    }

    /// Removes every message.
    pub(crate) fn clear(&self) -> Result<(), ClientError> {
        let mut messages = self.lock();
        messages.clear();
        self.render(&messages)
    }

    /// Snapshot of the registry in render order.
    pub(crate) fn snapshot(&self) -> Vec<(OsdId, OsdMessage)> {
        self.lock().clone()
    }

    fn remove(&self, id: OsdId, generation: Option<u64>) -> Result<(), ClientError> {
        let mut messages = self.lock();
        if let Some(expected) = generation {
            let current = messages
                .iter()
                .find(|(existing, _)| *existing == id)
                .map(|(_, message)| message.generation);
            if current != Some(expected) {
                debug!(target: OVERLAY_TARGET, id, "skipping stale timed removal");
                return Ok(());
            }
        }
        messages.retain(|(existing, _)| *existing != id);
        self.render(&messages)
    }

    fn schedule_removal(self: &Arc<Self>, id: OsdId, generation: Option<u64>, delay: Duration) {
        let manager = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("mpv-ipc-osd-{id}"))
            .spawn(move || {
                thread::sleep(delay);
                if let Err(error) = manager.remove(id, generation) {
                    warn!(target: OVERLAY_TARGET, id, %error, "timed overlay removal failed");
                }
            });
        if let Err(error) = spawned {
            warn!(target: OVERLAY_TARGET, id, %error, "could not schedule overlay removal");
        }
    }

    fn render(&self, messages: &[(OsdId, OsdMessage)]) -> Result<(), ClientError> {
        let command = render_command(messages.iter().map(|(_, message)| &message.text));
        debug!(target: OVERLAY_TARGET, messages = messages.len(), "rendering overlay");
        self.sink
            .send_command(&command)?
            .into_data("osd-overlay")
            .map(drop)
    }
}
