//! Keybinding sections and single-shot modal input.
//!
//! A section is a named group of bindings mpv can enable and disable as a
//! unit. Each bound key runs `script-binding <client>/<section>`, which mpv
//! reports back as a `key-binding` client message addressed to the bare
//! section name. The section is defined under the qualified name so clients
//! sharing one mpv never clash.

use std::sync::atomic::{AtomicBool, Ordering};

use mpv_ass::Text;
use serde_json::json;
use tracing::{trace, warn};

use super::{CLIENT_TARGET, Client};
use crate::error::ClientError;
use crate::overlay::OsdId;
use crate::protocol::{KeyEvent, Message};

/// Key that leaves modal mode without invoking the callback.
pub const DEFAULT_EXIT_KEY: &str = "ESC";

/// Priority of a section's bindings relative to the user's own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SectionFlags {
    /// User bindings for the same keys win.
    Default,
    /// The section's bindings win over user bindings.
    #[default]
    Force,
}

impl SectionFlags {
    /// The flag as spelled in `define-section`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Force => "force",
        }
    }
}

/// How a keybinding section is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeybindingOptions {
    section: Option<String>,
    flags: SectionFlags,
}

impl KeybindingOptions {
    /// Generated section name, forced bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `name` instead of a generated section name.
    #[must_use]
    pub fn with_section(mut self, name: impl Into<String>) -> Self {
        self.section = Some(name.into());
        self
    }

    /// Sets the binding priority.
    #[must_use]
    pub const fn with_flags(mut self, flags: SectionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The requested section name, if any.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// The binding priority.
    #[must_use]
    pub const fn flags(&self) -> SectionFlags {
        self.flags
    }
}

/// Renders the `define-section` body: one `<key> script-binding <target>`
/// line per key.
pub(crate) fn bindings_text(keys: &[String], target: &str) -> String {
    keys.iter()
        .map(|key| format!("{key} script-binding {target}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Client {
    fn next_section_name(&self) -> String {
        format!("section-{}", self.inner.connection.ids.next_id())
    }

    /// Binds `keys` to `callback` in a new, enabled section and returns the
    /// section name.
    ///
    /// # Errors
    ///
    /// Returns the failure of the `client_name` lookup or of the
    /// `define-section`/`enable-section` commands. Nothing stays registered
    /// on error.
    pub fn register_keybindings<I, S, F>(
        &self,
        keys: I,
        options: KeybindingOptions,
        mut callback: F,
    ) -> Result<String, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&KeyEvent) + Send + 'static,
    {
        let bound: Vec<String> = keys.into_iter().map(Into::into).collect();
        let KeybindingOptions { section, flags } = options;
        let name = section.unwrap_or_else(|| self.next_section_name());
        let qualified = format!("{}/{name}", self.client_name()?);

        self.register_message_handler(name.clone(), move |message: &Message| match message {
            Message::Key(key) => callback(key),
            Message::Script(args) => {
                trace!(target: CLIENT_TARGET, ?args, "ignoring script message sent to a section");
            }
        });
        self.sections().insert(name.clone(), qualified.clone());

        let defined = self
            .command_data([
                json!("define-section"),
                json!(qualified),
                json!(bindings_text(&bound, &qualified)),
                json!(flags.as_str()),
            ])
            .and_then(|_| self.command_data([json!("enable-section"), json!(qualified)]));

        if let Err(error) = defined {
            self.sections().remove(&name);
            self.unregister_message_handler(&name);
            return Err(error);
        }
        Ok(name)
    }

    /// Disables `section`, clears its bindings, and drops its handler.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownSection`] when this client did not
    /// register `section`, otherwise the first failing teardown command. The
    /// handler is dropped either way.
    pub fn unregister_keybindings(&self, section: &str) -> Result<(), ClientError> {
        let removed = self.sections().remove(section);
        let Some(qualified) = removed else {
            return Err(ClientError::UnknownSection {
                section: section.to_owned(),
            });
        };

        let disabled = self.command_data([json!("disable-section"), json!(qualified)]);
        let cleared = self.command_data([json!("define-section"), json!(qualified), json!("")]);
        self.unregister_message_handler(section);

        disabled?;
        cleared?;
        Ok(())
    }

    /// Shows `message` and waits for a single press of any of `keys` or of
    /// `exit_key`.
    ///
    /// The first press removes the message and the bindings. `callback` then
    /// runs unless the pressed key was `exit_key`. Later presses are ignored.
    /// Returns the section name.
    ///
    /// # Errors
    ///
    /// Returns the failure of showing the message or of registering the
    /// bindings; the message is removed again in the latter case.
    pub fn enter_modal_mode<I, S, F>(
        &self,
        message: impl Into<Text>,
        keys: I,
        exit_key: impl Into<String>,
        mut callback: F,
    ) -> Result<String, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&KeyEvent) + Send + 'static,
    {
        let exit: String = exit_key.into();
        let mut bound: Vec<String> = keys.into_iter().map(Into::into).collect();
        if !bound.contains(&exit) {
            bound.push(exit.clone());
        }

        let overlay = self.create_osd_message(message, None)?;
        let section = self.next_section_name();
        let owner = self.downgrade();
        let armed = AtomicBool::new(true);
        let handler_section = section.clone();

        let handler = move |key: &KeyEvent| {
            if !armed.swap(false, Ordering::AcqRel) {
                return;
            }
            let Some(client) = owner.upgrade() else {
                return;
            };
            client.leave_modal_mode(overlay, &handler_section);
            if key.key != exit {
                callback(key);
            }
        };

        let options = KeybindingOptions::new().with_section(section);
        self.register_keybindings(bound, options, handler)
            .inspect_err(|_| {
                if let Err(error) = self.delete_osd_message(overlay, None) {
                    warn!(target: CLIENT_TARGET, %error, "could not remove modal message");
                }
            })
    }

    fn leave_modal_mode(&self, overlay: OsdId, section: &str) {
        if let Err(error) = self.delete_osd_message(overlay, None) {
            warn!(target: CLIENT_TARGET, %error, "could not remove modal message");
        }
        if let Err(error) = self.unregister_keybindings(section) {
            warn!(target: CLIENT_TARGET, section, %error, "could not unregister modal bindings");
        }
    }
}
