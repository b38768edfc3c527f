use std::fmt;

use crate::Color;

/// Line separator understood inside a single ASS event.
pub const LINE_BREAK: &str = "\\N";

const FONT_SIZE: &str = "fs";
const BORDER_SIZE: &str = "bord";
const BORDER_COLOR: &str = "3c";
const PRIMARY_COLOR: &str = "1c";

/// Plain text paired with ASS style overrides.
///
/// Overrides are emitted in the order they were last set, so the most
/// recently applied tag renders last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    text: String,
    style: Vec<(&'static str, String)>,
}

impl Text {
    /// Wraps `text` in the default overlay style: 40pt white glyphs with a
    /// one pixel black border.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let mut styled = Self {
            text: text.into(),
            style: Vec::new(),
        };
        styled.set(FONT_SIZE, "40".to_owned());
        styled.set(BORDER_SIZE, "1".to_owned());
        styled.set(BORDER_COLOR, Color::black().to_script());
        styled.set(PRIMARY_COLOR, Color::white().to_script());
        styled
    }

    /// Sets the font size in points.
    #[must_use]
    pub fn font_size(mut self, size: u32) -> Self {
        self.set(FONT_SIZE, size.to_string());
        self
    }

    /// Sets the border width and colour.
    #[must_use]
    pub fn border(mut self, size: u32, color: Color) -> Self {
        self.set(BORDER_SIZE, size.to_string());
        self.set(BORDER_COLOR, color.to_script());
        self
    }

    /// Sets the glyph fill colour.
    #[must_use]
    pub fn color(mut self, color: Color) -> Self {
        self.set(PRIMARY_COLOR, color.to_script());
        self
    }

    /// The unstyled text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Renders override tags followed by the text.
    #[must_use]
    pub fn to_script(&self) -> String {
        let mut script: String = self
            .style
            .iter()
            .map(|(tag, value)| format!("{{\\{tag}{value}}}"))
            .collect();
        script.push_str(&self.text);
        script
    }

    fn set(&mut self, tag: &'static str, value: String) {
        self.style.retain(|(existing, _)| *existing != tag);
        self.style.push((tag, value));
    }
}

impl From<&str> for Text {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Text {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Text {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_script())
    }
}
