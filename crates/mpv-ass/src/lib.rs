//! Minimal SubStation Alpha (ASS) markup builder.
//!
//! mpv renders on-screen overlays from ASS event text. This crate turns plain
//! strings plus a handful of style overrides into the `{\tag value}` markup
//! the overlay renderer understands. Everything here is pure string building.

mod color;
mod text;

pub use color::Color;
pub use text::{LINE_BREAK, Text};
