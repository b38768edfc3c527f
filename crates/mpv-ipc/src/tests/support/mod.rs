//! Test harness utilities for the client behavioural suites.

mod fake_mpv;
mod world;

pub use fake_mpv::CLIENT_NAME;
pub use world::{PATIENCE, QUIET, TestWorld, world};

/// Strips the double quotes feature files put around step arguments.
pub fn unquote(text: &str) -> &str {
    text.trim().trim_matches('"')
}

/// Splits a quoted list such as `"foo, bar"` into its items.
pub fn items(text: &str) -> Vec<&str> {
    let list = unquote(text);
    if list.is_empty() {
        return Vec::new();
    }
    list.split(',').map(str::trim).collect()
}
