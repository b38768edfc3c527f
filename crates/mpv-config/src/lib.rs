//! Layered configuration for the mpv IPC client.
//!
//! Values resolve from built-in defaults, then an optional TOML file
//! (`--config-path` or `MPV_IPC_CONFIG_PATH`), then `MPV_IPC_*` environment
//! variables, and finally command-line flags. Later layers win.

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_DISPATCH_WORKERS, DEFAULT_ID_CEILING, DEFAULT_ID_FLOOR, DEFAULT_LOG_FILTER,
    SOCKET_FILE_NAME, default_log_filter, default_log_filter_string, default_log_format,
    default_socket_path,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Client configuration shared by every consumer of the IPC engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MPV_IPC")]
pub struct Config {
    /// Path to the socket mpv was started with via `--input-ipc-server`.
    #[ortho_config(default = crate::defaults::default_socket_path())]
    pub socket_path: Utf8PathBuf,
    /// Tracing filter expression, e.g. `info` or `mpv_ipc=debug`.
    #[ortho_config(default = crate::defaults::default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = crate::defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Number of threads running event callbacks.
    #[ortho_config(default = crate::defaults::DEFAULT_DISPATCH_WORKERS)]
    pub dispatch_workers: usize,
    /// Exclusive lower bound of allocated request and observer ids.
    #[ortho_config(default = crate::defaults::DEFAULT_ID_FLOOR)]
    pub id_floor: i64,
    /// Inclusive upper bound of allocated request and observer ids.
    #[ortho_config(default = crate::defaults::DEFAULT_ID_CEILING)]
    pub id_ceiling: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
            id_floor: DEFAULT_ID_FLOOR,
            id_ceiling: DEFAULT_ID_CEILING,
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the program name.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer fails to parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Socket the client connects to.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        self.socket_path.as_path()
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Dispatcher pool size, never less than one.
    #[must_use]
    pub fn dispatch_workers(&self) -> usize {
        self.dispatch_workers.max(1)
    }

    /// Bounds of the id allocator as `(floor, ceiling)`.
    #[must_use]
    pub const fn id_bounds(&self) -> (i64, i64) {
        (self.id_floor, self.id_ceiling)
    }
}
