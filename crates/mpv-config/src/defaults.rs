use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

/// Default log filter expression used by the client.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default number of dispatcher worker threads.
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

/// Default exclusive lower bound for allocated ids.
///
/// mpv treats id 0 as "no id", so allocation never yields this value.
pub const DEFAULT_ID_FLOOR: i64 = 0;

/// Default inclusive upper bound for allocated ids.
pub const DEFAULT_ID_CEILING: i64 = i64::MAX;

/// File name of the IPC socket inside the runtime directory.
pub const SOCKET_FILE_NAME: &str = "mpv.sock";

/// Default log filter expression used by the client.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the client.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Computes the default mpv IPC socket path.
#[must_use]
pub fn default_socket_path() -> Utf8PathBuf {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("mpv-ipc");
    if apply_namespace {
        base.push(user_namespace());
    }

    base.join(SOCKET_FILE_NAME)
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
const fn runtime_base_directory() -> Option<Utf8PathBuf> {
    None
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn user_namespace() -> String {
    String::from("shared")
}
