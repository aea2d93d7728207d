#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::channel::ChannelEndpoint;

/// Loopback TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9780;

/// Number of persistent acceptors started by the daemon.
pub const DEFAULT_ACCEPTORS: usize = 10;

/// Largest single message accepted on the channel, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Interval at which blocked workers re-check for shutdown, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value for serde and `ortho_config` defaults.
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default acceptor count.
pub const fn default_acceptors() -> usize {
    DEFAULT_ACCEPTORS
}

/// Default message size bound.
pub const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Default shutdown poll interval.
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Computes the well-known channel for the daemon.
pub fn default_channel() -> ChannelEndpoint {
    default_channel_inner()
}

#[cfg(unix)]
fn default_channel_inner() -> ChannelEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("metabridge");
    if apply_namespace {
        base.push(user_namespace());
    }

    ChannelEndpoint::unix(base.join("metabridged.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

// Shared temp directories need a per-user namespace so two users never race
// for the same socket path.
#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_channel_inner() -> ChannelEndpoint {
    ChannelEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
