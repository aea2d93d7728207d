//! Shared configuration for the metabridge daemon.
//!
//! Values are layered with `ortho_config`: built-in defaults, then an optional
//! configuration file (`--config-path` or `METABRIDGE_CONFIG_PATH`), then
//! `METABRIDGE_*` environment variables, then command-line flags.

mod channel;
mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use channel::{ChannelEndpoint, ChannelParseError, ChannelPreparationError};
pub use defaults::{
    DEFAULT_ACCEPTORS, DEFAULT_LOG_FILTER, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_TCP_PORT, default_acceptors, default_channel, default_log_filter,
    default_log_filter_string, default_log_format, default_max_message_bytes,
    default_poll_interval_ms,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "METABRIDGE")]
pub struct Config {
    /// Channel the daemon binds.
    #[ortho_config(default = default_channel())]
    pub channel: ChannelEndpoint,
    /// Number of persistent acceptors, and therefore of concurrently served
    /// connections.
    #[ortho_config(default = DEFAULT_ACCEPTORS)]
    pub acceptors: usize,
    /// Upper bound on a single unframed message.
    #[ortho_config(default = DEFAULT_MAX_MESSAGE_BYTES)]
    pub max_message_bytes: usize,
    /// How often blocked accept and read calls re-check for shutdown.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            acceptors: default_acceptors(),
            max_message_bytes: default_max_message_bytes(),
            poll_interval_ms: default_poll_interval_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load_from_process() -> Result<Self, Arc<OrthoError>> {
        Self::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name, matching
    /// `std::env::args_os`.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::load_from_iter(args)
    }

    /// Rejects values that would leave the daemon unable to serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acceptors == 0 {
            return Err(ConfigError::NoAcceptors);
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::ZeroMessageBound);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// Channel the daemon binds.
    #[must_use]
    pub fn channel(&self) -> &ChannelEndpoint {
        &self.channel
    }

    /// Number of persistent acceptors.
    #[must_use]
    pub fn acceptors(&self) -> usize {
        self.acceptors
    }

    /// Upper bound on a single unframed message.
    #[must_use]
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Shutdown poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Semantic errors in an otherwise well-formed configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `acceptors` was zero.
    #[error("acceptors must be a positive integer")]
    NoAcceptors,
    /// `max_message_bytes` was zero.
    #[error("max_message_bytes must be a positive integer")]
    ZeroMessageBound,
    /// `poll_interval_ms` was zero.
    #[error("poll_interval_ms must be a positive integer")]
    ZeroPollInterval,
}
