//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use metabridge_config::Config;

use crate::bootstrap::BootstrapError;
use crate::server::{DrainReport, ServerError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for daemon lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the acceptor pool is serving.
    fn server_started(&self, config: &Config);

    /// Invoked when the server could not start.
    fn server_failed(&self, error: &ServerError);

    /// Invoked after the acceptor pool has drained.
    fn server_stopped(&self, report: &DrainReport);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn server_started(&self, config: &Config) {
        (**self).server_started(config);
    }

    fn server_failed(&self, error: &ServerError) {
        (**self).server_failed(error);
    }

    fn server_stopped(&self, report: &DrainReport) {
        (**self).server_stopped(report);
    }
}

/// Reporter that records lifecycle events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            channel = %config.channel(),
            acceptors = config.acceptors(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn server_started(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_started",
            channel = %config.channel(),
            acceptors = config.acceptors(),
            "channel server ready"
        );
    }

    fn server_failed(&self, error: &ServerError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "server_failed",
            error = %error,
            "channel server failed to start"
        );
    }

    fn server_stopped(&self, report: &DrainReport) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopped",
            joined = report.joined,
            panicked = report.panicked,
            "channel server drained"
        );
    }
}
