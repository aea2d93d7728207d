//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use metabridge_config::{ChannelPreparationError, Config, ConfigError};

use crate::dispatch::HandlerRegistry;
use crate::health::HealthReporter;
use crate::server::{DrainReport, IpcServer, ServerError, ServerOptions};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Configuration source used during bootstrap.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader reading the process arguments, environment and configuration file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_process()
    }
}

/// Loader returning a pre-resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {source}")]
    Validation {
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    /// The channel's parent directory could not be prepared.
    #[error("failed to prepare channel: {source}")]
    Channel {
        #[source]
        source: ChannelPreparationError,
    },
}

/// Bootstrapped daemon, ready to serve.
pub struct Daemon {
    config: Config,
    server: IpcServer,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Channel server.
    #[must_use]
    pub fn server(&self) -> &IpcServer {
        &self.server
    }

    /// Telemetry handle, mainly for tests.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts the channel server and reports the outcome.
    ///
    /// # Errors
    ///
    /// Propagates [`ServerError`] from [`IpcServer::start`].
    pub fn start(&self) -> Result<(), ServerError> {
        match self.server.start() {
            Ok(()) => {
                self.reporter.server_started(&self.config);
                Ok(())
            }
            Err(error) => {
                self.reporter.server_failed(&error);
                Err(error)
            }
        }
    }

    /// Drains the channel server. Returns `None` when it was not running.
    pub fn stop(&self) -> Option<DrainReport> {
        let report = self.server.stop()?;
        self.reporter.server_stopped(&report);
        Some(report)
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon with the supplied collaborators.
///
/// Loads and validates configuration, installs telemetry, prepares the
/// channel directory and builds a stopped [`IpcServer`] serving `registry`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    registry: HandlerRegistry,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let result = prepare(loader);
    let (config, telemetry) = match result {
        Ok(prepared) => prepared,
        Err(error) => {
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let server = IpcServer::new(
        config.channel().clone(),
        ServerOptions::from_config(&config),
        registry,
    );
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        server,
        telemetry,
        reporter,
    })
}

fn prepare(loader: &dyn ConfigLoader) -> Result<(Config, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::Validation { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .channel()
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Channel { source })?;
    Ok((config, telemetry))
}
