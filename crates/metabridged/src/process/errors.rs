use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::dispatch::RegistryError;
use crate::server::ServerError;

use super::shutdown::ShutdownError;

/// Errors that end the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The built-in handler registry could not be assembled.
    #[error("failed to build handler registry: {0}")]
    Registry(#[from] RegistryError),
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The channel server failed to start.
    #[error("failed to start channel server: {0}")]
    Server(#[from] ServerError),
    /// Waiting for a termination signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}
