use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::handlers::builtin_registry;
use crate::health::{HealthReporter, StructuredHealthReporter};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the daemon with the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, startup or signal handling fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal,
    )
}

/// Runs the daemon with injected collaborators.
///
/// The server is always drained before this returns, including when waiting
/// for the shutdown signal fails.
///
/// # Errors
///
/// See [`run_daemon`].
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let registry = builtin_registry()?;
    let daemon = bootstrap_with(loader, reporter, registry)?;
    daemon.start()?;
    let waited = shutdown.wait();
    daemon.stop();
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    waited.map_err(LaunchError::from)
}
