//! Channel server lifecycle.
//!
//! [`IpcServer`] binds the channel, runs a fixed pool of acceptor threads and
//! drains them on [`IpcServer::stop`]. Each acceptor serves one connection at
//! a time to completion before accepting the next.

mod acceptor;
mod errors;
mod token;
mod worker;

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use metabridge_config::{
    ChannelEndpoint, Config, default_acceptors, default_max_message_bytes,
    default_poll_interval_ms,
};

use crate::dispatch::{Dispatcher, HandlerRegistry};
use crate::transport::ChannelListener;

use self::acceptor::Acceptor;
pub use self::errors::ServerError;
pub use self::token::ShutdownToken;
pub use self::worker::ConnectionOutcome;

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Tuning for the acceptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Number of acceptor threads.
    pub acceptors: usize,
    /// Upper bound on one unframed message.
    pub max_message_bytes: usize,
    /// How often idle accept and read calls re-check for shutdown.
    pub poll_interval: Duration,
}

impl ServerOptions {
    /// Extracts server tuning from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            acceptors: config.acceptors(),
            max_message_bytes: config.max_message_bytes(),
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            acceptors: default_acceptors(),
            max_message_bytes: default_max_message_bytes(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
        }
    }
}

/// Summary of a completed drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Acceptor threads joined.
    pub joined: usize,
    /// Acceptor threads that had panicked.
    pub panicked: usize,
}

struct RunningServer {
    token: ShutdownToken,
    listener: ChannelListener,
    acceptors: Vec<JoinHandle<()>>,
}

/// Local IPC server owning the acceptor pool.
///
/// `start` and `stop` are idempotent and may be called from any thread. A
/// stopped server can be started again. Dropping a running server drains it
/// as `stop` would.
pub struct IpcServer {
    endpoint: ChannelEndpoint,
    options: ServerOptions,
    dispatcher: Dispatcher,
    state: Mutex<Option<RunningServer>>,
}

impl IpcServer {
    /// Creates a stopped server for `endpoint`.
    #[must_use]
    pub fn new(endpoint: ChannelEndpoint, options: ServerOptions, registry: HandlerRegistry) -> Self {
        Self {
            endpoint,
            options,
            dispatcher: Dispatcher::new(registry),
            state: Mutex::new(None),
        }
    }

    /// Binds the channel and launches the acceptor pool.
    ///
    /// Returns once every acceptor is running. Calling `start` on a running
    /// server logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the pool is empty, the channel cannot be
    /// bound, or an acceptor thread cannot be spawned. Acceptors launched
    /// before the failure are stopped and joined first.
    pub fn start(&self) -> Result<(), ServerError> {
        let mut state = self.lock_state();
        if state.is_some() {
            warn!(
                target: SERVER_TARGET,
                endpoint = %self.endpoint,
                "server already running"
            );
            return Ok(());
        }
        if self.options.acceptors == 0 {
            return Err(ServerError::NoAcceptors);
        }

        let listener = ChannelListener::bind(&self.endpoint)?;
        let token = ShutdownToken::new();
        let mut acceptors = Vec::with_capacity(self.options.acceptors);
        for index in 0..self.options.acceptors {
            match self.spawn_acceptor(index, &listener, &token) {
                Ok(handle) => acceptors.push(handle),
                Err(error) => {
                    token.cancel();
                    join_all(acceptors);
                    listener.cleanup();
                    return Err(error);
                }
            }
        }

        info!(
            target: SERVER_TARGET,
            endpoint = %self.endpoint,
            acceptors = acceptors.len(),
            actions = self.dispatcher.registry().len(),
            "server started"
        );
        *state = Some(RunningServer {
            token,
            listener,
            acceptors,
        });
        Ok(())
    }

    /// Cancels the pool and waits for every acceptor to drain.
    ///
    /// In-flight requests are answered before their connections close. When
    /// this returns no acceptor is reading, dispatching or writing. Returns
    /// `None` when the server was not running.
    pub fn stop(&self) -> Option<DrainReport> {
        let mut state = self.lock_state();
        let running = state.take()?;
        running.token.cancel();
        let report = join_all(running.acceptors);
        running.listener.cleanup();
        info!(
            target: SERVER_TARGET,
            endpoint = %self.endpoint,
            joined = report.joined,
            panicked = report.panicked,
            "server stopped"
        );
        Some(report)
    }

    /// Reports whether the acceptor pool is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_state().is_some()
    }

    /// Bound TCP address while running; `None` for Unix channels.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_state()
            .as_ref()
            .and_then(|running| running.listener.local_addr())
    }

    /// Configured channel.
    #[must_use]
    pub fn endpoint(&self) -> &ChannelEndpoint {
        &self.endpoint
    }

    /// Pool tuning.
    #[must_use]
    pub fn options(&self) -> ServerOptions {
        self.options
    }

    fn spawn_acceptor(
        &self,
        index: usize,
        listener: &ChannelListener,
        token: &ShutdownToken,
    ) -> Result<JoinHandle<()>, ServerError> {
        let acceptor = Acceptor::new(
            index,
            listener.try_clone()?,
            self.dispatcher.clone(),
            token.clone(),
            self.options,
        );
        thread::Builder::new()
            .name(format!("{}-acceptor-{index}", env!("CARGO_PKG_NAME")))
            .spawn(move || acceptor.run())
            .map_err(|source| ServerError::Spawn { index, source })
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<RunningServer>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for IpcServer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IpcServer")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = state.take() {
            running.token.cancel();
            let report = join_all(running.acceptors);
            running.listener.cleanup();
            debug!(
                target: SERVER_TARGET,
                endpoint = %self.endpoint,
                joined = report.joined,
                "server drained on drop"
            );
        }
    }
}

fn join_all(acceptors: Vec<JoinHandle<()>>) -> DrainReport {
    let mut report = DrainReport {
        joined: 0,
        panicked: 0,
    };
    for handle in acceptors {
        let name = handle.thread().name().map(str::to_owned);
        if handle.join().is_err() {
            report.panicked += 1;
            warn!(
                target: SERVER_TARGET,
                thread = name.as_deref().unwrap_or("<unnamed>"),
                "acceptor panicked before drain"
            );
        }
        report.joined += 1;
    }
    report
}
