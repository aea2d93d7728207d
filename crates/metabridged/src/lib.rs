//! Local IPC server for the metabridge automation bridge.
//!
//! The daemon exposes one well-known channel (a Unix domain socket, or
//! loopback TCP where sockets are unavailable). Clients exchange
//! newline-delimited JSON messages over it: each request names an `action`,
//! which the [`Dispatcher`] routes to a registered [`ActionHandler`], and
//! each response echoes the request `id`.
//!
//! A fixed pool of acceptor threads serves connections; each acceptor owns a
//! connection until the client disconnects, answering its requests strictly
//! in order. [`IpcServer::stop`] cancels the pool and blocks until every
//! in-flight response has been written.
//!
//! ```no_run
//! use metabridge_config::ChannelEndpoint;
//! use metabridged::{IpcServer, ServerOptions, builtin_registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = IpcServer::new(
//!     ChannelEndpoint::unix("/tmp/metabridge/metabridged.sock"),
//!     ServerOptions::default(),
//!     builtin_registry()?,
//! );
//! server.start()?;
//! // ... serve ...
//! server.stop();
//! # Ok(())
//! # }
//! ```

mod bootstrap;
pub mod dispatch;
pub mod framing;
pub mod handlers;
mod health;
mod process;
pub mod server;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use dispatch::{
    ActionHandler, DispatchError, Dispatcher, HandlerError, HandlerRegistry, RegistryBuilder,
    RegistryError, Request, Response,
};
pub use handlers::builtin_registry;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use server::{DrainReport, IpcServer, ServerError, ServerOptions, ShutdownToken};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
