//! Request dispatch for channel messages.
//!
//! A framed message is parsed into a [`Request`], its `action` is resolved
//! against the [`HandlerRegistry`], and the handler's outcome is wrapped in a
//! correlated [`Response`].
//!
//! ## Protocol
//!
//! Clients send one JSON object per line:
//!
//! ```json
//! {"id":"7","action":"get_object","objectType":"Table","parameters":{"name":"CUSTOMER"}}
//! ```
//!
//! and receive one response line per request, in order:
//!
//! ```json
//! {"id":"7","success":true,"data":{"name":"CUSTOMER"},"processingTimeMs":0.41}
//! {"id":"8","success":false,"error":"Unknown action: frobnicate","processingTimeMs":0.02}
//! ```

mod dispatcher;
mod errors;
mod handler;
mod registry;
mod request;
mod response;

pub use self::dispatcher::Dispatcher;
pub use self::errors::DispatchError;
pub use self::handler::{ActionHandler, HandlerError};
#[cfg(test)]
pub(crate) use self::handler::MockActionHandler;
pub use self::registry::{HandlerRegistry, RegistryBuilder, RegistryError};
pub use self::request::Request;
pub use self::response::{Response, ResponseWriter};
pub(crate) use self::response::is_stalled;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
