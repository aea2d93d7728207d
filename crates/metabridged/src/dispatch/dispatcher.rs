//! Turns framed messages into correlated responses.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::errors::DispatchError;
use super::registry::HandlerRegistry;
use super::request::{self, Request};
use super::response::Response;
use super::DISPATCH_TARGET;

/// Parses, resolves, and invokes requests against a shared registry.
///
/// Dispatch never fails: every parse, lookup, or handler fault is folded into
/// a failure [`Response`]. The only shared state touched is the read-only
/// registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The registry requests are resolved against.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Dispatches a raw frame, rejecting invalid UTF-8 before parsing.
    #[must_use]
    pub fn dispatch_frame(&self, frame: &[u8]) -> Response {
        let started = Instant::now();
        match std::str::from_utf8(frame) {
            Ok(raw) => self.dispatch_started(raw, started),
            Err(source) => {
                let error = DispatchError::invalid_encoding(source);
                warn!(target: DISPATCH_TARGET, %error, "rejected frame");
                Response::failure(None, error.to_string()).with_processing_time(started.elapsed())
            }
        }
    }

    /// Dispatches one message.
    ///
    /// The response always carries the request's `id` (or `null` when the id
    /// cannot be recovered) and the elapsed processing time.
    #[must_use]
    pub fn dispatch(&self, raw: &str) -> Response {
        self.dispatch_started(raw, Instant::now())
    }

    fn dispatch_started(&self, raw: &str, started: Instant) -> Response {
        let response = match Request::parse(raw) {
            Ok(request) => self.invoke(&request),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                Response::failure(request::recover_id(raw), error.to_string())
            }
        };
        response.with_processing_time(started.elapsed())
    }

    fn invoke(&self, request: &Request) -> Response {
        let id = request.id.clone();
        let Some(handler) = self.registry.resolve(&request.action) else {
            let error = DispatchError::unknown_action(&request.action);
            debug!(target: DISPATCH_TARGET, action = %request.action, "unknown action");
            return Response::failure(id, error.to_string());
        };

        debug!(
            target: DISPATCH_TARGET,
            action = %request.action,
            object_type = request.object_type.as_deref(),
            id = id.as_deref(),
            "dispatching request"
        );

        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
            Ok(Ok(data)) => Response::success(id, data),
            Ok(Err(source)) => {
                let error = DispatchError::from(source);
                debug!(target: DISPATCH_TARGET, action = %request.action, %error, "handler failed");
                Response::failure(id, error.to_string())
            }
            Err(payload) => {
                let error =
                    DispatchError::handler_panicked(&request.action, panic_message(&*payload));
                warn!(target: DISPATCH_TARGET, %error, "handler panicked");
                Response::failure(id, error.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_owned()
}
