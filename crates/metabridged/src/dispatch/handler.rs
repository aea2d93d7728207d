//! Capability interface implemented by action handlers.

use serde_json::Value;
use thiserror::Error;

use super::request::Request;

/// Business logic invoked for one registered action.
///
/// Handlers are shared across every acceptor thread and may run concurrently
/// for different connections. Any state they touch must carry its own
/// synchronisation.
#[cfg_attr(test, mockall::automock)]
pub trait ActionHandler: Send + Sync {
    /// Handles a request and returns the value placed in `data`.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] whose message becomes the response `error`.
    fn handle(&self, request: &Request) -> Result<Value, HandlerError>;
}

impl<F> ActionHandler for F
where
    F: Fn(&Request) -> Result<Value, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &Request) -> Result<Value, HandlerError> {
        self(request)
    }
}

/// Failures reported by handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// A required parameter was absent.
    #[error("missing required parameter '{name}'")]
    MissingParameter { name: String },

    /// A parameter was present with the wrong shape.
    #[error("parameter '{name}' must be {expected}")]
    InvalidParameter { name: String, expected: String },

    /// The request lacked an `objectType`.
    #[error("action requires an objectType")]
    MissingObjectType,

    /// The addressed object does not exist.
    #[error("{object_type} '{name}' not found")]
    NotFound { object_type: String, name: String },

    /// The object already exists.
    #[error("{object_type} '{name}' already exists")]
    AlreadyExists { object_type: String, name: String },

    /// Any other failure, reported verbatim.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            expected: expected.into(),
        }
    }

    /// Creates a free-form failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
