//! Error types for request dispatch failures.
//!
//! Every variant is rendered into the `error` field of a failure response;
//! none of them escape the dispatcher.

use thiserror::Error;

use super::handler::HandlerError;

/// Errors surfaced while parsing, resolving, or invoking a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame was not valid UTF-8.
    #[error("malformed request: {message}")]
    InvalidEncoding { message: String },

    /// The frame could not be parsed as JSON.
    #[error("malformed request: {message}")]
    MalformedJson {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The JSON did not match the request schema.
    #[error("invalid request structure: {message}")]
    InvalidStructure { message: String },

    /// No handler is registered for the action.
    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    /// The handler reported a failure.
    #[error("{0}")]
    Handler(#[from] HandlerError),

    /// The handler panicked.
    #[error("handler for '{action}' panicked: {message}")]
    HandlerPanicked { action: String, message: String },
}

impl DispatchError {
    /// Creates an encoding error from a UTF-8 failure.
    pub fn invalid_encoding(source: std::str::Utf8Error) -> Self {
        Self::InvalidEncoding {
            message: format!("invalid UTF-8: {source}"),
        }
    }

    /// Creates a malformed JSON error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJson {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSON error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJson {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unknown action error.
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction {
            action: action.into(),
        }
    }

    /// Creates a handler panic error.
    pub fn handler_panicked(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerPanicked {
            action: action.into(),
            message: message.into(),
        }
    }
}
