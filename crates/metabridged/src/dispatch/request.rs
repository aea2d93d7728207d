//! Request deserialisation for the dispatch loop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DispatchError;
use super::handler::HandlerError;

/// A parsed client request.
///
/// `id` is an opaque correlation token echoed in the response. Identical ids
/// on different connections are unrelated. On the wire it is a string or
/// `null`; any other JSON type makes the request structurally invalid and is
/// answered with a `null` id.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Correlation token.
    #[serde(default)]
    pub id: Option<String>,
    /// Registered action name.
    pub action: String,
    /// Metadata object type the action targets, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    /// Action-specific arguments.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Request {
    /// Parses one framed message.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedJson` for empty or unparseable input and
    /// `DispatchError::InvalidStructure` when the JSON is not an object or does
    /// not match the request schema (for example a missing `action`).
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }

        let value: Value = serde_json::from_str(trimmed).map_err(DispatchError::from_json_error)?;
        if !value.is_object() {
            return Err(DispatchError::invalid_structure(
                "request must be a JSON object",
            ));
        }
        serde_json::from_value(value)
            .map_err(|error| DispatchError::invalid_structure(error.to_string()))
    }

    /// Returns the object type or a handler error when absent.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::MissingObjectType` when `objectType` is absent or
    /// blank.
    pub fn require_object_type(&self) -> Result<&str, HandlerError> {
        self.object_type
            .as_deref()
            .map(str::trim)
            .filter(|object_type| !object_type.is_empty())
            .ok_or(HandlerError::MissingObjectType)
    }

    /// Returns a string parameter.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::MissingParameter` when absent and
    /// `HandlerError::InvalidParameter` when not a string.
    pub fn require_str(&self, name: &str) -> Result<&str, HandlerError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Err(HandlerError::missing_parameter(name)),
            Some(Value::String(value)) => Ok(value.as_str()),
            Some(_) => Err(HandlerError::invalid_parameter(name, "a string")),
        }
    }

    /// Returns an optional object parameter.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::InvalidParameter` when present but not an object.
    pub fn optional_object(&self, name: &str) -> Result<Option<&Map<String, Value>>, HandlerError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(HandlerError::invalid_parameter(name, "an object")),
        }
    }
}

/// Recovers the correlation id from a message that failed to parse.
///
/// Only JSON objects carrying a string `id` yield a value.
pub(crate) fn recover_id(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    match value.get("id") {
        Some(Value::String(id)) => Some(id.clone()),
        _ => None,
    }
}
