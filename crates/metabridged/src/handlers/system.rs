use serde_json::{Value, json};

use crate::dispatch::{HandlerError, RegistryBuilder, RegistryError, Request};

/// Liveness probe action.
pub const PING: &str = "ping";
/// Action listing every registered action.
pub const DESCRIBE_ACTIONS: &str = "describe_actions";

/// Answers `ping` with the daemon version.
///
/// # Errors
///
/// Never fails.
pub fn ping(_request: &Request) -> Result<Value, HandlerError> {
    Ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Registers `describe_actions`, which reports the actions in `builder` plus
/// itself.
pub(super) fn register_describe_actions(
    builder: RegistryBuilder,
) -> Result<RegistryBuilder, RegistryError> {
    let mut actions = builder.action_keys();
    actions.push(DESCRIBE_ACTIONS.to_owned());
    actions.sort_unstable();
    builder.register(
        DESCRIBE_ACTIONS,
        move |_request: &Request| -> Result<Value, HandlerError> {
            Ok(json!({ "actions": actions }))
        },
    )
}
