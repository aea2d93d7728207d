//! Built-in action handlers.
//!
//! The daemon ships with diagnostic actions and an in-memory metadata catalog
//! that stands in for the vendor store.

mod catalog;
mod system;

use std::sync::Arc;

use crate::dispatch::{HandlerRegistry, RegistryBuilder, RegistryError};

pub use self::catalog::{CatalogHandler, CatalogObject, CatalogOperation, InMemoryCatalog};
pub use self::system::{DESCRIBE_ACTIONS, PING, ping};

/// Builds the registry served by the daemon binary.
///
/// # Errors
///
/// Returns [`RegistryError`] if two built-in actions collide.
pub fn builtin_registry() -> Result<HandlerRegistry, RegistryError> {
    let catalog = Arc::new(InMemoryCatalog::default());
    let builder = HandlerRegistry::builder().register(PING, ping)?;
    let builder = register_catalog(builder, &catalog)?;
    Ok(system::register_describe_actions(builder)?.build())
}

/// Registers every catalog action against `catalog`.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] when a catalog action is already
/// registered.
pub fn register_catalog(
    builder: RegistryBuilder,
    catalog: &Arc<InMemoryCatalog>,
) -> Result<RegistryBuilder, RegistryError> {
    CatalogOperation::ALL
        .into_iter()
        .try_fold(builder, |builder, operation| {
            builder.register(operation.action(), catalog.handler(operation))
        })
}
