//! Closed lookup table from action names to handlers.
//!
//! The registry is assembled once at startup through [`RegistryBuilder`] and
//! is immutable afterwards, so acceptor threads share it through an `Arc`
//! without locking. Action names match ASCII case-insensitively.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::handler::ActionHandler;

/// Errors raised while assembling a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The action name was empty or whitespace.
    #[error("action name must not be empty")]
    EmptyAction,
    /// A handler was already registered under the same name.
    #[error("action '{action}' is already registered")]
    Duplicate { action: String },
}

/// Immutable mapping from action names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Starts an empty builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up the handler registered for `action`.
    #[must_use]
    pub fn resolve(&self, action: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&normalise_action(action))
    }

    /// Registered action names, sorted.
    #[must_use]
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandlerRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

/// Collects registrations before freezing them into a [`HandlerRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl RegistryBuilder {
    /// Registers `handler` under `action`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::EmptyAction` for blank names and
    /// `RegistryError::Duplicate` when the normalised name is already taken.
    pub fn register<H>(self, action: &str, handler: H) -> Result<Self, RegistryError>
    where
        H: ActionHandler + 'static,
    {
        self.register_shared(action, Arc::new(handler))
    }

    /// Registers an already shared handler under `action`.
    ///
    /// # Errors
    ///
    /// See [`RegistryBuilder::register`].
    pub fn register_shared(
        mut self,
        action: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self, RegistryError> {
        let key = normalise_action(action);
        if key.is_empty() {
            return Err(RegistryError::EmptyAction);
        }
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::Duplicate { action: key });
        }
        self.handlers.insert(key, handler);
        Ok(self)
    }

    /// Normalised names registered so far, sorted.
    #[must_use]
    pub fn action_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Freezes the registrations.
    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RegistryBuilder")
            .field("actions", &self.action_keys())
            .finish()
    }
}

fn normalise_action(action: &str) -> String {
    action.trim().to_ascii_lowercase()
}
