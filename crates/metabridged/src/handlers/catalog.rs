//! In-memory metadata catalog.
//!
//! Objects are addressed by `(objectType, name)` and carry a free-form
//! `properties` map. The catalog guards its own state, so its handlers can be
//! invoked concurrently from every acceptor.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::dispatch::{ActionHandler, HandlerError, Request};

const NAME_PARAMETER: &str = "name";
const PROPERTIES_PARAMETER: &str = "properties";

/// A metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogObject {
    pub object_type: String,
    pub name: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Catalog actions exposed over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOperation {
    Create,
    Get,
    List,
    Update,
    Delete,
}

impl CatalogOperation {
    /// Every operation, in registration order.
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Get,
        Self::List,
        Self::Update,
        Self::Delete,
    ];

    /// Action name the operation is registered under.
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::Create => "create_object",
            Self::Get => "get_object",
            Self::List => "list_objects",
            Self::Update => "update_object",
            Self::Delete => "delete_object",
        }
    }
}

type ObjectKey = (String, String);

/// Thread-safe catalog of metadata objects.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    objects: RwLock<BTreeMap<ObjectKey, CatalogObject>>,
}

impl InMemoryCatalog {
    /// Returns a handler performing `operation` against this catalog.
    #[must_use]
    pub fn handler(self: &Arc<Self>, operation: CatalogOperation) -> CatalogHandler {
        CatalogHandler {
            catalog: Arc::clone(self),
            operation,
        }
    }

    /// Inserts a new object.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::AlreadyExists`] when the key is taken.
    pub fn create(&self, object: CatalogObject) -> Result<CatalogObject, HandlerError> {
        let mut objects = self.write()?;
        let key = (object.object_type.clone(), object.name.clone());
        if objects.contains_key(&key) {
            return Err(HandlerError::AlreadyExists {
                object_type: object.object_type,
                name: object.name,
            });
        }
        objects.insert(key, object.clone());
        Ok(object)
    }

    /// Looks up one object.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::NotFound`] when absent.
    pub fn get(&self, object_type: &str, name: &str) -> Result<CatalogObject, HandlerError> {
        self.read()?
            .get(&key(object_type, name))
            .cloned()
            .ok_or_else(|| not_found(object_type, name))
    }

    /// Lists the objects of one type ordered by name.
    ///
    /// # Errors
    ///
    /// Fails only when the catalog lock is poisoned.
    pub fn list(&self, object_type: &str) -> Result<Vec<CatalogObject>, HandlerError> {
        Ok(self
            .read()?
            .values()
            .filter(|object| object.object_type == object_type)
            .cloned()
            .collect())
    }

    /// Shallow-merges `properties` into an existing object.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::NotFound`] when absent.
    pub fn update(
        &self,
        object_type: &str,
        name: &str,
        properties: &Map<String, Value>,
    ) -> Result<CatalogObject, HandlerError> {
        let mut objects = self.write()?;
        let object = objects
            .get_mut(&key(object_type, name))
            .ok_or_else(|| not_found(object_type, name))?;
        for (property, value) in properties {
            object.properties.insert(property.clone(), value.clone());
        }
        Ok(object.clone())
    }

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::NotFound`] when absent.
    pub fn delete(&self, object_type: &str, name: &str) -> Result<CatalogObject, HandlerError> {
        self.write()?
            .remove(&key(object_type, name))
            .ok_or_else(|| not_found(object_type, name))
    }

    fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, BTreeMap<ObjectKey, CatalogObject>>, HandlerError> {
        self.objects
            .read()
            .map_err(|_| HandlerError::failed("catalog lock poisoned"))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<ObjectKey, CatalogObject>>, HandlerError> {
        self.objects
            .write()
            .map_err(|_| HandlerError::failed("catalog lock poisoned"))
    }
}

/// Channel handler bound to one catalog operation.
#[derive(Debug, Clone)]
pub struct CatalogHandler {
    catalog: Arc<InMemoryCatalog>,
    operation: CatalogOperation,
}

impl ActionHandler for CatalogHandler {
    fn handle(&self, request: &Request) -> Result<Value, HandlerError> {
        let object_type = request.require_object_type()?;
        let catalog = &self.catalog;
        let result = match self.operation {
            CatalogOperation::List => {
                let objects = catalog.list(object_type)?;
                return Ok(json!({ "objects": objects }));
            }
            CatalogOperation::Create => catalog.create(CatalogObject {
                object_type: object_type.to_owned(),
                name: require_name(request)?.to_owned(),
                properties: request
                    .optional_object(PROPERTIES_PARAMETER)?
                    .cloned()
                    .unwrap_or_default(),
            }),
            CatalogOperation::Get => catalog.get(object_type, require_name(request)?),
            CatalogOperation::Update => {
                let properties = request
                    .optional_object(PROPERTIES_PARAMETER)?
                    .ok_or_else(|| HandlerError::missing_parameter(PROPERTIES_PARAMETER))?;
                catalog.update(object_type, require_name(request)?, properties)
            }
            CatalogOperation::Delete => catalog.delete(object_type, require_name(request)?),
        }?;
        serde_json::to_value(result).map_err(|error| HandlerError::failed(error.to_string()))
    }
}

fn require_name(request: &Request) -> Result<&str, HandlerError> {
    let name = request.require_str(NAME_PARAMETER)?.trim();
    if name.is_empty() {
        return Err(HandlerError::invalid_parameter(
            NAME_PARAMETER,
            "a non-empty string",
        ));
    }
    Ok(name)
}

fn key(object_type: &str, name: &str) -> ObjectKey {
    (object_type.to_owned(), name.to_owned())
}

fn not_found(object_type: &str, name: &str) -> HandlerError {
    HandlerError::NotFound {
        object_type: object_type.to_owned(),
        name: name.to_owned(),
    }
}
