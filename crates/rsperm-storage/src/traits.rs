//! RecordStore trait definition.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rsperm_domain::model::{ModelDescriptor, ModelType, Object, ObjectId, Value};

use crate::error::{StorageError, StorageResult};

/// Column values for an insert or update.
pub type Fields = BTreeMap<String, Value>;

/// Row storage for the models of a schema.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Inserts a row and returns it with its assigned id.
    async fn insert(&self, model: &ModelType, fields: Fields) -> StorageResult<Object>;

    /// Gets a row by id.
    async fn get(&self, model: &ModelType, id: ObjectId) -> StorageResult<Object>;

    /// Overwrites the given columns of a row, leaving the others untouched.
    async fn update(&self, model: &ModelType, id: ObjectId, fields: Fields)
        -> StorageResult<Object>;

    /// Deletes a row.
    async fn delete(&self, model: &ModelType, id: ObjectId) -> StorageResult<()>;

    /// Lists every row of a model, ordered by id.
    async fn list(&self, model: &ModelType) -> StorageResult<Vec<Object>>;
}

/// Validates that every column is declared on the model.
pub fn validate_fields(descriptor: &ModelDescriptor, fields: &Fields) -> StorageResult<()> {
    for name in fields.keys() {
        if name == "id" {
            return Err(StorageError::InvalidInput {
                message: format!("id of {} is assigned by the store", descriptor.model),
            });
        }
        if !descriptor.has_field(name) {
            return Err(StorageError::FieldNotFound {
                model: descriptor.model.to_string(),
                field: name.clone(),
            });
        }
    }
    Ok(())
}
