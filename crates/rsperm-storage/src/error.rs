//! Storage error types.

use rsperm_domain::error::DomainError;
use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Model has no table.
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Row not found.
    #[error("row not found: {model}:{id}")]
    RowNotFound { model: String, id: i64 },

    /// Field is not declared on the model.
    #[error("field not found: {model}.{field}")]
    FieldNotFound { model: String, field: String },

    /// Relation is not declared on the model.
    #[error("relation not found: {model}.{relation}")]
    RelationNotFound { model: String, relation: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Query could not be evaluated.
    #[error("query error: {message}")]
    QueryError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        DomainError::StorageError {
            message: err.to_string(),
        }
    }
}
