//! Domain error types for permission evaluation and query translation.

use thiserror::Error;

/// Domain-specific errors for permission operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No combinator is registered for the model.
    #[error("no permissions registered for model: {model}")]
    ModelNotRegistered { model: String },

    /// A combinator is already registered and overwrite was not requested.
    #[error("permissions for {model} already registered")]
    AlreadyRegistered { model: String },

    /// Model type is not declared in the schema.
    #[error("type not found: {type_name}")]
    TypeNotFound { type_name: String },

    /// Relation field is not declared on the model.
    #[error("relation '{relation}' not found on type '{type_name}'")]
    RelationNotFound { type_name: String, relation: String },

    /// Plain field is not declared on the model.
    #[error("field '{field}' not found on type '{type_name}'")]
    FieldNotFound { type_name: String, field: String },

    /// Malformed dotted field path.
    #[error("invalid field path: {value}")]
    InvalidFieldPath { value: String },

    /// Malformed model type name.
    #[error("invalid model type: {value}")]
    InvalidModelType { value: String },

    /// Combinator shape that cannot be evaluated (e.g. an AND without children).
    #[error("invalid condition: {message}")]
    InvalidCondition { message: String },

    /// Queries over different models or with different projected columns were combined.
    #[error("incompatible queries: {message}")]
    IncompatibleQuery { message: String },

    /// Depth limit exceeded while following delegations.
    #[error("depth limit exceeded (max: {max_depth})")]
    DepthLimitExceeded { max_depth: u32 },

    /// Error reported by a collaborating data layer or ACL backend.
    #[error("storage error: {message}")]
    StorageError { message: String },
}

impl DomainError {
    /// Returns true for errors caused by a deployment misconfiguration.
    ///
    /// These are raised at registration or first use and are never
    /// recovered from at request time.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DomainError::ModelNotRegistered { .. }
                | DomainError::AlreadyRegistered { .. }
                | DomainError::TypeNotFound { .. }
                | DomainError::RelationNotFound { .. }
                | DomainError::FieldNotFound { .. }
                | DomainError::InvalidFieldPath { .. }
                | DomainError::InvalidCondition { .. }
        )
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
