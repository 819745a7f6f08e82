//! Model types and schema descriptors.
//!
//! This module contains:
//! - Core type definitions (ModelType, Object, User, Action, Value)
//! - Statically declared relation metadata (Schema, RelationField)

mod schema;
mod types;
#[cfg(test)]
mod types_proptest;

pub use schema::{Cardinality, ModelDescriptor, RelationField, RelationKind, Schema};
pub use types::*;
