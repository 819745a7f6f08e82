//! rsperm-domain: Delegated object permissions
//!
//! This crate contains the core permission logic including:
//! - Model schema with relation fields (to-one and to-many)
//! - Permission rules and AND / OR / NOT combinators
//! - The rule registry with object decisions and coarse collection checks
//! - Translation of rule trees into query descriptions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rsperm-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  model/    - Schema, rows, users, actions   │
//! │  rules/    - Rule kinds & combinators       │
//! │  query/    - Query description algebra      │
//! │  resolver/ - Registry & resolution engine   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Storage lives behind the traits in [`resolver`]; the domain layer never
//! reads rows or executes queries itself.

pub mod error;
pub mod model;
pub mod query;
pub mod resolver;
pub mod rules;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use model::{Action, ModelType, Object, ObjectId, Schema, User, UserId, Value};
pub use query::{Predicate, Query, QueryNode, GRANTED_MARKER};
pub use resolver::{
    ModelPermission, ObjectReader, PermissionBackend, PermissionRegistry, PermissionSource,
    QueryExecutor, QueryFactory, RegisterOptions, RegistryConfig, RuleSet,
};
pub use rules::{Condition, Operator, PermissionRule};
