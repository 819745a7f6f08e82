//! Rule registry and resolution engine.
//!
//! The registry answers three questions for a registered model:
//!
//! - `decide`: may the user perform an action on this row?
//! - `has_collection_permission`: could the user perform it on any row?
//! - `collection_query`: which rows may the user perform it on?
//!
//! # Architecture Decisions
//!
//! - **Async recursion**: delegation recurses into other models' rules, so
//!   every recursive step returns a boxed future.
//!
//! - **Depth limiting**: the default max depth of 25 bounds delegation
//!   chains. Exceeding it yields `DepthLimitExceeded`.
//!
//! - **Correlated delegation**: a delegated branch becomes an existence
//!   filter on the outer query rather than a join. Fragments therefore
//!   never duplicate rows and stay composable under AND, even when the
//!   relation is to-many.
//!
//! - **NOT is decide-only**: negation is evaluated for single objects but
//!   contributes no rows to a query (with a warning).

mod adapter;
mod config;
mod context;
mod delegation;
mod evaluate;
mod registry;
mod traits;
mod translate;

#[cfg(test)]
mod tests;

pub use adapter::{ModelPermission, QueryFactory};
pub use config::RegistryConfig;
pub use registry::{BaseQuerySupplier, PermissionRegistry, RegisterOptions, RuleSet};
pub use traits::{ObjectReader, PermissionBackend, PermissionSource, QueryExecutor};
