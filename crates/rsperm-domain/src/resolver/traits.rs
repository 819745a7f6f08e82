//! Traits for the collaborators the registry depends on.

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::{Action, ModelType, Object, ObjectId, RelationField, User};
use crate::query::Query;

/// Native role and row-level ACL backend.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Checks whether `codename` is a known permission of `model`.
    async fn permission_exists(&self, model: &ModelType, codename: &str) -> DomainResult<bool>;

    /// Checks whether the user holds `codename` for every row of its model.
    async fn has_role_permission(&self, user: &User, codename: &str) -> DomainResult<bool>;

    /// Checks whether the user holds `codename` directly on `object`.
    async fn has_row_permission(
        &self,
        user: &User,
        codename: &str,
        object: &Object,
    ) -> DomainResult<bool>;

    /// Restricts `base` to the rows the user holds `codename` on directly.
    async fn rows_with_permission(
        &self,
        user: &User,
        codename: &str,
        base: Query,
    ) -> DomainResult<Query>;
}

/// Row lookups needed to follow relations for object-level decisions.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Loads a row by id.
    async fn get_object(&self, model: &ModelType, id: ObjectId) -> DomainResult<Option<Object>>;

    /// Loads every row reachable from `object` through `relation`.
    async fn related_objects(
        &self,
        object: &Object,
        relation: &RelationField,
    ) -> DomainResult<Vec<Object>>;
}

/// Evaluates query descriptions against storage.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Returns the rows described by `query`, ordered by id.
    async fn execute(&self, query: &Query) -> DomainResult<Vec<Object>>;

    /// Returns the ids of the rows described by `query`.
    async fn execute_ids(&self, query: &Query) -> DomainResult<Vec<ObjectId>> {
        Ok(self.execute(query).await?.into_iter().map(|o| o.id).collect())
    }
}

/// Object-safe view of a rule registry.
///
/// Delegated rules that target a different registry resolve through this
/// trait.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Whether a combinator is registered for `model`.
    fn is_registered(&self, model: &ModelType) -> bool;

    /// Decides whether the user may perform `action` on `object`.
    async fn decide(&self, user: &User, action: &Action, object: &Object) -> DomainResult<bool>;

    /// Coarse check: whether the user could hold `action` on any row of `model`.
    async fn has_collection_permission(
        &self,
        model: &ModelType,
        user: &User,
        action: &Action,
    ) -> DomainResult<bool>;

    /// Query over the rows of `model` the user may perform `action` on.
    async fn collection_query(
        &self,
        model: &ModelType,
        user: &User,
        action: &Action,
    ) -> DomainResult<Query>;
}
