//! Per-model handles over a shared registry.

use std::fmt;
use std::sync::Arc;

use crate::error::{DomainError, DomainResult};
use crate::model::{Action, ModelType, Object, User};
use crate::query::Query;

use super::registry::PermissionRegistry;
use super::traits::{ObjectReader, PermissionBackend};

/// Builds the filtered collection query of one model for a user and action.
pub struct QueryFactory<B, R> {
    registry: Arc<PermissionRegistry<B, R>>,
    model: ModelType,
    base: Option<Query>,
}

impl<B, R> Clone for QueryFactory<B, R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            model: self.model.clone(),
            base: self.base.clone(),
        }
    }
}

impl<B, R> fmt::Debug for QueryFactory<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFactory")
            .field("model", &self.model)
            .field("base", &self.base)
            .finish()
    }
}

impl<B, R> QueryFactory<B, R>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
{
    pub(super) fn new(registry: Arc<PermissionRegistry<B, R>>, model: ModelType) -> Self {
        Self {
            registry,
            model,
            base: None,
        }
    }

    /// Filters `base` instead of the registry's default base query.
    pub fn with_base_query(mut self, base: Query) -> DomainResult<Self> {
        if base.model() != &self.model {
            return Err(DomainError::IncompatibleQuery {
                message: format!(
                    "base query over {} given to the factory of {}",
                    base.model(),
                    self.model
                ),
            });
        }
        self.base = Some(base);
        Ok(self)
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    /// Query over the rows the user may perform `action` on.
    pub async fn query(&self, user: &User, action: &Action) -> DomainResult<Query> {
        match &self.base {
            Some(base) => {
                self.registry
                    .collection_query_from(base.clone(), user, action)
                    .await
            }
            None => {
                self.registry
                    .collection_query(&self.model, user, action)
                    .await
            }
        }
    }
}

/// Endpoint-facing permission checks for one model.
pub struct ModelPermission<B, R> {
    registry: Arc<PermissionRegistry<B, R>>,
    model: ModelType,
}

impl<B, R> Clone for ModelPermission<B, R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            model: self.model.clone(),
        }
    }
}

impl<B, R> fmt::Debug for ModelPermission<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelPermission")
            .field("model", &self.model)
            .finish()
    }
}

impl<B, R> ModelPermission<B, R>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
{
    pub(super) fn new(registry: Arc<PermissionRegistry<B, R>>, model: ModelType) -> Self {
        Self { registry, model }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn registry(&self) -> &Arc<PermissionRegistry<B, R>> {
        &self.registry
    }

    /// Coarse check made before any row is loaded.
    pub async fn has_permission(&self, user: &User, action: &Action) -> DomainResult<bool> {
        self.registry
            .has_collection_permission(&self.model, user, action)
            .await
    }

    /// Object-level check on a row of this model.
    pub async fn has_object_permission(
        &self,
        user: &User,
        action: &Action,
        object: &Object,
    ) -> DomainResult<bool> {
        if object.model != self.model {
            return Err(DomainError::IncompatibleQuery {
                message: format!(
                    "object {} checked by the permission of {}",
                    object, self.model
                ),
            });
        }
        self.registry.decide(user, action, object).await
    }

    /// Query over the rows the user may perform `action` on.
    pub async fn query(&self, user: &User, action: &Action) -> DomainResult<Query> {
        self.registry
            .collection_query(&self.model, user, action)
            .await
    }
}
