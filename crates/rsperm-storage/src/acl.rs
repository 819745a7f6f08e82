//! In-memory native permission backend.
//!
//! Holds the permission codenames declared per model, role permissions
//! (a codename granted on every row of its model) and row permissions (a
//! codename granted on single rows).

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use rsperm_domain::error::DomainResult;
use rsperm_domain::model::{Action, ModelType, Object, ObjectId, User, UserId};
use rsperm_domain::query::{Predicate, Query};
use rsperm_domain::resolver::PermissionBackend;

use crate::error::{StorageError, StorageResult};

/// In-memory implementation of PermissionBackend.
#[derive(Debug, Default)]
pub struct MemoryAclBackend {
    /// Declared codenames keyed by model.
    codenames: DashMap<ModelType, HashSet<String>>,
    /// Users holding every permission that exists.
    superusers: DashSet<UserId>,
    /// Role permissions keyed by user.
    roles: DashMap<UserId, HashSet<String>>,
    /// Row permissions keyed by (user, codename).
    rows: DashMap<(UserId, String), HashSet<(ModelType, ObjectId)>>,
}

impl MemoryAclBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the default add / change / delete / view codenames of `model`.
    pub fn register_model(&self, model: &ModelType) {
        let mut codenames = self.codenames.entry(model.clone()).or_default();
        for action in [Action::Create, Action::Change, Action::Delete, Action::View] {
            codenames.insert(action.codename(model));
        }
        debug!(model = %model, "Registered default permissions");
    }

    /// Declares an additional codename for `model`.
    pub fn add_permission(&self, model: &ModelType, codename: impl Into<String>) {
        self.codenames
            .entry(model.clone())
            .or_default()
            .insert(codename.into());
    }

    fn check_exists(&self, model: &ModelType, codename: &str) -> StorageResult<()> {
        let known = self
            .codenames
            .get(model)
            .is_some_and(|codenames| codenames.contains(codename));
        if !known {
            return Err(StorageError::InvalidInput {
                message: format!("unknown permission {codename} for {model}"),
            });
        }
        Ok(())
    }

    pub fn set_superuser(&self, user: UserId, superuser: bool) {
        if superuser {
            self.superusers.insert(user);
        } else {
            self.superusers.remove(&user);
        }
    }

    /// Grants `codename` on every row of `model`.
    pub fn grant_role(&self, user: UserId, model: &ModelType, codename: &str) -> StorageResult<()> {
        self.check_exists(model, codename)?;
        self.roles
            .entry(user)
            .or_default()
            .insert(codename.to_string());
        Ok(())
    }

    pub fn revoke_role(&self, user: UserId, codename: &str) {
        if let Some(mut codenames) = self.roles.get_mut(&user) {
            codenames.remove(codename);
        }
    }

    /// Grants `codename` on a single row.
    pub fn grant_row(&self, user: UserId, codename: &str, object: &Object) -> StorageResult<()> {
        self.check_exists(&object.model, codename)?;
        self.rows
            .entry((user, codename.to_string()))
            .or_default()
            .insert((object.model.clone(), object.id));
        Ok(())
    }

    pub fn revoke_row(&self, user: UserId, codename: &str, object: &Object) {
        if let Some(mut rows) = self.rows.get_mut(&(user, codename.to_string())) {
            rows.remove(&(object.model.clone(), object.id));
        }
    }
}

#[async_trait]
impl PermissionBackend for MemoryAclBackend {
    async fn permission_exists(&self, model: &ModelType, codename: &str) -> DomainResult<bool> {
        Ok(self.check_exists(model, codename).is_ok())
    }

    async fn has_role_permission(&self, user: &User, codename: &str) -> DomainResult<bool> {
        let Some(id) = user.id() else {
            return Ok(false);
        };
        if self.superusers.contains(&id) {
            return Ok(true);
        }
        Ok(self
            .roles
            .get(&id)
            .is_some_and(|codenames| codenames.contains(codename)))
    }

    async fn has_row_permission(
        &self,
        user: &User,
        codename: &str,
        object: &Object,
    ) -> DomainResult<bool> {
        let Some(id) = user.id() else {
            return Ok(false);
        };
        Ok(self
            .rows
            .get(&(id, codename.to_string()))
            .is_some_and(|rows| rows.contains(&(object.model.clone(), object.id))))
    }

    async fn rows_with_permission(
        &self,
        user: &User,
        codename: &str,
        base: Query,
    ) -> DomainResult<Query> {
        let Some(id) = user.id() else {
            return Ok(Query::none(base.model().clone()));
        };
        let ids: BTreeSet<ObjectId> = self
            .rows
            .get(&(id, codename.to_string()))
            .map(|rows| {
                rows.iter()
                    .filter(|(model, _)| model == base.model())
                    .map(|(_, object_id)| *object_id)
                    .collect()
            })
            .unwrap_or_default();
        if ids.is_empty() {
            return Ok(Query::none(base.model().clone()));
        }
        Ok(base.filter(Predicate::IdIn(ids)))
    }
}
