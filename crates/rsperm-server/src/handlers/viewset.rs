//! Model view set: binds endpoint operations to permission checks.
//!
//! Every detail operation first looks the row up in the user's *view*
//! query, so a row the user cannot see is reported as not found even for
//! writes. A visible row the user may not act on is forbidden. Detail
//! operations skip the coarse check; the lookup already filters.
//!
//! | Operation                                   | Action   | Check                   |
//! |---------------------------------------------|----------|-------------------------|
//! | `list`                                      | View     | coarse, then view query |
//! | `create`                                    | Create   | coarse                  |
//! | `retrieve`                                  | View     | lookup, then object     |
//! | `update` / `partial_update`                 | Change   | lookup, then object     |
//! | `destroy`                                   | Delete   | lookup, then object     |
//! | anything else                               | Custom   | lookup + object, or coarse without an id |

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use rsperm_domain::error::DomainError;
use rsperm_domain::model::{Action, ModelType, Object, ObjectId, User};
use rsperm_domain::query::Predicate;
use rsperm_domain::resolver::{
    ModelPermission, ObjectReader, PermissionBackend, PermissionRegistry, QueryExecutor,
    QueryFactory,
};

/// Outcome of an endpoint operation that raised no error.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewResponse {
    /// Rows returned by `list`. May be empty.
    Listed(Vec<Object>),
    /// The located row a detail operation may proceed on.
    Found(Object),
    /// A collection-level operation (`create`) may proceed.
    Allowed,
}

/// Errors returned to endpoint callers.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The row does not exist or is not visible to the user.
    #[error("{model} {id} not found")]
    NotFound { model: String, id: ObjectId },

    /// The user may see the resource but not perform the action.
    #[error("not allowed to {action} {model}")]
    Forbidden { model: String, action: Action },

    /// Configuration or storage failure.
    #[error("internal error: {0}")]
    Internal(#[from] DomainError),
}

impl EndpointError {
    /// HTTP status code the error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            EndpointError::NotFound { .. } => 404,
            EndpointError::Forbidden { .. } => 403,
            EndpointError::Internal(_) => 500,
        }
    }
}

/// Result type for endpoint operations.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Permission-checked endpoint operations over one model.
pub struct ModelViewSet<B, R, E> {
    permission: ModelPermission<B, R>,
    queries: QueryFactory<B, R>,
    executor: Arc<E>,
}

impl<B, R, E> fmt::Debug for ModelViewSet<B, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelViewSet")
            .field("permission", &self.permission)
            .field("queries", &self.queries)
            .finish()
    }
}

impl<B, R, E> ModelViewSet<B, R, E>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
    E: QueryExecutor,
{
    /// Binds `model` of `registry`; fails when the model is not registered.
    pub fn new(
        registry: &Arc<PermissionRegistry<B, R>>,
        model: &ModelType,
        executor: Arc<E>,
    ) -> EndpointResult<Self> {
        Ok(Self {
            permission: registry.model_permission(model)?,
            queries: registry.query_factory(model)?,
            executor,
        })
    }

    /// Replaces the query factory, e.g. one built with a custom base query.
    pub fn with_queries(mut self, queries: QueryFactory<B, R>) -> EndpointResult<Self> {
        if queries.model() != self.permission.model() {
            return Err(DomainError::IncompatibleQuery {
                message: format!(
                    "query factory of {} bound to the view set of {}",
                    queries.model(),
                    self.permission.model()
                ),
            }
            .into());
        }
        self.queries = queries;
        Ok(self)
    }

    pub fn model(&self) -> &ModelType {
        self.permission.model()
    }

    /// Routes an operation name to the matching handler.
    pub async fn dispatch(
        &self,
        operation: &str,
        user: &User,
        id: Option<ObjectId>,
    ) -> EndpointResult<ViewResponse> {
        match (operation, id) {
            ("list", _) => self.list(user).await.map(ViewResponse::Listed),
            ("create", _) => self.create(user).await.map(|()| ViewResponse::Allowed),
            (operation, Some(id)) => {
                let action = Action::from_operation(operation);
                self.detail(user, id, &action).await.map(ViewResponse::Found)
            }
            (operation, None) => {
                let action = Action::from_operation(operation);
                self.require_collection(user, &action)
                    .await
                    .map(|()| ViewResponse::Allowed)
            }
        }
    }

    /// Rows the user may view. Empty when the coarse check fails.
    pub async fn list(&self, user: &User) -> EndpointResult<Vec<Object>> {
        if !self.permission.has_permission(user, &Action::View).await? {
            debug!(model = %self.model(), user = %user, "Listing denied by coarse check");
            return Ok(Vec::new());
        }
        let query = self.queries.query(user, &Action::View).await?;
        Ok(self.executor.execute(&query).await?)
    }

    pub async fn create(&self, user: &User) -> EndpointResult<()> {
        self.require_collection(user, &Action::Create).await
    }

    pub async fn retrieve(&self, user: &User, id: ObjectId) -> EndpointResult<Object> {
        self.detail(user, id, &Action::View).await
    }

    pub async fn update(&self, user: &User, id: ObjectId) -> EndpointResult<Object> {
        self.detail(user, id, &Action::Change).await
    }

    pub async fn partial_update(&self, user: &User, id: ObjectId) -> EndpointResult<Object> {
        self.detail(user, id, &Action::Change).await
    }

    pub async fn destroy(&self, user: &User, id: ObjectId) -> EndpointResult<Object> {
        self.detail(user, id, &Action::Delete).await
    }

    /// Finds `id` among the rows the user may view.
    async fn lookup(&self, user: &User, id: ObjectId) -> EndpointResult<Object> {
        let query = self
            .queries
            .query(user, &Action::View)
            .await?
            .filter(Predicate::IdIn(BTreeSet::from([id])));
        self.executor
            .execute(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EndpointError::NotFound {
                model: self.model().to_string(),
                id,
            })
    }

    async fn detail(&self, user: &User, id: ObjectId, action: &Action) -> EndpointResult<Object> {
        let object = self.lookup(user, id).await?;
        if !self
            .permission
            .has_object_permission(user, action, &object)
            .await?
        {
            debug!(object = %object, action = %action, user = %user, "Object permission denied");
            return Err(self.forbidden(action));
        }
        Ok(object)
    }

    async fn require_collection(&self, user: &User, action: &Action) -> EndpointResult<()> {
        if self.permission.has_permission(user, action).await? {
            Ok(())
        } else {
            Err(self.forbidden(action))
        }
    }

    fn forbidden(&self, action: &Action) -> EndpointError {
        EndpointError::Forbidden {
            model: self.model().to_string(),
            action: action.clone(),
        }
    }
}
