//! Rule registry: model type to combinator, plus the public check operations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::{DomainError, DomainResult};
use crate::model::{Action, ModelType, Object, Schema, User};
use crate::query::Query;
use crate::rules::{
    Condition, DelegatedRule, NativeRule, Operator, OwnershipRule, PermissionRule,
};

use super::adapter::{ModelPermission, QueryFactory};
use super::config::RegistryConfig;
use super::context::TraversalContext;
use super::traits::{ObjectReader, PermissionBackend, PermissionSource};

/// Supplies the unfiltered collection query of a model.
pub type BaseQuerySupplier = Arc<dyn Fn(&ModelType) -> Query + Send + Sync>;

/// The rules passed to a registration: one rule or a list of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet(Vec<PermissionRule>);

impl RuleSet {
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self(rules)
    }

    /// No rules. Registered without a native default this denies everything.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn into_inner(self) -> Vec<PermissionRule> {
        self.0
    }
}

impl From<Vec<PermissionRule>> for RuleSet {
    fn from(rules: Vec<PermissionRule>) -> Self {
        Self(rules)
    }
}

impl<const N: usize> From<[PermissionRule; N]> for RuleSet {
    fn from(rules: [PermissionRule; N]) -> Self {
        Self(rules.into())
    }
}

impl From<PermissionRule> for RuleSet {
    fn from(rule: PermissionRule) -> Self {
        Self(vec![rule])
    }
}

impl From<Condition> for RuleSet {
    fn from(condition: Condition) -> Self {
        Self(vec![condition.into()])
    }
}

impl From<NativeRule> for RuleSet {
    fn from(rule: NativeRule) -> Self {
        Self(vec![rule.into()])
    }
}

impl From<OwnershipRule> for RuleSet {
    fn from(rule: OwnershipRule) -> Self {
        Self(vec![rule.into()])
    }
}

impl From<DelegatedRule> for RuleSet {
    fn from(rule: DelegatedRule) -> Self {
        Self(vec![rule.into()])
    }
}

/// Options for a single registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Replace an existing registration instead of failing.
    pub overwrite: bool,
    /// Prepend a native rule. `None` uses the registry default.
    pub native_default: Option<bool>,
}

impl RegisterOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            native_default: None,
        }
    }

    pub fn with_native_default(mut self, native_default: bool) -> Self {
        self.native_default = Some(native_default);
        self
    }
}

/// Maps each model type to the OR-combinator of its permission rules.
///
/// Registration happens at startup; afterwards the map is only read, so a
/// registry can be shared behind an `Arc` across request handlers.
pub struct PermissionRegistry<B, R> {
    pub(super) schema: Arc<Schema>,
    pub(super) backend: Arc<B>,
    pub(super) reader: Arc<R>,
    pub(super) config: RegistryConfig,
    pub(super) base_query: BaseQuerySupplier,
    conditions: DashMap<ModelType, Arc<Condition>>,
}

impl<B, R> fmt::Debug for PermissionRegistry<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<String> = self.conditions.iter().map(|e| e.key().to_string()).collect();
        models.sort();
        f.debug_struct("PermissionRegistry")
            .field("config", &self.config)
            .field("models", &models)
            .finish()
    }
}

impl<B, R> PermissionRegistry<B, R>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
{
    /// Creates a new registry.
    pub fn new(schema: Arc<Schema>, backend: Arc<B>, reader: Arc<R>) -> Self {
        Self::with_config(schema, backend, reader, RegistryConfig::default())
    }

    /// Creates a new registry with custom configuration.
    pub fn with_config(
        schema: Arc<Schema>,
        backend: Arc<B>,
        reader: Arc<R>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            schema,
            backend,
            reader,
            config,
            base_query: Arc::new(|model: &ModelType| Query::all(model.clone())),
            conditions: DashMap::new(),
        }
    }

    /// Replaces the default base query supplier (every row of the model).
    pub fn with_base_query<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&ModelType) -> Query + Send + Sync + 'static,
    {
        self.base_query = Arc::new(supplier);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers `rules` for `model` with default options.
    pub fn register(&self, model: &ModelType, rules: impl Into<RuleSet>) -> DomainResult<()> {
        self.register_with(model, rules, RegisterOptions::default())
    }

    /// Registers `rules` for `model`.
    ///
    /// The rules are combined with OR, optionally behind a native rule.
    /// Relation names and ownership paths are validated against the schema
    /// here so that misconfiguration fails at startup.
    pub fn register_with(
        &self,
        model: &ModelType,
        rules: impl Into<RuleSet>,
        options: RegisterOptions,
    ) -> DomainResult<()> {
        self.schema.get(model)?;

        let mut children = rules.into().into_inner();
        if options.native_default.unwrap_or(self.config.native_default) {
            children.insert(0, PermissionRule::native());
        }
        let condition = Condition::or(children);
        for child in condition.children() {
            self.validate_rule(model, child)?;
        }

        match self.conditions.entry(model.clone()) {
            Entry::Occupied(mut entry) => {
                if !options.overwrite {
                    return Err(DomainError::AlreadyRegistered {
                        model: model.to_string(),
                    });
                }
                entry.insert(Arc::new(condition));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(condition));
            }
        }

        debug!(model = %model, overwrite = options.overwrite, "Registered permissions");
        Ok(())
    }

    /// Registers several models at once with default options.
    pub fn register_all<I, S>(&self, registrations: I) -> DomainResult<()>
    where
        I: IntoIterator<Item = (ModelType, S)>,
        S: Into<RuleSet>,
    {
        for (model, rules) in registrations {
            self.register(&model, rules)?;
        }
        Ok(())
    }

    pub fn is_registered(&self, model: &ModelType) -> bool {
        self.conditions.contains_key(model)
    }

    /// Returns the combinator registered for `model`.
    pub fn condition_for(&self, model: &ModelType) -> DomainResult<Arc<Condition>> {
        self.conditions
            .get(model)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DomainError::ModelNotRegistered {
                model: model.to_string(),
            })
    }

    fn validate_rule(&self, model: &ModelType, rule: &PermissionRule) -> DomainResult<()> {
        match rule {
            PermissionRule::Native(_) => Ok(()),
            PermissionRule::Ownership(rule) => {
                self.schema.validate_path(model, rule.path())?;
                Ok(())
            }
            PermissionRule::Delegated(rule) => {
                if rule.fields().is_empty() {
                    return Err(DomainError::InvalidCondition {
                        message: format!("delegated rule on {model} names no relation fields"),
                    });
                }
                for field in rule.fields() {
                    self.schema.relation(model, field)?;
                }
                Ok(())
            }
            PermissionRule::Condition(condition) => {
                if condition.operator() == Operator::And && condition.children().is_empty() {
                    return Err(DomainError::InvalidCondition {
                        message: format!("AND condition on {model} has no children"),
                    });
                }
                for child in condition.children() {
                    self.validate_rule(model, child)?;
                }
                Ok(())
            }
        }
    }

    /// Decides whether the user may perform `action` on `object`.
    #[instrument(skip_all, fields(model = %object.model, object_id = %object.id, action = %action, user = %user))]
    pub async fn decide(&self, user: &User, action: &Action, object: &Object) -> DomainResult<bool> {
        self.resolve_object(*user, action.clone(), object.clone(), TraversalContext::new())
            .await
    }

    /// Coarse check used before any row is looked at.
    ///
    /// Returns false only when no row of `model` could be granted.
    #[instrument(skip_all, fields(model = %model, action = %action, user = %user))]
    pub async fn has_collection_permission(
        &self,
        model: &ModelType,
        user: &User,
        action: &Action,
    ) -> DomainResult<bool> {
        self.resolve_model_coarse(model.clone(), *user, action.clone(), TraversalContext::new())
            .await
    }

    /// Query over exactly the rows of `model` the user may perform `action` on.
    ///
    /// Returns an explicit empty query when nothing is granted.
    #[instrument(skip_all, fields(model = %model, action = %action, user = %user))]
    pub async fn collection_query(
        &self,
        model: &ModelType,
        user: &User,
        action: &Action,
    ) -> DomainResult<Query> {
        let base = (self.base_query)(model);
        self.filtered_query(model.clone(), base, *user, action.clone(), TraversalContext::new())
            .await
    }

    /// Like [`collection_query`](Self::collection_query) but filtering a
    /// caller supplied base query.
    pub async fn collection_query_from(
        &self,
        base: Query,
        user: &User,
        action: &Action,
    ) -> DomainResult<Query> {
        let model = base.model().clone();
        self.filtered_query(model, base, *user, action.clone(), TraversalContext::new())
            .await
    }

    /// Returns a `(user, action) -> Query` factory for `model`.
    pub fn query_factory(self: &Arc<Self>, model: &ModelType) -> DomainResult<QueryFactory<B, R>> {
        self.condition_for(model)?;
        Ok(QueryFactory::new(Arc::clone(self), model.clone()))
    }

    /// Returns the endpoint-facing permission adapter for `model`.
    pub fn model_permission(
        self: &Arc<Self>,
        model: &ModelType,
    ) -> DomainResult<ModelPermission<B, R>> {
        self.condition_for(model)?;
        Ok(ModelPermission::new(Arc::clone(self), model.clone()))
    }
}

#[async_trait]
impl<B, R> PermissionSource for PermissionRegistry<B, R>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
{
    fn is_registered(&self, model: &ModelType) -> bool {
        PermissionRegistry::is_registered(self, model)
    }

    async fn decide(&self, user: &User, action: &Action, object: &Object) -> DomainResult<bool> {
        PermissionRegistry::decide(self, user, action, object).await
    }

    async fn has_collection_permission(
        &self,
        model: &ModelType,
        user: &User,
        action: &Action,
    ) -> DomainResult<bool> {
        PermissionRegistry::has_collection_permission(self, model, user, action).await
    }

    async fn collection_query(
        &self,
        model: &ModelType,
        user: &User,
        action: &Action,
    ) -> DomainResult<Query> {
        PermissionRegistry::collection_query(self, model, user, action).await
    }
}
