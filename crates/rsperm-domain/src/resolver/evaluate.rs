//! Object-level decisions and coarse collection checks.
//!
//! Combinators short-circuit in child order: OR on the first grant, AND on
//! the first denial. Delegated rules OR across their relation fields and,
//! within a field, across every related row.

use std::future::Future;
use std::pin::Pin;

use crate::error::{DomainError, DomainResult};
use crate::model::{Action, ModelType, Object, User, Value};
use crate::rules::{Condition, Operator, PermissionRule};

use super::context::TraversalContext;
use super::delegation::{related_objects, values_at_path};
use super::registry::PermissionRegistry;
use super::traits::{ObjectReader, PermissionBackend};

/// Type alias for boxed future to handle async recursion.
pub(super) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl<B, R> PermissionRegistry<B, R>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
{
    pub(super) fn check_depth(&self, ctx: TraversalContext) -> DomainResult<()> {
        if ctx.depth >= self.config.max_depth {
            return Err(DomainError::DepthLimitExceeded {
                max_depth: self.config.max_depth,
            });
        }
        Ok(())
    }

    /// Decides `action` on `object` using its model's combinator (boxed for recursion).
    pub(super) fn resolve_object(
        &self,
        user: User,
        action: Action,
        object: Object,
        ctx: TraversalContext,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        Box::pin(async move {
            self.check_depth(ctx)?;
            let condition = self.condition_for(&object.model)?;
            self.resolve_condition(&condition, &user, &action, &object, ctx)
                .await
        })
    }

    fn resolve_condition<'a>(
        &'a self,
        condition: &'a Condition,
        user: &'a User,
        action: &'a Action,
        object: &'a Object,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            match condition.operator() {
                Operator::Or => {
                    for child in condition.children() {
                        if self.resolve_rule(child, user, action, object, ctx).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Operator::And => {
                    for child in condition.children() {
                        if !self.resolve_rule(child, user, action, object, ctx).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Operator::Not => {
                    for child in condition.children() {
                        if self.resolve_rule(child, user, action, object, ctx).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
            }
        })
    }

    fn resolve_rule<'a>(
        &'a self,
        rule: &'a PermissionRule,
        user: &'a User,
        action: &'a Action,
        object: &'a Object,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            match rule {
                PermissionRule::Native(_) => {
                    let codename = action.codename(&object.model);
                    if !self
                        .backend
                        .permission_exists(&object.model, &codename)
                        .await?
                    {
                        return Ok(false);
                    }
                    if self.backend.has_role_permission(user, &codename).await? {
                        return Ok(true);
                    }
                    self.backend
                        .has_row_permission(user, &codename, object)
                        .await
                }

                PermissionRule::Ownership(rule) => {
                    let Some(id) = user.id() else {
                        return Ok(false);
                    };
                    let expected = Value::from(id);
                    let owners =
                        values_at_path(self.reader.as_ref(), &self.schema, object, rule.path())
                            .await?;
                    Ok(owners.contains(&expected))
                }

                PermissionRule::Delegated(rule) => {
                    let target = rule.actions().apply(action);
                    for field in rule.fields() {
                        let relation = self.schema.relation(&object.model, field)?;
                        let registered = match rule.source() {
                            Some(source) => source.is_registered(&relation.related),
                            None => self.is_registered(&relation.related),
                        };
                        if !registered {
                            return Err(DomainError::ModelNotRegistered {
                                model: relation.related.to_string(),
                            });
                        }
                        let related =
                            related_objects(self.reader.as_ref(), object, relation).await?;
                        for related_object in related {
                            let granted = match rule.source() {
                                Some(source) => {
                                    source.decide(user, &target, &related_object).await?
                                }
                                None => {
                                    self.resolve_object(
                                        *user,
                                        target.clone(),
                                        related_object,
                                        ctx.increment_depth(),
                                    )
                                    .await?
                                }
                            };
                            if granted {
                                return Ok(true);
                            }
                        }
                    }
                    Ok(false)
                }

                PermissionRule::Condition(condition) => {
                    self.resolve_condition(condition, user, action, object, ctx)
                        .await
                }
            }
        })
    }

    /// Coarse check for a model's combinator (boxed for recursion).
    pub(super) fn resolve_model_coarse(
        &self,
        model: ModelType,
        user: User,
        action: Action,
        ctx: TraversalContext,
    ) -> BoxFuture<'_, DomainResult<bool>> {
        Box::pin(async move {
            self.check_depth(ctx)?;
            let condition = self.condition_for(&model)?;
            self.resolve_coarse_condition(&condition, &model, &user, &action, ctx)
                .await
        })
    }

    fn resolve_coarse_condition<'a>(
        &'a self,
        condition: &'a Condition,
        model: &'a ModelType,
        user: &'a User,
        action: &'a Action,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            match condition.operator() {
                Operator::Or => {
                    for child in condition.children() {
                        if self.resolve_coarse(child, model, user, action, ctx).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Operator::And => {
                    for child in condition.children() {
                        if !self.resolve_coarse(child, model, user, action, ctx).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                // A negation may grant rows its children never would.
                Operator::Not => Ok(true),
            }
        })
    }

    fn resolve_coarse<'a>(
        &'a self,
        rule: &'a PermissionRule,
        model: &'a ModelType,
        user: &'a User,
        action: &'a Action,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            match rule {
                PermissionRule::Native(_) => {
                    let codename = action.codename(model);
                    self.backend.permission_exists(model, &codename).await
                }

                PermissionRule::Ownership(_) => Ok(!user.is_anonymous()),

                PermissionRule::Delegated(rule) => {
                    let target = rule.actions().apply(action);
                    for field in rule.fields() {
                        let related = self.schema.relation(model, field)?.related.clone();
                        let possible = match rule.source() {
                            Some(source) => {
                                source
                                    .has_collection_permission(&related, user, &target)
                                    .await?
                            }
                            None => {
                                self.resolve_model_coarse(
                                    related,
                                    *user,
                                    target.clone(),
                                    ctx.increment_depth(),
                                )
                                .await?
                            }
                        };
                        if possible {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }

                PermissionRule::Condition(condition) => {
                    self.resolve_coarse_condition(condition, model, user, action, ctx)
                        .await
                }
            }
        })
    }
}
