//! Translation of rule trees into query descriptions.
//!
//! Every rule contributes zero or more fragments: the base query filtered
//! to the rows it grants, annotated with the marker column so that all
//! fragments project the same columns. The model's final query is the
//! distinct union of its non-empty fragments.

use tracing::{debug, warn};

use crate::error::DomainResult;
use crate::model::{Action, ModelType, User, Value};
use crate::query::{Predicate, Query};
use crate::rules::{Condition, Operator, PermissionRule};

use super::context::TraversalContext;
use super::delegation::correlated_fragment;
use super::evaluate::BoxFuture;
use super::registry::PermissionRegistry;
use super::traits::{ObjectReader, PermissionBackend};

impl<B, R> PermissionRegistry<B, R>
where
    B: PermissionBackend + 'static,
    R: ObjectReader + 'static,
{
    /// Restricts `base` to the rows of `model` the user may act on (boxed for recursion).
    pub(super) fn filtered_query(
        &self,
        model: ModelType,
        base: Query,
        user: User,
        action: Action,
        ctx: TraversalContext,
    ) -> BoxFuture<'_, DomainResult<Query>> {
        Box::pin(async move {
            self.check_depth(ctx)?;
            let condition = self.condition_for(&model)?;
            let mut fragments = self
                .condition_fragments(&condition, &model, &base, &user, &action, ctx)
                .await?;
            fragments.retain(|fragment| !fragment.is_none());

            if fragments.is_empty() {
                debug!(model = %model, action = %action, "No fragment granted");
                return Ok(Query::none(model));
            }
            let first = fragments.remove(0);
            Ok(first.union(fragments)?.distinct())
        })
    }

    fn condition_fragments<'a>(
        &'a self,
        condition: &'a Condition,
        model: &'a ModelType,
        base: &'a Query,
        user: &'a User,
        action: &'a Action,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<Vec<Query>>> {
        Box::pin(async move {
            match condition.operator() {
                Operator::Or => {
                    let mut fragments = Vec::new();
                    for child in condition.children() {
                        fragments.extend(
                            self.rule_fragments(child, model, base, user, action, ctx)
                                .await?,
                        );
                    }
                    Ok(fragments)
                }
                Operator::And => {
                    let mut branches = Vec::with_capacity(condition.children().len());
                    for child in condition.children() {
                        let mut fragments = self
                            .rule_fragments(child, model, base, user, action, ctx)
                            .await?;
                        fragments.retain(|fragment| !fragment.is_none());
                        if fragments.is_empty() {
                            return Ok(Vec::new());
                        }
                        let first = fragments.remove(0);
                        branches.push(first.union(fragments)?);
                    }
                    if branches.is_empty() {
                        return Ok(Vec::new());
                    }
                    let first = branches.remove(0);
                    Ok(vec![first.intersection(branches)?])
                }
                Operator::Not => {
                    warn!(
                        model = %model,
                        action = %action,
                        "NOT conditions cannot be translated into a query; contributing no rows"
                    );
                    Ok(Vec::new())
                }
            }
        })
    }

    fn rule_fragments<'a>(
        &'a self,
        rule: &'a PermissionRule,
        model: &'a ModelType,
        base: &'a Query,
        user: &'a User,
        action: &'a Action,
        ctx: TraversalContext,
    ) -> BoxFuture<'a, DomainResult<Vec<Query>>> {
        Box::pin(async move {
            let marker = self.config.marker_column.as_str();
            match rule {
                PermissionRule::Native(_) => {
                    let codename = action.codename(model);
                    if !self.backend.permission_exists(model, &codename).await? {
                        return Ok(Vec::new());
                    }
                    let rows = if self.backend.has_role_permission(user, &codename).await? {
                        base.clone()
                    } else {
                        self.backend
                            .rows_with_permission(user, &codename, base.clone())
                            .await?
                    };
                    Ok(vec![rows.annotate(marker, true)])
                }

                PermissionRule::Ownership(rule) => {
                    let Some(id) = user.id() else {
                        return Ok(Vec::new());
                    };
                    let fragment = base
                        .clone()
                        .filter(Predicate::FieldEquals {
                            path: rule.path().clone(),
                            value: Value::from(id),
                        })
                        .annotate(marker, true);
                    Ok(vec![fragment])
                }

                PermissionRule::Delegated(rule) => {
                    let target = rule.actions().apply(action);
                    let mut fragments = Vec::with_capacity(rule.fields().len());
                    for field in rule.fields() {
                        let relation = self.schema.relation(model, field)?;
                        let related = &relation.related;
                        let subquery = match rule.source() {
                            Some(source) => source.collection_query(related, user, &target).await?,
                            None => {
                                self.filtered_query(
                                    related.clone(),
                                    (self.base_query)(related),
                                    *user,
                                    target.clone(),
                                    ctx.increment_depth(),
                                )
                                .await?
                            }
                        };
                        if subquery.is_none() {
                            continue;
                        }
                        fragments.push(correlated_fragment(base, relation, subquery, marker));
                    }
                    Ok(fragments)
                }

                PermissionRule::Condition(condition) => {
                    self.condition_fragments(condition, model, base, user, action, ctx)
                        .await
                }
            }
        })
    }
}
