//! Delegation resolver: following relation fields from a row.
//!
//! For object decisions this yields the related rows to recurse into. For
//! queries it builds the existence subquery correlated to the outer row
//! through the relation, which keeps the outer query free of joins (and
//! so of duplicated rows) and composable under union and intersection.

use crate::error::DomainResult;
use crate::model::{FieldPath, Object, RelationField, RelationKind, Schema, Value};
use crate::query::{Predicate, Query};

use super::traits::ObjectReader;

/// Loads the rows reachable from `object` through `relation`.
///
/// A to-one relation whose foreign key is null yields nothing.
pub(crate) async fn related_objects<R>(
    reader: &R,
    object: &Object,
    relation: &RelationField,
) -> DomainResult<Vec<Object>>
where
    R: ObjectReader + ?Sized,
{
    match &relation.kind {
        RelationKind::ForeignKey { column } => match object.field(column).as_object_id() {
            Some(id) => Ok(reader
                .get_object(&relation.related, id)
                .await?
                .into_iter()
                .collect()),
            None => Ok(Vec::new()),
        },
        RelationKind::Reverse { .. } | RelationKind::ManyToMany { .. } => {
            reader.related_objects(object, relation).await
        }
    }
}

/// Collects the values found at `path`, following relation segments.
///
/// Relations that fan out contribute every reachable row's value.
pub(crate) async fn values_at_path<R>(
    reader: &R,
    schema: &Schema,
    object: &Object,
    path: &FieldPath,
) -> DomainResult<Vec<Value>>
where
    R: ObjectReader + ?Sized,
{
    let mut frontier = vec![object.clone()];
    for segment in path.relations() {
        let mut next = Vec::new();
        for row in &frontier {
            let relation = schema.relation(&row.model, segment)?;
            next.extend(related_objects(reader, row, relation).await?);
        }
        frontier = next;
    }
    Ok(frontier
        .iter()
        .map(|row| row.field(path.field()).clone())
        .collect())
}

/// Restricts `base` to rows with at least one related row in `subquery`.
pub(crate) fn correlated_fragment(
    base: &Query,
    relation: &RelationField,
    subquery: Query,
    marker: &str,
) -> Query {
    base.clone()
        .filter(Predicate::Exists {
            relation: relation.clone(),
            subquery: Box::new(subquery),
        })
        .annotate(marker, true)
}
