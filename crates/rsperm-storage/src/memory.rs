//! In-memory row storage and query evaluation.
//!
//! Each model of the schema gets a table of rows keyed by id. Query
//! descriptions are evaluated to id sets: filters test rows one by one,
//! unions and intersections combine sets, and `Exists` evaluates its
//! subquery once per predicate and then checks each outer row's related
//! ids against it. Since results are sets, `Distinct` needs no work.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use rsperm_domain::error::DomainResult;
use rsperm_domain::model::{
    FieldPath, ModelType, Object, ObjectId, RelationField, RelationKind, Schema, Value,
};
use rsperm_domain::query::{Predicate, Query, QueryNode};
use rsperm_domain::resolver::{ObjectReader, QueryExecutor};

use crate::error::{StorageError, StorageResult};
use crate::traits::{validate_fields, Fields, RecordStore};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<ObjectId, Object>,
    last_id: i64,
}

/// In-memory implementation of RecordStore, ObjectReader and QueryExecutor.
///
/// # Performance Characteristics
///
/// - **Insert / get / update / delete**: O(log N) (BTreeMap per table)
/// - **Reverse and many-to-many lookups**: O(N) scan of the related table
/// - **Query evaluation**: O(N) per filter; `Exists` subqueries are
///   evaluated once per predicate, not once per row
///
/// Row guards are never held across lookups, so evaluation can freely read
/// several tables.
#[derive(Debug)]
pub struct MemoryDatabase {
    schema: Arc<Schema>,
    tables: DashMap<ModelType, Table>,
}

impl MemoryDatabase {
    /// Creates an empty database with one table per model of `schema`.
    pub fn new(schema: Arc<Schema>) -> Self {
        let tables = DashMap::new();
        for descriptor in schema.models() {
            tables.insert(descriptor.model.clone(), Table::default());
        }
        Self { schema, tables }
    }

    /// Creates a new in-memory database wrapped in Arc.
    pub fn new_shared(schema: Arc<Schema>) -> Arc<Self> {
        Arc::new(Self::new(schema))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Adds a link row connecting `source` and `target` through a
    /// many-to-many relation of `source`'s model.
    pub async fn link(
        &self,
        source: &Object,
        relation: &str,
        target: ObjectId,
    ) -> StorageResult<Object> {
        let relation = self.relation(&source.model, relation)?;
        let RelationKind::ManyToMany {
            through,
            source_column,
            target_column,
        } = &relation.kind
        else {
            return Err(StorageError::InvalidInput {
                message: format!(
                    "{}.{} is not a many-to-many relation",
                    source.model, relation.name
                ),
            });
        };
        let fields = Fields::from([
            (source_column.clone(), Value::from(source.id)),
            (target_column.clone(), Value::from(target)),
        ]);
        self.insert(through, fields).await
    }

    fn relation(&self, model: &ModelType, name: &str) -> StorageResult<RelationField> {
        self.schema
            .get(model)
            .ok()
            .and_then(|descriptor| descriptor.get_relation(name))
            .cloned()
            .ok_or_else(|| StorageError::RelationNotFound {
                model: model.to_string(),
                relation: name.to_string(),
            })
    }

    fn row(&self, model: &ModelType, id: ObjectId) -> StorageResult<Option<Object>> {
        let table = self.table(model)?;
        Ok(table.rows.get(&id).cloned())
    }

    fn table(
        &self,
        model: &ModelType,
    ) -> StorageResult<dashmap::mapref::one::Ref<'_, ModelType, Table>> {
        self.tables
            .get(model)
            .ok_or_else(|| StorageError::ModelNotFound {
                model: model.to_string(),
            })
    }

    fn ids(&self, model: &ModelType) -> StorageResult<BTreeSet<ObjectId>> {
        Ok(self.table(model)?.rows.keys().copied().collect())
    }

    fn rows_where(&self, model: &ModelType, column: &str, value: &Value) -> StorageResult<Vec<Object>> {
        let table = self.table(model)?;
        Ok(table
            .rows
            .values()
            .filter(|row| row.field(column) == value)
            .cloned()
            .collect())
    }

    /// Ids of the rows reachable from `row` through `relation`.
    fn related_ids(&self, row: &Object, relation: &RelationField) -> StorageResult<Vec<ObjectId>> {
        let own_id = Value::from(row.id);
        match &relation.kind {
            RelationKind::ForeignKey { column } => {
                Ok(row.field(column).as_object_id().into_iter().collect())
            }
            RelationKind::Reverse { column } => Ok(self
                .rows_where(&relation.related, column, &own_id)?
                .into_iter()
                .map(|related| related.id)
                .collect()),
            RelationKind::ManyToMany {
                through,
                source_column,
                target_column,
            } => Ok(self
                .rows_where(through, source_column, &own_id)?
                .iter()
                .filter_map(|link| link.field(target_column).as_object_id())
                .collect()),
        }
    }

    fn related_rows(&self, row: &Object, relation: &RelationField) -> StorageResult<Vec<Object>> {
        let mut related = Vec::new();
        for id in self.related_ids(row, relation)? {
            if let Some(object) = self.row(&relation.related, id)? {
                related.push(object);
            }
        }
        Ok(related)
    }

    fn values_at_path(&self, row: &Object, path: &FieldPath) -> StorageResult<Vec<Value>> {
        let mut frontier = vec![row.clone()];
        for segment in path.relations() {
            let mut next = Vec::new();
            for current in &frontier {
                let relation = self.relation(&current.model, segment)?;
                next.extend(self.related_rows(current, &relation)?);
            }
            frontier = next;
        }
        Ok(frontier
            .iter()
            .map(|current| current.field(path.field()).clone())
            .collect())
    }

    /// Evaluates a query description to the ids it selects.
    fn evaluate(&self, query: &Query) -> StorageResult<BTreeSet<ObjectId>> {
        match query.node() {
            QueryNode::All => self.ids(query.model()),
            QueryNode::Empty => Ok(BTreeSet::new()),
            QueryNode::Annotate { source, .. } | QueryNode::Distinct(source) => {
                self.evaluate(source)
            }
            QueryNode::Union(parts) => {
                let mut ids = BTreeSet::new();
                for part in parts {
                    ids.extend(self.evaluate(part)?);
                }
                Ok(ids)
            }
            QueryNode::Intersection(parts) => {
                let mut parts = parts.iter();
                let Some(first) = parts.next() else {
                    return Ok(BTreeSet::new());
                };
                let mut ids = self.evaluate(first)?;
                for part in parts {
                    if ids.is_empty() {
                        break;
                    }
                    let other = self.evaluate(part)?;
                    ids.retain(|id| other.contains(id));
                }
                Ok(ids)
            }
            QueryNode::Filter { source, predicate } => {
                let candidates = self.evaluate(source)?;
                self.apply_predicate(query.model(), candidates, predicate)
            }
        }
    }

    fn apply_predicate(
        &self,
        model: &ModelType,
        candidates: BTreeSet<ObjectId>,
        predicate: &Predicate,
    ) -> StorageResult<BTreeSet<ObjectId>> {
        match predicate {
            Predicate::IdIn(ids) => Ok(candidates.intersection(ids).copied().collect()),
            Predicate::FieldEquals { path, value } => {
                let mut matched = BTreeSet::new();
                for id in candidates {
                    let Some(row) = self.row(model, id)? else {
                        continue;
                    };
                    if self.values_at_path(&row, path)?.contains(value) {
                        matched.insert(id);
                    }
                }
                Ok(matched)
            }
            Predicate::Exists { relation, subquery } => {
                if subquery.model() != &relation.related {
                    return Err(StorageError::QueryError {
                        message: format!(
                            "subquery over {} used for relation {} to {}",
                            subquery.model(),
                            relation.name,
                            relation.related
                        ),
                    });
                }
                let granted = self.evaluate(subquery)?;
                let mut matched = BTreeSet::new();
                if granted.is_empty() {
                    return Ok(matched);
                }
                for id in candidates {
                    let Some(row) = self.row(model, id)? else {
                        continue;
                    };
                    if self
                        .related_ids(&row, relation)?
                        .iter()
                        .any(|related| granted.contains(related))
                    {
                        matched.insert(id);
                    }
                }
                Ok(matched)
            }
        }
    }
}

/// Constant annotation columns of a query, outermost first.
fn annotations(query: &Query) -> Vec<(String, bool)> {
    match query.node() {
        QueryNode::All | QueryNode::Empty => Vec::new(),
        QueryNode::Filter { source, .. } | QueryNode::Distinct(source) => annotations(source),
        QueryNode::Annotate {
            source,
            column,
            value,
        } => {
            let mut columns = annotations(source);
            columns.push((column.clone(), *value));
            columns
        }
        QueryNode::Union(parts) | QueryNode::Intersection(parts) => {
            parts.first().map(annotations).unwrap_or_default()
        }
    }
}

#[async_trait]
impl RecordStore for MemoryDatabase {
    #[instrument(skip(self, fields), fields(model = %model))]
    async fn insert(&self, model: &ModelType, fields: Fields) -> StorageResult<Object> {
        let descriptor = self
            .schema
            .get(model)
            .map_err(|_| StorageError::ModelNotFound {
                model: model.to_string(),
            })?;
        validate_fields(descriptor, &fields)?;

        let mut table = self
            .tables
            .get_mut(model)
            .ok_or_else(|| StorageError::ModelNotFound {
                model: model.to_string(),
            })?;
        table.last_id += 1;
        let id = ObjectId(table.last_id);
        let object = Object {
            model: model.clone(),
            id,
            fields,
        };
        table.rows.insert(id, object.clone());
        debug!(model = %model, id = %id, "Inserted row");
        Ok(object)
    }

    async fn get(&self, model: &ModelType, id: ObjectId) -> StorageResult<Object> {
        self.row(model, id)?.ok_or_else(|| StorageError::RowNotFound {
            model: model.to_string(),
            id: id.0,
        })
    }

    #[instrument(skip(self, fields), fields(model = %model, id = %id))]
    async fn update(
        &self,
        model: &ModelType,
        id: ObjectId,
        fields: Fields,
    ) -> StorageResult<Object> {
        let descriptor = self
            .schema
            .get(model)
            .map_err(|_| StorageError::ModelNotFound {
                model: model.to_string(),
            })?;
        validate_fields(descriptor, &fields)?;

        let mut table = self
            .tables
            .get_mut(model)
            .ok_or_else(|| StorageError::ModelNotFound {
                model: model.to_string(),
            })?;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StorageError::RowNotFound {
                model: model.to_string(),
                id: id.0,
            })?;
        row.fields.extend(fields);
        Ok(row.clone())
    }

    #[instrument(skip(self), fields(model = %model, id = %id))]
    async fn delete(&self, model: &ModelType, id: ObjectId) -> StorageResult<()> {
        let mut table = self
            .tables
            .get_mut(model)
            .ok_or_else(|| StorageError::ModelNotFound {
                model: model.to_string(),
            })?;
        if table.rows.remove(&id).is_none() {
            return Err(StorageError::RowNotFound {
                model: model.to_string(),
                id: id.0,
            });
        }
        Ok(())
    }

    async fn list(&self, model: &ModelType) -> StorageResult<Vec<Object>> {
        Ok(self.table(model)?.rows.values().cloned().collect())
    }
}

#[async_trait]
impl ObjectReader for MemoryDatabase {
    async fn get_object(&self, model: &ModelType, id: ObjectId) -> DomainResult<Option<Object>> {
        Ok(self.row(model, id)?)
    }

    async fn related_objects(
        &self,
        object: &Object,
        relation: &RelationField,
    ) -> DomainResult<Vec<Object>> {
        Ok(self.related_rows(object, relation)?)
    }
}

#[async_trait]
impl QueryExecutor for MemoryDatabase {
    #[instrument(skip(self, query), fields(model = %query.model()))]
    async fn execute(&self, query: &Query) -> DomainResult<Vec<Object>> {
        let ids = self.evaluate(query)?;
        let columns = annotations(query);

        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(mut row) = self.row(query.model(), id)? {
                for (column, value) in &columns {
                    row.fields.insert(column.clone(), Value::Bool(*value));
                }
                rows.push(row);
            }
        }
        debug!(query = %query, rows = rows.len(), "Executed query");
        Ok(rows)
    }

    async fn execute_ids(&self, query: &Query) -> DomainResult<Vec<ObjectId>> {
        Ok(self.evaluate(query)?.into_iter().collect())
    }
}
