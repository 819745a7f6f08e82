//! Query descriptions over a model's collection.
//!
//! The domain layer never executes queries. It builds a relational-algebra
//! description that a [`QueryExecutor`](crate::resolver::QueryExecutor)
//! evaluates against real storage:
//!
//! ```text
//! Query { model, node }
//!   All | Empty
//!   Filter(source, predicate)      predicate: FieldEquals | IdIn | Exists
//!   Annotate(source, column, bool)
//!   Union([..]) | Intersection([..])
//!   Distinct(source)
//! ```
//!
//! `Empty` is an explicit "no rows" query. It absorbs filters, annotations,
//! intersections and `distinct`, and disappears from unions, so callers
//! always hold a valid query object.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{DomainError, DomainResult};
use crate::model::{FieldPath, ModelType, ObjectId, RelationField, Value};

/// Default name of the boolean marker column carried by every fragment.
pub const GRANTED_MARKER: &str = "__granted";

/// Row predicate used by [`QueryNode::Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Value at `path` equals `value`. Paths crossing to-many relations
    /// match when any related row matches.
    FieldEquals { path: FieldPath, value: Value },
    /// Primary key is one of the given ids.
    IdIn(BTreeSet<ObjectId>),
    /// At least one row reachable through `relation` is in `subquery`.
    ///
    /// The subquery is correlated to the outer row by the relation.
    Exists {
        relation: RelationField,
        subquery: Box<Query>,
    },
}

/// A node of a query description.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    All,
    Empty,
    Filter {
        source: Box<Query>,
        predicate: Predicate,
    },
    Annotate {
        source: Box<Query>,
        column: String,
        value: bool,
    },
    Union(Vec<Query>),
    Intersection(Vec<Query>),
    Distinct(Box<Query>),
}

/// A description of a set of rows of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    model: ModelType,
    node: QueryNode,
}

impl Query {
    /// Every row of the model.
    pub fn all(model: ModelType) -> Self {
        Self {
            model,
            node: QueryNode::All,
        }
    }

    /// Explicitly no rows.
    pub fn none(model: ModelType) -> Self {
        Self {
            model,
            node: QueryNode::Empty,
        }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn node(&self) -> &QueryNode {
        &self.node
    }

    /// True for the explicit empty query.
    pub fn is_none(&self) -> bool {
        matches!(self.node, QueryNode::Empty)
    }

    /// Annotation columns projected by this query.
    pub fn columns(&self) -> BTreeSet<&str> {
        match &self.node {
            QueryNode::All | QueryNode::Empty => BTreeSet::new(),
            QueryNode::Filter { source, .. } | QueryNode::Distinct(source) => source.columns(),
            QueryNode::Annotate { source, column, .. } => {
                let mut columns = source.columns();
                columns.insert(column.as_str());
                columns
            }
            QueryNode::Union(parts) | QueryNode::Intersection(parts) => {
                parts.first().map(Query::columns).unwrap_or_default()
            }
        }
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        if self.is_none() {
            return self;
        }
        let model = self.model.clone();
        Self {
            model,
            node: QueryNode::Filter {
                source: Box::new(self),
                predicate,
            },
        }
    }

    /// Adds a constant boolean column.
    pub fn annotate(self, column: impl Into<String>, value: bool) -> Self {
        if self.is_none() {
            return self;
        }
        let model = self.model.clone();
        Self {
            model,
            node: QueryNode::Annotate {
                source: Box::new(self),
                column: column.into(),
                value,
            },
        }
    }

    pub fn distinct(self) -> Self {
        if self.is_none() || matches!(self.node, QueryNode::Distinct(_)) {
            return self;
        }
        let model = self.model.clone();
        Self {
            model,
            node: QueryNode::Distinct(Box::new(self)),
        }
    }

    /// Rows in this query or any of `others`.
    ///
    /// Explicitly empty parts are dropped; nested unions are flattened.
    pub fn union(self, others: impl IntoIterator<Item = Query>) -> DomainResult<Self> {
        let model = self.model.clone();
        let parts = self.combinable(others)?;
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part.node {
                QueryNode::Empty => {}
                QueryNode::Union(inner) => flat.extend(inner),
                _ => flat.push(part),
            }
        }
        Ok(match flat.len() {
            0 => Query::none(model),
            1 => flat.remove(0),
            _ => Self {
                model,
                node: QueryNode::Union(flat),
            },
        })
    }

    /// Rows in this query and in every one of `others`.
    ///
    /// Any explicitly empty part makes the whole intersection empty.
    pub fn intersection(self, others: impl IntoIterator<Item = Query>) -> DomainResult<Self> {
        let model = self.model.clone();
        let mut parts = self.combinable(others)?;
        if parts.iter().any(Query::is_none) {
            return Ok(Query::none(model));
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self {
                model,
                node: QueryNode::Intersection(parts),
            }
        })
    }

    /// Checks that every query shares this query's model and projected columns.
    fn combinable(self, others: impl IntoIterator<Item = Query>) -> DomainResult<Vec<Query>> {
        let mut parts = vec![self];
        parts.extend(others);

        let model = parts[0].model.clone();
        let columns: Option<BTreeSet<String>> = parts
            .iter()
            .find(|q| !q.is_none())
            .map(|q| q.columns().into_iter().map(str::to_string).collect());

        for part in &parts {
            if part.model != model {
                return Err(DomainError::IncompatibleQuery {
                    message: format!("cannot combine {} with {}", model, part.model),
                });
            }
            if part.is_none() {
                continue;
            }
            if let Some(expected) = &columns {
                let actual: BTreeSet<String> =
                    part.columns().into_iter().map(str::to_string).collect();
                if &actual != expected {
                    return Err(DomainError::IncompatibleQuery {
                        message: format!(
                            "projected columns differ on {}: {:?} vs {:?}",
                            model, expected, actual
                        ),
                    });
                }
            }
        }
        Ok(parts)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::FieldEquals { path, value } => write!(f, "{path} = {value}"),
            Predicate::IdIn(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "id IN ({})", ids.join(", "))
            }
            Predicate::Exists { relation, subquery } => {
                write!(f, "EXISTS({} IN {})", relation.name, subquery)
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            QueryNode::All => write!(f, "{}.all()", self.model),
            QueryNode::Empty => write!(f, "{}.none()", self.model),
            QueryNode::Filter { source, predicate } => {
                write!(f, "{source}.filter({predicate})")
            }
            QueryNode::Annotate {
                source,
                column,
                value,
            } => write!(f, "{source}.annotate({column}={value})"),
            QueryNode::Union(parts) => join(f, parts, " | "),
            QueryNode::Intersection(parts) => join(f, parts, " & "),
            QueryNode::Distinct(source) => write!(f, "{source}.distinct()"),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[Query], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{part}")?;
    }
    f.write_str(")")
}
