//! Statically declared relation metadata for each model.
//!
//! Relation descriptors replace runtime inspection of model classes: each
//! model declares its plain fields and its relation fields (name, related
//! model and how the relation is stored) up front, so misconfigured
//! delegations are caught when permissions are registered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

use super::types::{FieldPath, ModelType};

/// Whether a relation yields at most one or any number of related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// How a relation is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// This model holds `column`, referencing the related row's id.
    ForeignKey { column: String },
    /// The related model holds `column`, referencing this row's id.
    Reverse { column: String },
    /// Rows of `through` link this model (`source_column`) to the related
    /// model (`target_column`).
    ManyToMany {
        through: ModelType,
        source_column: String,
        target_column: String,
    },
}

/// A relation field declared on a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationField {
    pub name: String,
    pub related: ModelType,
    pub kind: RelationKind,
}

impl RelationField {
    /// A to-one foreign key stored in the `{name}_id` column.
    pub fn foreign_key(name: impl Into<String>, related: ModelType) -> Self {
        let name = name.into();
        let column = format!("{name}_id");
        Self {
            name,
            related,
            kind: RelationKind::ForeignKey { column },
        }
    }

    /// The reverse side of a foreign key declared on `related` as `column`.
    pub fn reverse(name: impl Into<String>, related: ModelType, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            related,
            kind: RelationKind::Reverse {
                column: column.into(),
            },
        }
    }

    /// A many-to-many relation through a link table.
    pub fn many_to_many(
        name: impl Into<String>,
        related: ModelType,
        through: ModelType,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            related,
            kind: RelationKind::ManyToMany {
                through,
                source_column: source_column.into(),
                target_column: target_column.into(),
            },
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self.kind {
            RelationKind::ForeignKey { .. } => Cardinality::ToOne,
            RelationKind::Reverse { .. } | RelationKind::ManyToMany { .. } => Cardinality::ToMany,
        }
    }
}

/// Declared fields and relations of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model: ModelType,
    pub fields: Vec<String>,
    pub relations: Vec<RelationField>,
}

impl ModelDescriptor {
    pub fn new(model: ModelType) -> Self {
        Self {
            model,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Declares a plain field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Declares a relation field. Foreign keys also declare their column.
    pub fn relation(mut self, relation: RelationField) -> Self {
        if let RelationKind::ForeignKey { column } = &relation.kind {
            self.fields.push(column.clone());
        }
        self.relations.push(relation);
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationField> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// The set of model descriptors known to a registry.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: HashMap<ModelType, ModelDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model descriptor, replacing any previous one for the same model.
    pub fn with_model(mut self, descriptor: ModelDescriptor) -> Self {
        self.models.insert(descriptor.model.clone(), descriptor);
        self
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn contains(&self, model: &ModelType) -> bool {
        self.models.contains_key(model)
    }

    pub fn get(&self, model: &ModelType) -> DomainResult<&ModelDescriptor> {
        self.models
            .get(model)
            .ok_or_else(|| DomainError::TypeNotFound {
                type_name: model.to_string(),
            })
    }

    /// Looks up a relation field on a model.
    pub fn relation(&self, model: &ModelType, name: &str) -> DomainResult<&RelationField> {
        self.get(model)?
            .get_relation(name)
            .ok_or_else(|| DomainError::RelationNotFound {
                type_name: model.to_string(),
                relation: name.to_string(),
            })
    }

    /// Validates that every relation segment of `path` exists and that the
    /// final segment is a plain field of the model it lands on.
    ///
    /// Returns the model owning the final field.
    pub fn validate_path(&self, model: &ModelType, path: &FieldPath) -> DomainResult<ModelType> {
        let mut current = model.clone();
        for segment in path.relations() {
            current = self.relation(&current, segment)?.related.clone();
        }
        let descriptor = self.get(&current)?;
        if !descriptor.has_field(path.field()) {
            return Err(DomainError::FieldNotFound {
                type_name: current.to_string(),
                field: path.field().to_string(),
            });
        }
        Ok(current)
    }
}
