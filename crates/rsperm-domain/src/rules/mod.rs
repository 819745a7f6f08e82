//! Permission rules and the boolean combinators that compose them.
//!
//! A model's permissions are a tree of [`PermissionRule`]s:
//!
//! ```text
//! Condition(Or)
//! ├── Native                       role / row-level ACL backend
//! ├── Ownership("owner")           owner field equals requesting user
//! ├── Delegated(["parent"])        permission on the related row
//! └── Condition(And)
//!     ├── ...
//! ```
//!
//! Rules only carry configuration. Evaluation (object decisions, coarse
//! checks and query translation) is a single match over this sum type in
//! the [`resolver`](crate::resolver) module.

mod condition;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use condition::{Condition, Operator};

use crate::error::{DomainError, DomainResult};
use crate::model::{Action, FieldPath};
use crate::resolver::PermissionSource;

/// A single node of a permission tree.
#[derive(Debug, Clone)]
pub enum PermissionRule {
    Native(NativeRule),
    Ownership(OwnershipRule),
    Delegated(DelegatedRule),
    Condition(Condition),
}

impl PermissionRule {
    /// Rule backed by the native role / row-level ACL backend.
    pub fn native() -> Self {
        PermissionRule::Native(NativeRule)
    }

    /// Rule granting access when the field at `path` holds the requesting user.
    pub fn owner(path: &str) -> DomainResult<Self> {
        Ok(PermissionRule::Ownership(OwnershipRule::new(path)?))
    }

    /// Rule granting access through related rows reachable via `fields`.
    pub fn delegated<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PermissionRule::Delegated(DelegatedRule::new(fields))
    }
}

impl From<NativeRule> for PermissionRule {
    fn from(rule: NativeRule) -> Self {
        PermissionRule::Native(rule)
    }
}

impl From<OwnershipRule> for PermissionRule {
    fn from(rule: OwnershipRule) -> Self {
        PermissionRule::Ownership(rule)
    }
}

impl From<DelegatedRule> for PermissionRule {
    fn from(rule: DelegatedRule) -> Self {
        PermissionRule::Delegated(rule)
    }
}

impl From<Condition> for PermissionRule {
    fn from(condition: Condition) -> Self {
        PermissionRule::Condition(condition)
    }
}

/// Model-level or row-level permission from the native ACL backend.
///
/// The codename is derived from the action and model, e.g. `change_container`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeRule;

/// Grants access when the owner field equals the requesting user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRule {
    path: FieldPath,
}

impl OwnershipRule {
    pub fn new(path: &str) -> DomainResult<Self> {
        let path = FieldPath::parse(path).map_err(|_| DomainError::InvalidFieldPath {
            value: path.to_string(),
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }
}

/// How the action is rewritten when a delegated rule recurses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionMapping {
    /// Recurse with the same action.
    #[default]
    Same,
    /// Recurse with a fixed action regardless of the requested one.
    Fixed(Action),
    /// Per-action rewrite; unmapped actions pass through.
    Table(HashMap<Action, Action>),
}

impl ActionMapping {
    pub fn apply(&self, action: &Action) -> Action {
        match self {
            ActionMapping::Same => action.clone(),
            ActionMapping::Fixed(target) => target.clone(),
            ActionMapping::Table(table) => table.get(action).unwrap_or(action).clone(),
        }
    }
}

/// Grants access when the user holds the (remapped) action on any row
/// reachable through one of the relation fields.
#[derive(Clone)]
pub struct DelegatedRule {
    fields: Vec<String>,
    actions: ActionMapping,
    source: Option<Arc<dyn PermissionSource>>,
}

impl DelegatedRule {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            actions: ActionMapping::Same,
            source: None,
        }
    }

    /// Always recurse with `action`.
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions = ActionMapping::Fixed(action);
        self
    }

    /// Rewrite actions through `table` when recursing.
    pub fn with_action_map(mut self, table: HashMap<Action, Action>) -> Self {
        self.actions = ActionMapping::Table(table);
        self
    }

    /// Resolve related rows against another registry instead of the one
    /// evaluating this rule.
    pub fn via(mut self, source: Arc<dyn PermissionSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn actions(&self) -> &ActionMapping {
        &self.actions
    }

    pub fn source(&self) -> Option<&Arc<dyn PermissionSource>> {
        self.source.as_ref()
    }
}

impl fmt::Debug for DelegatedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedRule")
            .field("fields", &self.fields)
            .field("actions", &self.actions)
            .field("external_source", &self.source.is_some())
            .finish()
    }
}
