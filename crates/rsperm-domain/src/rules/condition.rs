//! Boolean combinators over permission rules.

use super::PermissionRule;

/// Reduction applied to a condition's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Any child grants.
    Or,
    /// Every child grants.
    And,
    /// No child grants. Not translatable into a query.
    Not,
}

/// An immutable AND / OR / NOT node over an ordered list of rules.
///
/// Child order does not change the result but is preserved so that
/// generated queries are reproducible.
#[derive(Debug, Clone)]
pub struct Condition {
    operator: Operator,
    children: Vec<PermissionRule>,
}

impl Condition {
    pub fn new(operator: Operator, children: Vec<PermissionRule>) -> Self {
        Self { operator, children }
    }

    pub fn or(children: impl IntoIterator<Item = PermissionRule>) -> Self {
        Self::new(Operator::Or, children.into_iter().collect())
    }

    pub fn and(children: impl IntoIterator<Item = PermissionRule>) -> Self {
        Self::new(Operator::And, children.into_iter().collect())
    }

    pub fn not(children: impl IntoIterator<Item = PermissionRule>) -> Self {
        Self::new(Operator::Not, children.into_iter().collect())
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn children(&self) -> &[PermissionRule] {
        &self.children
    }

    /// True if a NOT node occurs anywhere in this tree.
    pub fn contains_negation(&self) -> bool {
        self.operator == Operator::Not
            || self.children.iter().any(|child| match child {
                PermissionRule::Condition(inner) => inner.contains_negation(),
                _ => false,
            })
    }
}
