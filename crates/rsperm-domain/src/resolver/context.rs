//! Internal traversal context for rule evaluation.

/// Internal context carried through recursive evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TraversalContext {
    /// Number of delegations followed so far.
    pub(crate) depth: u32,
}

impl TraversalContext {
    pub(crate) fn new() -> Self {
        Self { depth: 0 }
    }

    pub(crate) fn increment_depth(&self) -> Self {
        Self {
            depth: self.depth + 1,
        }
    }
}
