//! Configuration for the rule registry.

use crate::query::GRANTED_MARKER;

/// Configuration for the rule registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum delegation depth before evaluation is aborted.
    ///
    /// Cyclic relation graphs are a deployment error; the limit turns them
    /// into a `DepthLimitExceeded` error instead of unbounded recursion.
    pub max_depth: u32,
    /// Whether registrations prepend a native rule unless told otherwise.
    pub native_default: bool,
    /// Boolean marker column annotated onto every query fragment.
    pub marker_column: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_depth: 25,
            native_default: true,
            marker_column: GRANTED_MARKER.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Creates a new configuration with the specified max depth.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Creates a new configuration with the native default toggled.
    pub fn with_native_default(mut self, native_default: bool) -> Self {
        self.native_default = native_default;
        self
    }

    /// Creates a new configuration with a different marker column.
    pub fn with_marker_column(mut self, marker_column: impl Into<String>) -> Self {
        self.marker_column = marker_column.into();
        self
    }
}
