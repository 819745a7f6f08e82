//! Endpoint handlers.
//!
//! This module binds permission checks to endpoint operations.

pub mod viewset;

pub use viewset::{EndpointError, EndpointResult, ModelViewSet, ViewResponse};
