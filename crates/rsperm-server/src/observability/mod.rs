//! Observability infrastructure for rsperm.
//!
//! This module provides structured logging configuration.

mod logging;

pub use logging::{create_json_layer, init_logging, LoggingConfig};
