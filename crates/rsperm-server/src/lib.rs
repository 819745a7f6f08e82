//! rsperm-server: Configuration, logging and endpoint binding
//!
//! This crate wires the permission registry into an application:
//! - Configuration management (YAML file + environment overrides)
//! - Structured logging initialisation
//! - Model view sets mapping endpoint operations to permission checks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsperm-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Configuration management  │
//! │  observability/ - Logging setup             │
//! │  handlers/                                  │
//! │    viewset.rs   - Operation → action checks │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod handlers;
pub mod observability;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
pub use handlers::{EndpointError, ModelViewSet, ViewResponse};
pub use observability::{init_logging, LoggingConfig};
