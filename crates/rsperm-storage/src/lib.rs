//! rsperm-storage: In-memory collaborators for the permission registry
//!
//! This crate provides:
//! - RecordStore trait for row storage
//! - In-memory database implementing row lookups and query evaluation
//! - In-memory native ACL backend (role and row permissions)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsperm-storage                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs - RecordStore trait definition   │
//! │  memory.rs - Rows, ObjectReader, executor   │
//! │  acl.rs    - Native PermissionBackend       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod acl;
pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use acl::MemoryAclBackend;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDatabase;
pub use traits::{Fields, RecordStore};
