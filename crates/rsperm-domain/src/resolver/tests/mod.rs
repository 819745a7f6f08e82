//! Tests for the rule registry.
//!
//! Organized by functionality:
//! - Registration and validation
//! - Object decisions (native, ownership, delegation, combinators)
//! - Coarse collection checks
//! - Query translation
//! - Safety features (depth limiting)
