//! Scenario suite for rsperm.
//!
//! The tests under `tests/` replay permission matrices over a small
//! application: a `Container` model with item models delegating to it
//! through foreign keys, reverse foreign keys and many-to-many links. Each
//! matrix compares three views of the same grants against the in-memory
//! backends: the collection query, per-object decisions, and the status
//! codes returned by the model view set.
