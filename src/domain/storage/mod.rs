//! Storage domain - snapshot persistence abstraction
//!
//! Each collection owned by the control plane is persisted as one document
//! that is loaded once at startup and rewritten in full on save.

mod repository;

pub use repository::SnapshotStore;
