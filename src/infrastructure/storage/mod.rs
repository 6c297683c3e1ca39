//! Storage infrastructure - snapshot store implementations

mod factory;
mod in_memory;
mod json_file;

pub use factory::{StorageFactory, StorageType};
pub use in_memory::InMemorySnapshotStore;
pub use json_file::JsonFileStore;
