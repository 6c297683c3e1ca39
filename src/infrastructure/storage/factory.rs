//! Storage factory for runtime storage selection

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::storage::SnapshotStore;

use super::in_memory::InMemorySnapshotStore;
use super::json_file::JsonFileStore;

/// Supported storage types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// JSON documents on the local filesystem
    #[default]
    File,
    /// Process memory only (for testing/development)
    Memory,
}

/// Factory for creating snapshot store instances
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Creates a store for one collection
    pub fn create<T>(storage_type: StorageType, path: &Path) -> Arc<dyn SnapshotStore<T>>
    where
        T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        match storage_type {
            StorageType::File => Arc::new(JsonFileStore::<T>::new(path)),
            StorageType::Memory => Arc::new(InMemorySnapshotStore::<T>::new()),
        }
    }
}
