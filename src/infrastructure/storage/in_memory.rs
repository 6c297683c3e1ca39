//! In-memory snapshot store

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::storage::SnapshotStore;
use crate::domain::DomainError;

/// Keeps the last saved snapshot in memory
///
/// Useful for testing and for running without durable state. Data is lost
/// when the process terminates.
#[derive(Debug)]
pub struct InMemorySnapshotStore<T> {
    snapshot: Mutex<Option<T>>,
    should_fail: AtomicBool,
    saves: AtomicUsize,
}

impl<T> Default for InMemorySnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemorySnapshotStore<T> {
    /// Creates an empty store
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(None),
            should_fail: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }

    /// Creates a store that already holds a snapshot
    pub fn with_snapshot(snapshot: T) -> Self {
        let store = Self::new();
        *store.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
        store
    }

    /// Make every subsequent load and save fail
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_should_fail(&self) -> Result<(), DomainError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(DomainError::persistence("In-memory store configured to fail"));
        }
        Ok(())
    }
}

impl<T: Clone> InMemorySnapshotStore<T> {
    /// Last saved snapshot, if any
    pub fn current(&self) -> Option<T> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<T> SnapshotStore<T> for InMemorySnapshotStore<T>
where
    T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Option<T>, DomainError> {
        self.check_should_fail()?;
        Ok(self.current())
    }

    async fn save(&self, snapshot: &T) -> Result<(), DomainError> {
        self.check_should_fail()?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store_loads_none() {
        let store = InMemorySnapshotStore::<Vec<u32>>::new();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_count() {
        let store = InMemorySnapshotStore::<Vec<u32>>::new();

        store.save(&vec![1, 2]).await.unwrap();
        store.save(&vec![3]).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(vec![3]));
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemorySnapshotStore::with_snapshot(vec![7u32]);
        store.set_should_fail(true);

        assert!(store.load().await.is_err());
        assert!(store.save(&vec![]).await.is_err());
        assert_eq!(store.save_count(), 0);

        store.set_should_fail(false);
        assert_eq!(store.load().await.unwrap(), Some(vec![7]));
    }
}
