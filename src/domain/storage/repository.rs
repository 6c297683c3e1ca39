//! Snapshot store trait definition

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::DomainError;

/// Durable load-and-save of a whole collection
///
/// Implementations are not required to be crash-atomic. A missing document is
/// `Ok(None)`; an unreadable or corrupt one is an error and callers decide
/// whether to fall back to an empty collection.
#[async_trait]
pub trait SnapshotStore<T>: Send + Sync + Debug
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Loads the stored snapshot, if one exists
    async fn load(&self) -> Result<Option<T>, DomainError>;

    /// Replaces the stored snapshot
    async fn save(&self, snapshot: &T) -> Result<(), DomainError>;

    /// Human-readable location, used in logs and status output
    fn location(&self) -> String;
}
