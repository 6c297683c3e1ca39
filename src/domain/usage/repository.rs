//! Persisted shape of the usage ledger

use serde::{Deserialize, Serialize};

use super::record::UsageRecord;
use crate::domain::storage::SnapshotStore;

/// Usage collection as written to disk, oldest record first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(default)]
    pub records: Vec<UsageRecord>,
}

/// Durable store for the usage ledger
pub type UsageStore = dyn SnapshotStore<UsageSnapshot>;
