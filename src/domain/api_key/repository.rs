//! Persisted shape of the key collection

use std::collections::BTreeMap;

use super::entity::ApiKey;
use crate::domain::storage::SnapshotStore;

/// Key collection as written to disk: `key_id -> key`
pub type ApiKeySnapshot = BTreeMap<String, ApiKey>;

/// Durable store for the whole key collection
pub type ApiKeyStore = dyn SnapshotStore<ApiKeySnapshot>;
