//! Access control service

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::domain::api_key::{ApiKey, ApiKeySnapshot};
use crate::domain::quota::{hour_index, now_epoch_seconds, AdmitResult, SECONDS_PER_HOUR};
use crate::domain::usage::UsageSnapshot;
use crate::domain::Metadata;
use crate::infrastructure::api_key::ApiKeyService;
use crate::infrastructure::quota::QuotaCounter;
use crate::infrastructure::storage::StorageFactory;
use crate::infrastructure::usage::UsageLedger;

/// Current-hour quota position of one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyQuotaStatus {
    pub key_id: String,
    pub name: String,
    pub is_active: bool,
    pub hourly_limit: u32,
    pub used_this_hour: u64,
    pub remaining: u64,
}

/// Point-in-time summary of the control plane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessStatus {
    pub total_keys: usize,
    pub active_keys: usize,
    pub usage_records: usize,
    pub counter_cells: usize,
    pub keys: Vec<KeyQuotaStatus>,
}

/// Credential validation, quota admission and usage recording
#[derive(Debug)]
pub struct AccessControl {
    keys: Arc<ApiKeyService>,
    quota: Arc<QuotaCounter>,
    usage: Arc<UsageLedger>,
}

impl AccessControl {
    pub fn new(keys: Arc<ApiKeyService>, quota: Arc<QuotaCounter>, usage: Arc<UsageLedger>) -> Self {
        Self { keys, quota, usage }
    }

    /// Open the configured stores and load their contents
    pub async fn from_config(config: &AppConfig) -> Self {
        let storage = &config.storage;

        let key_store =
            StorageFactory::create::<ApiKeySnapshot>(storage.backend, &storage.keys_path());
        let usage_store =
            StorageFactory::create::<UsageSnapshot>(storage.backend, &storage.usage_path());

        info!(
            backend = ?storage.backend,
            keys = %key_store.location(),
            usage = %usage_store.location(),
            "Opening access control stores"
        );

        let keys = ApiKeyService::open(key_store).await;
        let usage = UsageLedger::open(usage_store, config.usage.ledger_config()).await;

        Self::new(Arc::new(keys), Arc::new(QuotaCounter::new()), Arc::new(usage))
    }

    /// Open the configured stores and start background maintenance
    pub async fn launch(config: &AppConfig) -> (Arc<Self>, JoinHandle<()>) {
        let access = Arc::new(Self::from_config(config).await);
        let maintenance = Arc::clone(&access).spawn_maintenance(config.quota.prune_interval());
        (access, maintenance)
    }

    pub fn keys(&self) -> &ApiKeyService {
        &self.keys
    }

    pub fn quota(&self) -> &QuotaCounter {
        &self.quota
    }

    pub fn usage(&self) -> &UsageLedger {
        &self.usage
    }

    /// Resolve a presented credential to an active key
    pub async fn authenticate(&self, credential: &str) -> Option<ApiKey> {
        let credential = credential.trim();
        if credential.is_empty() {
            return None;
        }

        self.keys.validate(credential).await
    }

    /// Admit one request for a key by ID
    ///
    /// Unknown keys are rejected with a limit of zero.
    pub async fn admit(&self, key_id: &str) -> AdmitResult {
        match self.keys.get(key_id).await {
            Some(key) => self.admit_key(&key),
            None => {
                warn!(key_id = %key_id, "Admission requested for unknown API key");
                AdmitResult::rejected(0, now_epoch_seconds())
            }
        }
    }

    /// Admit one request for an already resolved key
    pub fn admit_key(&self, key: &ApiKey) -> AdmitResult {
        self.quota.admit(key.id().as_str(), key.hourly_limit())
    }

    /// Record the outcome of a completed request
    pub async fn record(
        &self,
        key_id: &str,
        endpoint: &str,
        duration_seconds: f64,
        success: bool,
        metadata: Metadata,
    ) {
        self.usage
            .record(key_id, endpoint, duration_seconds, success, metadata)
            .await;
    }

    /// Requests a key has made in the current hour
    ///
    /// The counter only knows what this process admitted, so the persisted
    /// ledger is consulted too and the larger count wins.
    pub async fn used_this_hour(&self, key_id: &str) -> u64 {
        let counted = self.quota.usage_in_last(key_id, 1);
        let recorded = self.usage.count_since(key_id, current_hour_start()).await;

        counted.max(recorded)
    }

    /// Keys, record count and current-hour usage per key
    pub async fn status(&self) -> AccessStatus {
        let listed = self.keys.list().await;

        let mut keys = Vec::with_capacity(listed.len());
        for summary in listed {
            let used_this_hour = self.used_this_hour(&summary.key_id).await;
            keys.push(KeyQuotaStatus {
                remaining: u64::from(summary.rate_limit).saturating_sub(used_this_hour),
                used_this_hour,
                hourly_limit: summary.rate_limit,
                is_active: summary.is_active,
                name: summary.name,
                key_id: summary.key_id,
            });
        }

        AccessStatus {
            total_keys: self.keys.count().await,
            active_keys: self.keys.count_active().await,
            usage_records: self.usage.len().await,
            counter_cells: self.quota.cell_count(),
            keys,
        }
    }

    /// Periodically prune stale counter cells and flush pending usage
    pub fn spawn_maintenance(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let access = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let pruned = access.quota.prune();
                access.usage.flush().await;
                debug!(pruned, "Access control maintenance pass complete");
            }
        })
    }

    /// Write out anything still buffered
    pub async fn shutdown(&self) {
        self.usage.flush().await;
        info!("Access control state flushed");
    }
}

fn current_hour_start() -> DateTime<Utc> {
    let start = hour_index(now_epoch_seconds()) * SECONDS_PER_HOUR;

    i64::try_from(start)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::domain::api_key::ApiKeyUpdate;
    use crate::infrastructure::storage::{InMemorySnapshotStore, StorageType};
    use crate::infrastructure::usage::LedgerConfig;
    use tempfile::TempDir;

    fn create_access() -> AccessControl {
        let keys = ApiKeyService::new(Arc::new(InMemorySnapshotStore::<ApiKeySnapshot>::new()));
        let usage = UsageLedger::new(
            Arc::new(InMemorySnapshotStore::<UsageSnapshot>::new()),
            LedgerConfig::default(),
        );

        AccessControl::new(Arc::new(keys), Arc::new(QuotaCounter::new()), Arc::new(usage))
    }

    #[tokio::test]
    async fn test_request_flow() {
        let access = create_access();
        let issued = access.keys().issue("ci", 2, Metadata::new()).await.unwrap();

        let key = access.authenticate(&issued.secret).await.unwrap();

        let first = access.admit_key(&key);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = access.admit(key.id().as_str()).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = access.admit(key.id().as_str()).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert!(third.retry_after().is_some());

        access
            .record(key.id().as_str(), "/api/prompt", 0.25, true, Metadata::new())
            .await;

        let stats = access.usage().stats(key.id().as_str(), 1).await;
        assert_eq!(stats.total_requests, 1);
    }

    #[tokio::test]
    async fn test_authenticate_trims_and_rejects_blank() {
        let access = create_access();
        let issued = access.keys().issue("ci", 2, Metadata::new()).await.unwrap();

        assert!(access
            .authenticate(&format!("  {}  ", issued.secret))
            .await
            .is_some());
        assert!(access.authenticate("   ").await.is_none());
        assert!(access.authenticate("pmp_unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_admit_unknown_key() {
        let access = create_access();

        let result = access.admit("missing").await;
        assert!(!result.allowed);
        assert_eq!(result.limit, 0);
    }

    #[tokio::test]
    async fn test_usage_survives_key_deletion() {
        let access = create_access();
        let issued = access.keys().issue("ci", 5, Metadata::new()).await.unwrap();
        let id = issued.api_key.id().to_string();

        access.admit(&id).await;
        access.record(&id, "/x", 0.1, false, Metadata::new()).await;
        access.keys().delete(&id).await;

        assert_eq!(access.usage().stats(&id, 1).await.failed_requests, 1);
        assert_eq!(access.quota().usage_in_last(&id, 1), 1);
        assert!(access.keys().get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_status() {
        let access = create_access();
        let a = access.keys().issue("a", 3, Metadata::new()).await.unwrap();
        let b = access.keys().issue("b", 3, Metadata::new()).await.unwrap();
        access
            .keys()
            .update(b.api_key.id().as_str(), ApiKeyUpdate::new().with_active(false))
            .await;

        access.admit(a.api_key.id().as_str()).await;

        let status = access.status().await;
        assert_eq!(status.total_keys, 2);
        assert_eq!(status.active_keys, 1);
        assert_eq!(status.counter_cells, 1);

        let a_status = status
            .keys
            .iter()
            .find(|k| k.key_id == a.api_key.id().as_str())
            .unwrap();
        assert_eq!(a_status.used_this_hour, 1);
        assert_eq!(a_status.remaining, 2);
    }

    #[tokio::test]
    async fn test_maintenance_flushes_pending_usage() {
        let usage_store = Arc::new(InMemorySnapshotStore::<UsageSnapshot>::new());
        let access = Arc::new(AccessControl::new(
            Arc::new(ApiKeyService::new(Arc::new(
                InMemorySnapshotStore::<ApiKeySnapshot>::new(),
            ))),
            Arc::new(QuotaCounter::new()),
            Arc::new(UsageLedger::new(usage_store.clone(), LedgerConfig::default())),
        ));

        access.record("a", "/x", 0.1, true, Metadata::new()).await;
        assert_eq!(usage_store.save_count(), 0);

        let handle = Arc::clone(&access).spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(usage_store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_with_memory_backend() {
        let config = AppConfig {
            storage: StorageConfig {
                backend: StorageType::Memory,
                ..StorageConfig::default()
            },
            ..AppConfig::default()
        };

        let (access, maintenance) = AccessControl::launch(&config).await;
        assert_eq!(access.keys().count().await, 0);
        assert!(!maintenance.is_finished());

        maintenance.abort();
    }

    #[tokio::test]
    async fn test_from_config_persists_across_restarts() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            storage: StorageConfig {
                backend: StorageType::File,
                data_dir: dir.path().to_path_buf(),
                ..StorageConfig::default()
            },
            ..AppConfig::default()
        };

        let secret = {
            let access = AccessControl::from_config(&config).await;
            let issued = access.keys().issue("ci", 2, Metadata::new()).await.unwrap();
            access
                .record(issued.api_key.id().as_str(), "/x", 0.1, true, Metadata::new())
                .await;
            access.shutdown().await;
            issued.secret
        };

        let access = AccessControl::from_config(&config).await;
        let key = access.authenticate(&secret).await.unwrap();
        assert_eq!(access.usage().stats(key.id().as_str(), 1).await.total_requests, 1);
    }

    #[tokio::test]
    async fn test_status_after_restart_counts_recorded_usage() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            storage: StorageConfig {
                backend: StorageType::File,
                data_dir: dir.path().to_path_buf(),
                ..StorageConfig::default()
            },
            ..AppConfig::default()
        };

        let key_id = {
            let access = AccessControl::from_config(&config).await;
            let issued = access.keys().issue("ci", 5, Metadata::new()).await.unwrap();
            let id = issued.api_key.id().to_string();
            for _ in 0..3 {
                assert!(access.admit(&id).await.allowed);
                access.record(&id, "/x", 0.1, true, Metadata::new()).await;
            }
            access.shutdown().await;
            id
        };

        let access = AccessControl::from_config(&config).await;
        assert_eq!(access.quota().cell_count(), 0);
        assert_eq!(access.used_this_hour(&key_id).await, 3);

        let status = access.status().await;
        assert_eq!(status.keys[0].used_this_hour, 3);
        assert_eq!(status.keys[0].remaining, 2);
    }

    #[tokio::test]
    async fn test_used_this_hour_prefers_larger_count() {
        let access = create_access();
        let issued = access.keys().issue("ci", 5, Metadata::new()).await.unwrap();
        let id = issued.api_key.id().to_string();

        // Admitted but still in flight
        access.admit(&id).await;
        access.admit(&id).await;
        access.record(&id, "/x", 0.1, true, Metadata::new()).await;

        assert_eq!(access.used_this_hour(&id).await, 2);
    }
}
