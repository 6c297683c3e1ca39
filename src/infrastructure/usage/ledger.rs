//! Bounded usage ledger with batched persistence

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::domain::usage::{UsageRecord, UsageSnapshot, UsageStats, UsageStore};
use crate::domain::Metadata;

/// Retention and flush policy
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Records kept; the oldest are evicted first
    pub max_records: usize,
    /// Appends between flushes
    pub flush_every: usize,
    /// Longest time an append waits for a flush
    pub flush_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            flush_every: 10,
            flush_interval: Duration::from_secs(60),
        }
    }
}

impl LedgerConfig {
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every;
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }
}

#[derive(Debug)]
struct LedgerState {
    records: VecDeque<UsageRecord>,
    /// Appends since the last snapshot was taken
    pending: usize,
    last_flush: Instant,
}

/// Append-only log of completed requests
///
/// Appends are flushed to the store in batches: after `flush_every` appends,
/// or on the first append once `flush_interval` has passed since the last
/// flush. Call [`UsageLedger::flush`] on shutdown to write the remainder.
#[derive(Debug)]
pub struct UsageLedger {
    state: RwLock<LedgerState>,
    store: Arc<UsageStore>,
    config: LedgerConfig,
    version: AtomicU64,
    persisted: Mutex<u64>,
}

impl UsageLedger {
    /// Create an empty ledger
    pub fn new(store: Arc<UsageStore>, config: LedgerConfig) -> Self {
        let config = LedgerConfig {
            max_records: config.max_records.max(1),
            flush_every: config.flush_every.max(1),
            ..config
        };

        Self {
            state: RwLock::new(LedgerState {
                records: VecDeque::new(),
                pending: 0,
                last_flush: Instant::now(),
            }),
            store,
            config,
            version: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    /// Create a ledger and load whatever the store holds
    pub async fn open(store: Arc<UsageStore>, config: LedgerConfig) -> Self {
        let ledger = Self::new(store, config);
        ledger.reload().await;
        ledger
    }

    /// Replace the in-memory records with the stored ones
    ///
    /// An unreadable or corrupt store is logged and treated as empty.
    pub async fn reload(&self) -> usize {
        let loaded = match self.store.load().await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                error!(
                    error = %e,
                    location = %self.store.location(),
                    "Failed to load usage records; starting with an empty ledger"
                );
                UsageSnapshot::default()
            }
        };

        let mut records = VecDeque::from(loaded.records);
        while records.len() > self.config.max_records {
            records.pop_front();
        }

        let mut state = self.state.write().await;
        state.records = records;
        state.pending = 0;
        state.last_flush = Instant::now();

        info!(count = state.records.len(), "Loaded usage records");
        state.records.len()
    }

    /// Record one completed request
    pub async fn record(
        &self,
        key_id: &str,
        endpoint: &str,
        duration: f64,
        success: bool,
        metadata: Metadata,
    ) {
        let record = UsageRecord::new(key_id, endpoint, duration)
            .with_success(success)
            .with_metadata(metadata);

        self.append(record).await;
    }

    /// Append a prepared record
    pub async fn append(&self, record: UsageRecord) {
        let due = {
            let mut state = self.state.write().await;

            state.records.push_back(record);
            while state.records.len() > self.config.max_records {
                state.records.pop_front();
            }
            state.pending += 1;

            let flush_due = state.pending >= self.config.flush_every
                || state.last_flush.elapsed() >= self.config.flush_interval;

            flush_due.then(|| self.take_snapshot(&mut state))
        };

        if let Some((snapshot, version)) = due {
            self.persist(snapshot, version).await;
        }
    }

    /// Write out any records appended since the last flush
    pub async fn flush(&self) {
        let due = {
            let mut state = self.state.write().await;
            (state.pending > 0).then(|| self.take_snapshot(&mut state))
        };

        if let Some((snapshot, version)) = due {
            self.persist(snapshot, version).await;
        }
    }

    /// Number of retained records
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Statistics for one key over the last `lookback_days` days
    pub async fn stats(&self, key_id: &str, lookback_days: u32) -> UsageStats {
        self.stats_at(key_id, lookback_days, Utc::now()).await
    }

    /// `stats` evaluated at the given time
    pub async fn stats_at(&self, key_id: &str, lookback_days: u32, now: DateTime<Utc>) -> UsageStats {
        let cutoff = lookback_cutoff(now, lookback_days);
        let state = self.state.read().await;

        UsageStats::from_records(
            state
                .records
                .iter()
                .filter(|r| r.key_id == key_id && r.timestamp >= cutoff),
        )
    }

    /// Statistics for every key that appears in the ledger
    ///
    /// Keys whose records all fall outside the window are reported with
    /// empty statistics.
    pub async fn all_stats(&self, lookback_days: u32) -> BTreeMap<String, UsageStats> {
        self.all_stats_at(lookback_days, Utc::now()).await
    }

    /// `all_stats` evaluated at the given time
    pub async fn all_stats_at(
        &self,
        lookback_days: u32,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, UsageStats> {
        let cutoff = lookback_cutoff(now, lookback_days);
        let state = self.state.read().await;

        let mut stats: BTreeMap<String, UsageStats> = BTreeMap::new();
        for record in &state.records {
            let entry = stats.entry(record.key_id.clone()).or_default();
            if record.timestamp >= cutoff {
                entry.add_record(record);
            }
        }

        stats
    }

    /// Most recent records of a key, newest first
    pub async fn records_for(&self, key_id: &str, limit: usize) -> Vec<UsageRecord> {
        let state = self.state.read().await;

        state
            .records
            .iter()
            .rev()
            .filter(|r| r.key_id == key_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records of a key stamped at or after `since`
    pub async fn count_since(&self, key_id: &str, since: DateTime<Utc>) -> u64 {
        let state = self.state.read().await;

        state
            .records
            .iter()
            .filter(|r| r.key_id == key_id && r.timestamp >= since)
            .count() as u64
    }

    fn take_snapshot(&self, state: &mut LedgerState) -> (UsageSnapshot, u64) {
        state.pending = 0;
        state.last_flush = Instant::now();

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = UsageSnapshot {
            records: state.records.iter().cloned().collect(),
        };

        (snapshot, version)
    }

    async fn persist(&self, snapshot: UsageSnapshot, version: u64) {
        let mut persisted = self.persisted.lock().await;

        if *persisted >= version {
            debug!(version, newest = *persisted, "Skipping superseded usage snapshot");
            return;
        }

        *persisted = version;

        match self.store.save(&snapshot).await {
            Ok(()) => debug!(records = snapshot.records.len(), "Usage records flushed"),
            Err(e) => error!(
                error = %e,
                location = %self.store.location(),
                "Failed to persist usage records"
            ),
        }
    }
}

/// Oldest timestamp inside the lookback window
///
/// A window reaching past the representable range covers every record.
fn lookback_cutoff(now: DateTime<Utc>, lookback_days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(lookback_days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
