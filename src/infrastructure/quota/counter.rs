//! Per-key hourly request counter

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::domain::quota::{hour_index, now_epoch_seconds, AdmitResult, RETAINED_HOURS};

/// Composite cell key: one counter per key per hour
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CellKey {
    key_id: String,
    hour: u64,
}

impl CellKey {
    fn new(key_id: &str, hour: u64) -> Self {
        Self {
            key_id: key_id.to_string(),
            hour,
        }
    }
}

#[derive(Debug, Default)]
struct CounterCells {
    cells: HashMap<CellKey, AtomicU64>,
    /// Hours with a live cell, per key
    hours: HashMap<String, BTreeSet<u64>>,
}

impl CounterCells {
    /// Drop a key's cells older than the retention horizon; returns how many
    fn prune_key(&mut self, key_id: &str, current_hour: u64) -> usize {
        let Some(hours) = self.hours.get_mut(key_id) else {
            return 0;
        };

        let cutoff = current_hour.saturating_sub(RETAINED_HOURS);
        let retained = hours.split_off(&cutoff);
        let stale = std::mem::replace(hours, retained);

        for hour in &stale {
            self.cells.remove(&CellKey::new(key_id, *hour));
        }

        if hours.is_empty() {
            self.hours.remove(key_id);
        }

        stale.len()
    }
}

/// Hourly request counter shared by every request
///
/// Increments and rollbacks of an existing cell only need the read lock;
/// the write lock is taken to open a new hour for a key, which is also when
/// that key's stale hours are pruned.
#[derive(Debug, Default)]
pub struct QuotaCounter {
    state: RwLock<CounterCells>,
}

impl QuotaCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one request for `key_id` against `hourly_limit` at the current time
    pub fn admit(&self, key_id: &str, hourly_limit: u32) -> AdmitResult {
        self.admit_at(key_id, hourly_limit, now_epoch_seconds())
    }

    /// Admit one request at the given Unix time
    ///
    /// The cell is incremented first and the post-increment count decides:
    /// above the limit the increment is rolled back, so rejected requests
    /// never consume quota.
    pub fn admit_at(&self, key_id: &str, hourly_limit: u32, now: u64) -> AdmitResult {
        let hour = hour_index(now);
        let count = self.increment(key_id, hour);

        if count > u64::from(hourly_limit) {
            self.decrement(key_id, hour);
            warn!(key_id = %key_id, limit = hourly_limit, "Hourly quota exceeded");
            return AdmitResult::rejected(hourly_limit, now);
        }

        // count <= hourly_limit here, so it fits in u32
        let remaining = hourly_limit - count as u32;
        debug!(key_id = %key_id, count, remaining, "Request admitted");

        AdmitResult::admitted(hourly_limit, remaining, now)
    }

    /// Requests counted for `key_id` in the last `hours` hours, current hour
    /// included
    pub fn usage_in_last(&self, key_id: &str, hours: u64) -> u64 {
        self.usage_in_last_at(key_id, hours, now_epoch_seconds())
    }

    /// `usage_in_last` evaluated at the given Unix time; windows wider than
    /// the retention horizon are clamped to it
    pub fn usage_in_last_at(&self, key_id: &str, hours: u64, now: u64) -> u64 {
        let hours = hours.min(RETAINED_HOURS);
        if hours == 0 {
            return 0;
        }

        let current = hour_index(now);
        let oldest = (current + 1).saturating_sub(hours);

        let state = self.read();
        let Some(live) = state.hours.get(key_id) else {
            return 0;
        };

        live.range(oldest..=current)
            .filter_map(|hour| state.cells.get(&CellKey::new(key_id, *hour)))
            .map(|cell| cell.load(Ordering::SeqCst))
            .sum()
    }

    /// Sweep stale hours for every key
    pub fn prune(&self) -> usize {
        self.prune_at(now_epoch_seconds())
    }

    /// Sweep stale hours for every key relative to the given Unix time
    pub fn prune_at(&self, now: u64) -> usize {
        let current = hour_index(now);
        let mut state = self.write();

        let key_ids: Vec<String> = state.hours.keys().cloned().collect();
        let removed: usize = key_ids
            .iter()
            .map(|key_id| state.prune_key(key_id, current))
            .sum();

        if removed > 0 {
            debug!(removed, "Pruned stale quota cells");
        }

        removed
    }

    /// Drop every cell of a key
    pub fn forget(&self, key_id: &str) -> usize {
        let mut state = self.write();

        let Some(hours) = state.hours.remove(key_id) else {
            return 0;
        };

        for hour in &hours {
            state.cells.remove(&CellKey::new(key_id, *hour));
        }

        hours.len()
    }

    /// Number of live cells across all keys
    pub fn cell_count(&self) -> usize {
        self.read().cells.len()
    }

    fn increment(&self, key_id: &str, hour: u64) -> u64 {
        let cell_key = CellKey::new(key_id, hour);

        {
            let state = self.read();
            if let Some(cell) = state.cells.get(&cell_key) {
                return cell.fetch_add(1, Ordering::SeqCst) + 1;
            }
        }

        let mut state = self.write();
        let count = state
            .cells
            .entry(cell_key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1;

        let hours = state.hours.entry(key_id.to_string()).or_default();
        hours.insert(hour);
        let newest = hours.last().copied().unwrap_or(hour);
        state.prune_key(key_id, newest);

        count
    }

    fn decrement(&self, key_id: &str, hour: u64) {
        let state = self.read();

        if let Some(cell) = state.cells.get(&CellKey::new(key_id, hour)) {
            // Floored at zero
            let _ = cell.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CounterCells> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CounterCells> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
