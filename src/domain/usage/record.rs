//! Usage record entities

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Metadata;

/// One completed request against a key
///
/// Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// API key ID that made the request
    pub key_id: String,
    /// Endpoint that was called
    pub endpoint: String,
    /// When the request completed
    pub timestamp: DateTime<Utc>,
    /// Request duration in seconds
    pub duration: f64,
    /// Whether the request was successful
    pub success: bool,
    /// Additional metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl UsageRecord {
    /// Create a successful record stamped with the current time
    pub fn new(key_id: impl Into<String>, endpoint: impl Into<String>, duration: f64) -> Self {
        Self {
            key_id: key_id.into(),
            endpoint: endpoint.into(),
            timestamp: Utc::now(),
            duration: sanitize_duration(duration),
            success: true,
            metadata: Metadata::new(),
        }
    }

    /// Set the outcome
    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Override the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Replace metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// UTC calendar date of the record, `YYYY-MM-DD`
    pub fn day(&self) -> String {
        self.timestamp.date_naive().format("%Y-%m-%d").to_string()
    }
}

// Negative or non-finite durations come from clock skew in callers.
fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

/// Aggregated usage statistics for one key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    /// Total number of requests
    pub total_requests: u64,
    /// Number of successful requests
    pub successful_requests: u64,
    /// Number of failed requests
    pub failed_requests: u64,
    /// Sum of request durations in seconds
    pub total_duration: f64,
    /// `total_duration / total_requests`, or 0 with no requests
    pub average_duration: f64,
    /// Requests per UTC calendar date
    pub requests_per_day: BTreeMap<String, u64>,
}

impl UsageStats {
    /// Create empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate a set of records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut stats = Self::new();

        for record in records {
            stats.add_record(record);
        }

        stats
    }

    /// Add a usage record to the aggregate
    pub fn add_record(&mut self, record: &UsageRecord) {
        self.total_requests += 1;

        if record.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        self.total_duration += record.duration;
        self.average_duration = self.total_duration / self.total_requests as f64;

        *self.requests_per_day.entry(record.day()).or_insert(0) += 1;
    }
}
