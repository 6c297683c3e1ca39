//! Admission decision returned to the boundary

use serde::Serialize;

use super::{next_hour_boundary, seconds_until_next_hour};

/// Outcome of one admit call
///
/// A rejection is an ordinary value, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmitResult {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current hour after this one
    pub remaining: u32,
    /// The key's hourly limit
    pub limit: u32,
    /// Unix time at which the current hour bucket ends
    pub reset_epoch_seconds: u64,
    /// Seconds until `reset_epoch_seconds`
    pub reset_in_seconds: u64,
}

impl AdmitResult {
    pub fn admitted(limit: u32, remaining: u32, now: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset_epoch_seconds: next_hour_boundary(now),
            reset_in_seconds: seconds_until_next_hour(now),
        }
    }

    pub fn rejected(limit: u32, now: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset_epoch_seconds: next_hour_boundary(now),
            reset_in_seconds: seconds_until_next_hour(now),
        }
    }

    /// How long a rejected caller should wait before retrying
    pub fn retry_after(&self) -> Option<u64> {
        (!self.allowed).then_some(self.reset_in_seconds)
    }
}
