//! Hourly quota accounting
//!
//! Per-key request counters bucketed by hour, with the race-free
//! increment/verify/rollback admission protocol.

mod counter;

pub use counter::QuotaCounter;
