//! Usage tracking domain
//!
//! Records of completed requests and the statistics derived from them.

mod record;
mod repository;

pub use record::{UsageRecord, UsageStats};
pub use repository::{UsageSnapshot, UsageStore};
