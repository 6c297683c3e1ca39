//! Hourly quota domain
//!
//! Quota is accounted in hour buckets: the integer quotient of Unix time by
//! 3600 seconds. A key saturated in hour `H` has its full limit again in
//! hour `H + 1`.

mod admission;

pub use admission::AdmitResult;

use chrono::Utc;

/// Length of one accounting bucket
pub const SECONDS_PER_HOUR: u64 = 3600;

/// Hours of history a counter keeps; also the widest window query
pub const RETAINED_HOURS: u64 = 24;

/// Hour bucket containing the given Unix time
pub fn hour_index(epoch_seconds: u64) -> u64 {
    epoch_seconds / SECONDS_PER_HOUR
}

/// Seconds left until the next hour boundary (1..=3600)
pub fn seconds_until_next_hour(epoch_seconds: u64) -> u64 {
    SECONDS_PER_HOUR - epoch_seconds % SECONDS_PER_HOUR
}

/// Unix time of the start of the hour after the one containing `epoch_seconds`
pub fn next_hour_boundary(epoch_seconds: u64) -> u64 {
    (hour_index(epoch_seconds) + 1) * SECONDS_PER_HOUR
}

/// Current Unix time in whole seconds
pub fn now_epoch_seconds() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_index() {
        assert_eq!(hour_index(0), 0);
        assert_eq!(hour_index(3599), 0);
        assert_eq!(hour_index(3600), 1);
        assert_eq!(hour_index(7_200 * 1000 + 1), 2000);
    }

    #[test]
    fn test_seconds_until_next_hour() {
        assert_eq!(seconds_until_next_hour(3600), 3600);
        assert_eq!(seconds_until_next_hour(3601), 3599);
        assert_eq!(seconds_until_next_hour(7199), 1);
    }

    #[test]
    fn test_next_hour_boundary() {
        assert_eq!(next_hour_boundary(3600), 7200);
        assert_eq!(next_hour_boundary(7199), 7200);
    }
}
