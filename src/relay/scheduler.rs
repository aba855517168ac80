//! Poll cadence

use std::time::Duration;

/// Time left in the interval after an iteration that took `elapsed`.
///
/// Never negative: an overrun yields zero and the next poll starts at once.
pub fn drift_corrected_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}
