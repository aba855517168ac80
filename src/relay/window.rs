//! Fetch window planning
//!
//! Queries are aligned to minute boundaries so they line up with the
//! source's one-minute aggregation buckets. The window ends one minute past
//! the current minute and looks back a fixed span to absorb publication lag.

use chrono::{DateTime, Duration, DurationRound, Utc};

/// Default look-back span in minutes
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 5;

/// Half-open query interval `[start, end)`, both on whole minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Computes the window for each poll. Pure function of `now`.
#[derive(Debug, Clone, Copy)]
pub struct WindowPlanner {
    lookback: Duration,
}

impl Default for WindowPlanner {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_LOOKBACK_MINUTES))
    }
}

impl WindowPlanner {
    pub fn new(lookback: Duration) -> Self {
        Self { lookback }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    pub fn plan(&self, now: DateTime<Utc>) -> FetchWindow {
        let end = truncate_to_minute(now) + Duration::minutes(1);
        FetchWindow {
            start: end - self.lookback,
            end,
        }
    }
}

/// Drop seconds and sub-second precision
pub fn truncate_to_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    // duration_trunc only fails for spans wider than the timestamp range
    now.duration_trunc(Duration::minutes(1)).unwrap_or(now)
}
