//! Core data types shared by the relay
//!
//! - `MetricSpec` - one configured metric (registry entry)
//! - `MetricResult` - what the source returned for one spec in one poll
//! - `Observation` - a point the loop decided is new

use chrono::{DateTime, TimeZone, Utc};

/// Optional narrowing of a source metric (name/value pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// One configured metric to track
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    /// Correlation key for the source query and the watermark key
    pub id: String,

    /// Source namespace (e.g. `AWS/EC2`)
    pub namespace: String,

    /// Source metric name (e.g. `CPUUtilization`)
    pub name: String,

    pub dimension: Option<Dimension>,

    /// Name to republish under. `None` means observe-only.
    pub sink_name: Option<String>,
}

/// A single (timestamp, value) pair from the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unix seconds
    pub timestamp: i64,
    pub value: f64,
}

/// Per-query result from one fetch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricResult {
    pub id: String,
    pub samples: Vec<Sample>,
}

impl MetricResult {
    pub fn new(id: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            id: id.into(),
            samples,
        }
    }

    /// The sample with the greatest timestamp, whatever order the source used.
    ///
    /// Ties keep the first occurrence, so a most-recent-first source gets
    /// position 0 back.
    pub fn latest(&self) -> Option<Sample> {
        self.samples.iter().copied().fold(None, |best, sample| match best {
            Some(b) if b.timestamp >= sample.timestamp => Some(b),
            _ => Some(sample),
        })
    }
}

/// A point the loop accepted as new in the current iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub value: f64,
    pub timestamp: i64,
    pub sink_name: Option<String>,
}

impl Observation {
    /// Render the stdout line: `<id>:\t<value> @ <timestamp>`
    pub fn render_line(&self) -> String {
        format!(
            "{}:\t{:.3} @ {}",
            self.id,
            self.value,
            format_timestamp(self.timestamp)
        )
    }
}

/// Format a unix timestamp as `2006-01-02 15:04:05 +0000 UTC`
pub fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => format_datetime(&dt),
        None => timestamp.to_string(),
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S +0000 UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_picks_max_timestamp() {
        let result = MetricResult::new(
            "cpu",
            vec![
                Sample { timestamp: 60, value: 1.0 },
                Sample { timestamp: 180, value: 3.0 },
                Sample { timestamp: 120, value: 2.0 },
            ],
        );

        let latest = result.latest().unwrap();
        assert_eq!(latest.timestamp, 180);
        assert_eq!(latest.value, 3.0);
    }

    #[test]
    fn test_latest_empty() {
        let result = MetricResult::new("disk", Vec::new());
        assert!(result.latest().is_none());
    }

    #[test]
    fn test_latest_tie_keeps_first() {
        let result = MetricResult::new(
            "cpu",
            vec![
                Sample { timestamp: 120, value: 7.0 },
                Sample { timestamp: 120, value: 8.0 },
            ],
        );
        assert_eq!(result.latest().unwrap().value, 7.0);
    }

    #[test]
    fn test_render_line() {
        let obs = Observation {
            id: "cpu".to_string(),
            value: 42.0,
            timestamp: 1_700_000_040,
            sink_name: None,
        };

        assert_eq!(
            obs.render_line(),
            "cpu:\t42.000 @ 2023-11-14 22:14:00 +0000 UTC"
        );
    }
}
