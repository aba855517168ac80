//! # cwrelay
//!
//! Bridges CloudWatch metrics to StatHat: polls `GetMetricData` for a
//! configured set of metrics and forwards every newly published point once.
//!
//! - `relay` - the polling / dedup / forward core
//! - `cloudwatch` - source client (`MetricSource`)
//! - `stathat` - sink client (`Forwarder`)

pub mod cloudwatch;
pub mod relay;
pub mod stathat;
