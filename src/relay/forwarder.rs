//! Sink side of the relay: pushes one point to the aggregation service

use super::error::ForwardError;
use async_trait::async_trait;

#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Publish `value` for `name` at unix time `timestamp`
    async fn forward(&self, name: &str, value: f64, timestamp: i64) -> Result<(), ForwardError>;
}
