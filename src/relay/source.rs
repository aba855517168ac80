//! Source side of the relay: anything that can answer a windowed metric query

use super::error::FetchError;
use super::types::{MetricResult, MetricSpec};
use super::window::FetchWindow;
use async_trait::async_trait;

/// Queries the monitoring backend for a batch of metrics
///
/// Implementations return one `MetricResult` per spec they have an answer
/// for. A spec with no data in the window may be omitted or returned with
/// no samples; neither is an error.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(
        &self,
        window: &FetchWindow,
        specs: &[MetricSpec],
    ) -> Result<Vec<MetricResult>, FetchError>;
}
