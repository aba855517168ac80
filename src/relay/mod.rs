//! Metrics relay core
//!
//! Polls a metric source on a fixed cadence, keeps a per-metric watermark of
//! the last forwarded timestamp and pushes each genuinely new point to a sink
//! exactly once.
//!
//! ## Module Organization
//!
//! - `types` - MetricSpec, MetricResult, Observation
//! - `config` - TOML + environment configuration
//! - `registry` - validated, ordered metric list
//! - `window` - minute-aligned fetch windows
//! - `watermark` - last forwarded timestamp per metric
//! - `engine` - the poll / dedup / forward loop
//! - `scheduler` - drift-corrected sleep
//! - `source` / `forwarder` - collaborator traits
//! - `inflight` - tracking of dispatched forward calls
//! - `shutdown` - signal handling and bounded drain
//! - `error_handler` - fetch failure policy and backoff
//! - `error` - error types

pub mod config;
pub mod engine;
pub mod error;
pub mod error_handler;
pub mod forwarder;
pub mod inflight;
pub mod registry;
pub mod scheduler;
pub mod shutdown;
pub mod source;
pub mod types;
pub mod watermark;
pub mod window;

// Re-export commonly used types
pub use config::RelayConfig;
pub use engine::{IterationReport, RelayEngine, RelayStats};
pub use error::{ConfigError, FetchError, ForwardError, RelayError};
pub use error_handler::FetchPolicy;
pub use forwarder::Forwarder;
pub use inflight::InflightForwards;
pub use registry::MetricRegistry;
pub use shutdown::{ShutdownCoordinator, ShutdownHandle};
pub use source::MetricSource;
pub use types::{Dimension, MetricResult, MetricSpec, Observation, Sample};
pub use watermark::WatermarkStore;
pub use window::{FetchWindow, WindowPlanner};
