//! Relay configuration from a TOML file plus environment overrides
//!
//! File path comes from `CWRELAY_CONFIG` (default: `config.toml`).
//!
//! Environment overrides (applied after the file is parsed):
//! - `CWRELAY_SINK_KEY` - sink credential
//! - `CWRELAY_INTERVAL` - poll interval in seconds

use super::error::ConfigError;
use super::error_handler::FetchPolicy;
use super::registry::MetricRegistry;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SINK_URL: &str = "https://api.stathat.com/ez";
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(alias = "sleep")]
    interval: Option<u64>,
    #[serde(alias = "stathat")]
    sink: Option<RawSink>,
    #[serde(default)]
    source: RawSource,
    #[serde(default)]
    fetch: RawFetch,
    #[serde(default)]
    shutdown: RawShutdown,
    #[serde(default)]
    metrics: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSink {
    #[serde(alias = "ezkey")]
    key: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSource {
    region: Option<String>,
    endpoint: Option<String>,
    period: Option<u32>,
    stat: Option<String>,
    lookback_minutes: Option<i64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFetch {
    on_error: Option<String>,
    initial_backoff_secs: Option<u64>,
    max_backoff_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawShutdown {
    grace_secs: Option<u64>,
}

/// Where and how to post forwarded points
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub key: String,
    pub url: String,
}

/// How to query the metric source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub region: String,
    /// Overrides the regional endpoint (tests, VPC endpoints)
    pub endpoint: Option<String>,
    /// Aggregation period in seconds
    pub period: u32,
    pub stat: String,
    pub lookback_minutes: i64,
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            period: 60,
            stat: "Average".to_string(),
            lookback_minutes: super::window::DEFAULT_LOOKBACK_MINUTES,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Fully validated relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub interval: Duration,
    pub sink: SinkConfig,
    pub source: SourceConfig,
    pub fetch_policy: FetchPolicy,
    pub shutdown_grace: Duration,
    pub registry: MetricRegistry,
}

impl RelayConfig {
    /// Load from the path in `CWRELAY_CONFIG`, then apply env overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var("CWRELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let raw = read_file(Path::new(&path))?;
        Self::parse_with(&raw, |key| env::var(key).ok())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = read_file(path)?;
        Self::parse(&raw)
    }

    /// Parse without consulting the environment
    pub fn parse(src: &str) -> Result<Self, ConfigError> {
        Self::parse_with(src, |_| None)
    }

    /// Parse, taking overrides from `lookup` (an env var reader in production)
    pub fn parse_with<F>(src: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(src).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let sink = raw.sink.unwrap_or(RawSink { key: None, url: None });
        let key = lookup("CWRELAY_SINK_KEY")
            .or(sink.key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField("sink.key".to_string()))?;

        let interval_secs = match lookup("CWRELAY_INTERVAL") {
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(format!("CWRELAY_INTERVAL '{}' is not a number of seconds", value))
            })?,
            None => raw.interval.unwrap_or(DEFAULT_INTERVAL_SECS),
        };
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue("interval must be greater than 0".to_string()));
        }

        let defaults = SourceConfig::default();
        let source = SourceConfig {
            region: raw.source.region.unwrap_or(defaults.region),
            endpoint: raw.source.endpoint,
            period: raw.source.period.unwrap_or(defaults.period),
            stat: raw.source.stat.unwrap_or(defaults.stat),
            lookback_minutes: raw.source.lookback_minutes.unwrap_or(defaults.lookback_minutes),
            timeout: raw
                .source
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };
        if source.period == 0 {
            return Err(ConfigError::InvalidValue("source.period must be greater than 0".to_string()));
        }
        if source.lookback_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "source.lookback_minutes must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            sink: SinkConfig {
                key,
                url: sink.url.unwrap_or_else(|| DEFAULT_SINK_URL.to_string()),
            },
            source,
            fetch_policy: parse_fetch_policy(&raw.fetch)?,
            shutdown_grace: Duration::from_secs(raw.shutdown.grace_secs.unwrap_or(10)),
            registry: MetricRegistry::build(&raw.metrics)?,
        })
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))
}

fn parse_fetch_policy(raw: &RawFetch) -> Result<FetchPolicy, ConfigError> {
    match raw.on_error.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("fatal") => Ok(FetchPolicy::Fatal),
        Some("retry") => {
            let initial = raw.initial_backoff_secs.unwrap_or(1);
            let max = raw.max_backoff_secs.unwrap_or(60);
            if initial == 0 || max < initial {
                return Err(ConfigError::InvalidValue(
                    "fetch backoff must satisfy 0 < initial_backoff_secs <= max_backoff_secs".to_string(),
                ));
            }
            Ok(FetchPolicy::Retry {
                initial_delay: Duration::from_secs(initial),
                max_delay: Duration::from_secs(max),
                max_retries: raw.max_retries.unwrap_or(5),
            })
        }
        Some(other) => Err(ConfigError::InvalidValue(format!(
            "fetch.on_error must be 'fatal' or 'retry', got '{}'",
            other
        ))),
    }
}
