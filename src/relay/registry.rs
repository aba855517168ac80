//! Metric registry - the validated, ordered list of metrics to track
//!
//! Built once at startup from the `[metrics.<id>]` tables and never mutated
//! afterwards. Order follows the configuration file so queries are built
//! deterministically.

use super::error::ConfigError;
use super::types::{Dimension, MetricSpec};
use serde::Deserialize;

/// One `[metrics.<id>]` table as written in the config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetric {
    namespace: Option<String>,
    name: Option<String>,
    dimension: Option<String>,
    dimvalue: Option<String>,
    #[serde(alias = "stat_name")]
    sink_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    specs: Vec<MetricSpec>,
}

impl MetricRegistry {
    /// Validate every metric table. All problems are reported together.
    pub fn build(metrics: &toml::Table) -> Result<Self, ConfigError> {
        let mut specs = Vec::with_capacity(metrics.len());
        let mut errors = Vec::new();

        if metrics.is_empty() {
            return Err(ConfigError::MissingField("metrics".to_string()));
        }

        for (id, value) in metrics {
            let raw = match value.clone().try_into::<RawMetric>() {
                Ok(raw) => raw,
                Err(e) => {
                    errors.push(ConfigError::Parse(format!("metrics.{}: {}", id, e)));
                    continue;
                }
            };

            match validate_metric(id, raw) {
                Ok(spec) => specs.push(spec),
                Err(mut problems) => errors.append(&mut problems),
            }
        }

        match errors.len() {
            0 => Ok(Self { specs }),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Multiple(errors)),
        }
    }

    pub fn from_specs(specs: Vec<MetricSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[MetricSpec] {
        &self.specs
    }

    pub fn get(&self, id: &str) -> Option<&MetricSpec> {
        self.specs.iter().find(|spec| spec.id == id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of metrics that have a sink name
    pub fn forwarding_count(&self) -> usize {
        self.specs.iter().filter(|spec| spec.sink_name.is_some()).count()
    }
}

fn validate_metric(id: &str, raw: RawMetric) -> Result<MetricSpec, Vec<ConfigError>> {
    let mut problems = Vec::new();

    if !is_valid_id(id) {
        problems.push(ConfigError::InvalidValue(format!(
            "metric id '{}' must start with a lowercase letter and contain only letters, digits or '_'",
            id
        )));
    }

    let namespace = non_empty(raw.namespace);
    if namespace.is_none() {
        problems.push(ConfigError::MissingField(format!("metrics.{}.namespace", id)));
    }

    let name = non_empty(raw.name);
    if name.is_none() {
        problems.push(ConfigError::MissingField(format!("metrics.{}.name", id)));
    }

    let dimension = match (non_empty(raw.dimension), non_empty(raw.dimvalue)) {
        (Some(name), Some(value)) => Some(Dimension { name, value }),
        (None, None) => None,
        (Some(_), None) => {
            problems.push(ConfigError::InvalidValue(format!(
                "metrics.{}: dimension is set but dimvalue is missing",
                id
            )));
            None
        }
        (None, Some(_)) => {
            problems.push(ConfigError::InvalidValue(format!(
                "metrics.{}: dimvalue is set but dimension is missing",
                id
            )));
            None
        }
    };

    match (namespace, name) {
        (Some(namespace), Some(name)) if problems.is_empty() => Ok(MetricSpec {
            id: id.to_string(),
            namespace,
            name,
            dimension,
            sink_name: non_empty(raw.sink_name),
        }),
        _ => Err(problems),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Source query ids: `[a-z][A-Za-z0-9_]*`
fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
