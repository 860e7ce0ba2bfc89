//! Recommender configuration
//!
//! Loaded through the `config` crate from an optional file plus
//! `RECOMMENDER__*` environment variables, with `__` separating nested keys
//! (`RECOMMENDER__AGGREGATION__WINDOW_DAYS=14`). Every field has a default,
//! so an empty environment yields the reference parameters.

use crate::error::ConfigError;
use crate::histogram::{
    HistogramOptions, CPU_FIRST_BUCKET_SIZE, CPU_MAX_VALUE, DEFAULT_BUCKET_RATIO, EPSILON,
    MEMORY_FIRST_BUCKET_SIZE, MEMORY_MAX_VALUE,
};
use crate::models::ResourceName;
use crate::state::{
    AggregationWindow, ContainerStateOptions, DEFAULT_MEMORY_AGGREGATION_INTERVAL,
    DEFAULT_WINDOW_DAYS,
};
use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "RECOMMENDER";
const ENV_SEPARATOR: &str = "__";

/// Top-level recommender configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    #[serde(default)]
    pub histogram: HistogramConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub estimators: EstimatorConfig,
}

/// Bucketing and decay settings for both resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    #[serde(default = "default_cpu_buckets")]
    pub cpu: BucketConfig,

    #[serde(default = "default_memory_buckets")]
    pub memory: BucketConfig,

    /// Weight below which a bucket counts as empty
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

/// Exponential bucketing for one resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Largest tracked value (cores or bytes)
    pub max_value: f64,

    /// Width of the first bucket (cores or bytes)
    pub first_bucket_size: f64,

    #[serde(default = "default_ratio")]
    pub ratio: f64,

    /// Decay half-life of live histograms in seconds
    #[serde(default = "default_half_life_secs")]
    pub half_life_secs: i64,
}

/// How much history one run combines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Granularity of interval checkpoints
    #[serde(default = "default_interval_hours")]
    pub interval_hours: i64,
}

/// Estimator floors and per-variant chains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_min_cpu_millicores")]
    pub min_cpu_millicores: i64,

    /// Memory floor in bytes, 250 MiB by default
    #[serde(default = "default_min_memory_bytes")]
    pub min_memory_bytes: i64,

    /// Samples that count as one day of history for confidence
    #[serde(default = "default_confidence_normalization")]
    pub confidence_normalization: f64,

    #[serde(default = "default_recommended")]
    pub recommended: VariantConfig,

    #[serde(default = "default_burstable")]
    pub burstable: VariantConfig,

    #[serde(default = "default_guaranteed")]
    pub guaranteed: VariantConfig,
}

/// Requests chain plus the limits policy of one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub requests: ChainConfig,

    #[serde(default)]
    pub limits: LimitsPolicy,
}

/// How a variant derives its limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LimitsPolicy {
    /// No limits are recommended
    #[default]
    None,
    /// Limits equal the requests
    SameAsRequests,
    /// Limits come from their own chain
    Chain(ChainConfig),
}

/// Settings of one percentile-based estimator chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub cpu_percentile: f64,

    pub memory_percentile: f64,

    #[serde(default = "default_margin_fraction")]
    pub margin_fraction: f64,

    #[serde(default)]
    pub confidence: Option<ConfidenceConfig>,

    /// Resources left out of the chain's output
    #[serde(default)]
    pub omit: Vec<ResourceName>,
}

/// Parameters of `(1 + multiplier / confidence) ^ exponent`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    pub multiplier: f64,
    pub exponent: f64,
}

fn default_cpu_buckets() -> BucketConfig {
    BucketConfig {
        max_value: CPU_MAX_VALUE,
        first_bucket_size: CPU_FIRST_BUCKET_SIZE,
        ratio: default_ratio(),
        half_life_secs: default_half_life_secs(),
    }
}

fn default_memory_buckets() -> BucketConfig {
    BucketConfig {
        max_value: MEMORY_MAX_VALUE,
        first_bucket_size: MEMORY_FIRST_BUCKET_SIZE,
        ratio: default_ratio(),
        half_life_secs: default_half_life_secs(),
    }
}

fn default_epsilon() -> f64 {
    EPSILON
}

fn default_ratio() -> f64 {
    DEFAULT_BUCKET_RATIO
}

fn default_half_life_secs() -> i64 {
    86_400
}

fn default_window_days() -> i64 {
    DEFAULT_WINDOW_DAYS
}

fn default_interval_hours() -> i64 {
    24
}

fn default_min_cpu_millicores() -> i64 {
    25
}

fn default_min_memory_bytes() -> i64 {
    250 * 1024 * 1024
}

fn default_confidence_normalization() -> f64 {
    1440.0
}

fn default_margin_fraction() -> f64 {
    0.15
}

fn default_recommended() -> VariantConfig {
    VariantConfig {
        requests: ChainConfig {
            cpu_percentile: 0.9,
            memory_percentile: 0.9,
            margin_fraction: default_margin_fraction(),
            confidence: None,
            omit: Vec::new(),
        },
        limits: LimitsPolicy::None,
    }
}

fn default_burstable() -> VariantConfig {
    VariantConfig {
        requests: ChainConfig {
            cpu_percentile: 0.5,
            memory_percentile: 0.5,
            margin_fraction: default_margin_fraction(),
            confidence: Some(ConfidenceConfig {
                multiplier: 0.001,
                exponent: -2.0,
            }),
            omit: Vec::new(),
        },
        limits: LimitsPolicy::Chain(ChainConfig {
            cpu_percentile: 0.95,
            memory_percentile: 0.95,
            margin_fraction: default_margin_fraction(),
            confidence: Some(ConfidenceConfig {
                multiplier: 1.0,
                exponent: 1.0,
            }),
            omit: vec![ResourceName::Cpu],
        }),
    }
}

fn default_guaranteed() -> VariantConfig {
    VariantConfig {
        requests: ChainConfig {
            cpu_percentile: 0.95,
            memory_percentile: 0.95,
            margin_fraction: default_margin_fraction(),
            confidence: None,
            omit: Vec::new(),
        },
        limits: LimitsPolicy::SameAsRequests,
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu_buckets(),
            memory: default_memory_buckets(),
            epsilon: default_epsilon(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            interval_hours: default_interval_hours(),
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_cpu_millicores: default_min_cpu_millicores(),
            min_memory_bytes: default_min_memory_bytes(),
            confidence_normalization: default_confidence_normalization(),
            recommended: default_recommended(),
            burstable: default_burstable(),
            guaranteed: default_guaranteed(),
        }
    }
}

impl RecommenderConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::load_with(None, environment()).context("Failed to load recommender configuration")
    }

    /// Load configuration from a file, with environment overrides on top
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::load_with(Some(path), environment())
            .with_context(|| format!("Failed to load recommender configuration from {}", path.display()))
    }

    fn load_with(file: Option<&Path>, env: config::Environment) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no estimator chain can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cpu_histogram_options()?;
        self.memory_histogram_options()?;

        for (name, bucket) in [("cpu", &self.histogram.cpu), ("memory", &self.histogram.memory)] {
            if bucket.half_life_secs <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "histogram.{}.half_life_secs must be positive, got {}",
                    name, bucket.half_life_secs
                )));
            }
        }

        if self.aggregation.window_days <= 0 || self.aggregation.interval_hours <= 0 {
            return Err(ConfigError::Invalid(format!(
                "aggregation window ({} days) and interval ({} hours) must be positive",
                self.aggregation.window_days, self.aggregation.interval_hours
            )));
        }

        let estimators = &self.estimators;
        if estimators.min_cpu_millicores < 0 || estimators.min_memory_bytes < 0 {
            return Err(ConfigError::Invalid(
                "minimum resources must not be negative".to_string(),
            ));
        }
        if !estimators.confidence_normalization.is_finite()
            || estimators.confidence_normalization <= 0.0
        {
            return Err(ConfigError::Invalid(format!(
                "confidence_normalization must be positive, got {}",
                estimators.confidence_normalization
            )));
        }

        for (variant, config) in [
            ("recommended", &estimators.recommended),
            ("burstable", &estimators.burstable),
            ("guaranteed", &estimators.guaranteed),
        ] {
            validate_chain(&format!("{}.requests", variant), &config.requests)?;
            if let LimitsPolicy::Chain(limits) = &config.limits {
                validate_chain(&format!("{}.limits", variant), limits)?;
            }
        }
        Ok(())
    }

    pub fn cpu_histogram_options(&self) -> Result<HistogramOptions, ConfigError> {
        bucket_options(&self.histogram.cpu, self.histogram.epsilon)
    }

    pub fn memory_histogram_options(&self) -> Result<HistogramOptions, ConfigError> {
        bucket_options(&self.histogram.memory, self.histogram.epsilon)
    }

    /// Options for live container states
    pub fn container_state_options(&self) -> Result<ContainerStateOptions, ConfigError> {
        Ok(ContainerStateOptions {
            cpu_histogram: self.cpu_histogram_options()?,
            memory_histogram: self.memory_histogram_options()?,
            cpu_half_life: Duration::seconds(self.histogram.cpu.half_life_secs),
            memory_half_life: Duration::seconds(self.histogram.memory.half_life_secs),
            memory_aggregation_interval: DEFAULT_MEMORY_AGGREGATION_INTERVAL,
        })
    }

    pub fn aggregation_window(&self) -> AggregationWindow {
        AggregationWindow::new(
            Duration::days(self.aggregation.window_days),
            Duration::hours(self.aggregation.interval_hours),
        )
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn bucket_options(bucket: &BucketConfig, epsilon: f64) -> Result<HistogramOptions, ConfigError> {
    Ok(HistogramOptions::exponential(
        bucket.max_value,
        bucket.first_bucket_size,
        bucket.ratio,
        epsilon,
    )?)
}

fn validate_chain(name: &str, chain: &ChainConfig) -> Result<(), ConfigError> {
    for (field, percentile) in [
        ("cpu_percentile", chain.cpu_percentile),
        ("memory_percentile", chain.memory_percentile),
    ] {
        if !(0.0..=1.0).contains(&percentile) {
            return Err(ConfigError::Invalid(format!(
                "{}.{} must be within [0, 1], got {}",
                name, field, percentile
            )));
        }
    }
    if !chain.margin_fraction.is_finite() || chain.margin_fraction < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{}.margin_fraction must not be negative, got {}",
            name, chain.margin_fraction
        )));
    }
    if let Some(confidence) = &chain.confidence {
        if !confidence.multiplier.is_finite() || !confidence.exponent.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "{}.confidence parameters must be finite",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults_match_reference_parameters() {
        let config = RecommenderConfig::load_with(None, env(&[])).unwrap();

        assert_eq!(config, RecommenderConfig::default());
        assert_eq!(config.cpu_histogram_options().unwrap(), HistogramOptions::cpu());
        assert_eq!(config.memory_histogram_options().unwrap(), HistogramOptions::memory());
        assert_eq!(config.aggregation_window(), AggregationWindow::default());
        assert_eq!(
            config.container_state_options().unwrap(),
            ContainerStateOptions::default()
        );
        assert_eq!(config.estimators.min_cpu_millicores, 25);
        assert_eq!(config.estimators.min_memory_bytes, 262_144_000);
        assert_eq!(
            config.estimators.guaranteed.limits,
            LimitsPolicy::SameAsRequests
        );
    }

    #[test]
    fn test_environment_overrides() {
        let config = RecommenderConfig::load_with(
            None,
            env(&[
                ("RECOMMENDER__AGGREGATION__WINDOW_DAYS", "14"),
                ("RECOMMENDER__ESTIMATORS__MIN_CPU_MILLICORES", "50"),
            ]),
        )
        .unwrap();

        assert_eq!(config.aggregation.window_days, 14);
        assert_eq!(config.aggregation.interval_hours, 24);
        assert_eq!(config.estimators.min_cpu_millicores, 50);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[histogram.cpu]
max_value = 500.0
first_bucket_size = 0.02
half_life_secs = 3600

[estimators.recommended.requests]
cpu_percentile = 0.8
memory_percentile = 0.99
margin_fraction = 0.2

[estimators.recommended.limits]
policy = "same_as_requests"
"#
        )
        .unwrap();

        let config = RecommenderConfig::load_with(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.histogram.cpu.max_value, 500.0);
        assert_eq!(config.histogram.cpu.ratio, DEFAULT_BUCKET_RATIO);
        assert_eq!(config.histogram.cpu.half_life_secs, 3600);
        assert_eq!(config.histogram.memory, default_memory_buckets());
        assert_eq!(config.estimators.recommended.requests.cpu_percentile, 0.8);
        assert_eq!(
            config.estimators.recommended.limits,
            LimitsPolicy::SameAsRequests
        );
        assert_eq!(config.estimators.burstable, default_burstable());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = RecommenderConfig::load_from_file("/nonexistent/recommender.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RecommenderConfig::default();
        config.histogram.cpu.ratio = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Options(_))));

        let mut config = RecommenderConfig::default();
        config.aggregation.window_days = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RecommenderConfig::default();
        config.estimators.burstable.requests.cpu_percentile = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RecommenderConfig::default();
        if let LimitsPolicy::Chain(limits) = &mut config.estimators.burstable.limits {
            limits.margin_fraction = -0.1;
        }
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_validation_failure_propagates() {
        let result = RecommenderConfig::load_with(
            None,
            env(&[("RECOMMENDER__AGGREGATION__INTERVAL_HOURS", "0")]),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
