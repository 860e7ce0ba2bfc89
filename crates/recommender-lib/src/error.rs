//! Error types for the recommendation core

use thiserror::Error;

/// A sample rejected before it reaches a histogram
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("sample value must be finite and non-negative, got {0}")]
    InvalidValue(f64),
    #[error("sample weight must be finite and positive, got {0}")]
    InvalidWeight(f64),
    #[error("sample request must be finite and non-negative, got {0}")]
    InvalidRequest(f64),
}

/// Invalid exponential bucketing parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("{name} must be finite and positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("bucket growth ratio must be greater than 1, got {0}")]
    InvalidRatio(f64),
}

/// A checkpoint that cannot be loaded or decoded
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("bucket index {bucket} out of range (histogram has {num_buckets} buckets)")]
    BucketOutOfRange { bucket: i64, num_buckets: usize },
    #[error("bucket {bucket} has invalid weight {weight}")]
    InvalidWeight { bucket: i64, weight: f64 },
    #[error("checkpoint total weight must be finite and non-negative, got {0}")]
    InvalidTotalWeight(f64),
    #[error("checkpoint memory peak must be non-negative, got {0}")]
    InvalidMemoryPeak(i64),
    #[error("unsupported checkpoint version {found} (expected {expected})")]
    UnsupportedVersion { found: i32, expected: i32 },
    #[error("negative bucket index {0}")]
    NegativeBucket(i32),
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("timestamp out of range: {0}")]
    InvalidTimestamp(String),
    #[error("failed to decode checkpoint: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Configuration loading or validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Options(#[from] OptionsError),
}
