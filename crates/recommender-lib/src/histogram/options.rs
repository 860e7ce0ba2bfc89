//! Exponential bucketing policy shared by all histograms of one resource type

use crate::error::OptionsError;
use serde::{Deserialize, Serialize};

/// Minimum weight of a single CPU sample
pub const MIN_SAMPLE_WEIGHT: f64 = 0.1;

/// Smallest weight a bucket may hold and still count as populated
pub const EPSILON: f64 = 0.001 * MIN_SAMPLE_WEIGHT;

/// Growth ratio between consecutive buckets
pub const DEFAULT_BUCKET_RATIO: f64 = 1.05;

/// Largest tracked CPU usage (cores)
pub const CPU_MAX_VALUE: f64 = 1000.0;

/// Width of the first CPU bucket (cores)
pub const CPU_FIRST_BUCKET_SIZE: f64 = 0.01;

/// Largest tracked memory usage (bytes)
pub const MEMORY_MAX_VALUE: f64 = 1e12;

/// Width of the first memory bucket (bytes)
pub const MEMORY_FIRST_BUCKET_SIZE: f64 = 1e7;

/// Immutable exponential bucketing policy.
///
/// Bucket `i` starts at `first_bucket_size * (ratio^i - 1) / (ratio - 1)`.
/// The number of buckets is the smallest `n` such that the last bucket
/// starts at or beyond `max_value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramOptions {
    max_value: f64,
    first_bucket_size: f64,
    ratio: f64,
    epsilon: f64,
    num_buckets: usize,
}

impl HistogramOptions {
    /// Build exponential options, validating every parameter.
    pub fn exponential(
        max_value: f64,
        first_bucket_size: f64,
        ratio: f64,
        epsilon: f64,
    ) -> Result<Self, OptionsError> {
        for (name, value) in [
            ("max_value", max_value),
            ("first_bucket_size", first_bucket_size),
            ("epsilon", epsilon),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(OptionsError::NonPositive { name, value });
            }
        }
        if !ratio.is_finite() || ratio <= 1.0 {
            return Err(OptionsError::InvalidRatio(ratio));
        }

        let num_buckets =
            ((max_value * (ratio - 1.0) / first_bucket_size + 1.0).ln() / ratio.ln()).ceil() as usize
                + 1;

        Ok(Self {
            max_value,
            first_bucket_size,
            ratio,
            epsilon,
            num_buckets,
        })
    }

    /// Reference CPU options: 0.01 core first bucket up to 1000 cores
    pub fn cpu() -> Self {
        Self::exponential(CPU_MAX_VALUE, CPU_FIRST_BUCKET_SIZE, DEFAULT_BUCKET_RATIO, EPSILON)
            .expect("reference cpu histogram options are valid")
    }

    /// Reference memory options: 10MB first bucket up to 1TB
    pub fn memory() -> Self {
        Self::exponential(
            MEMORY_MAX_VALUE,
            MEMORY_FIRST_BUCKET_SIZE,
            DEFAULT_BUCKET_RATIO,
            EPSILON,
        )
        .expect("reference memory histogram options are valid")
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Index of the bucket holding `value`.
    ///
    /// Saturates: anything below the first bucket boundary maps to bucket 0,
    /// anything past the last boundary maps to the last bucket.
    pub fn find_bucket(&self, value: f64) -> usize {
        if !(value >= self.first_bucket_size) {
            return 0;
        }
        let last = self.num_buckets - 1;
        let estimate =
            (value * (self.ratio - 1.0) / self.first_bucket_size + 1.0).ln() / self.ratio.ln();
        let mut bucket = (estimate.floor() as usize).min(last);

        // The closed form can land one bucket off due to rounding
        if bucket > 0 && self.bucket_start(bucket) > value {
            bucket -= 1;
        } else if bucket < last && self.bucket_start(bucket + 1) <= value {
            bucket += 1;
        }
        bucket
    }

    /// Lower boundary of `bucket`
    pub fn bucket_start(&self, bucket: usize) -> f64 {
        if bucket == 0 {
            return 0.0;
        }
        self.first_bucket_size * (self.ratio.powi(bucket as i32) - 1.0) / (self.ratio - 1.0)
    }
}
