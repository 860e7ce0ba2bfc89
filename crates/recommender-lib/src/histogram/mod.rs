//! Usage histograms with exponential bucketing
//!
//! This module provides:
//! - `HistogramOptions`: the bucketing policy for one resource type
//! - `HistogramImpl`: a plain weighted histogram
//! - `DecayingHistogram`: a histogram whose weights halve every half-life
//! - `HistogramCheckpoint`: the sparse snapshot both can save and load

mod checkpoint;
mod decaying;
mod options;
mod plain;

pub use checkpoint::HistogramCheckpoint;
pub use decaying::DecayingHistogram;
pub use options::{
    HistogramOptions, CPU_FIRST_BUCKET_SIZE, CPU_MAX_VALUE, DEFAULT_BUCKET_RATIO, EPSILON,
    MEMORY_FIRST_BUCKET_SIZE, MEMORY_MAX_VALUE, MIN_SAMPLE_WEIGHT,
};
pub use plain::HistogramImpl;

use crate::error::{CheckpointError, SampleError};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Default decay half-life for both cpu and memory
pub const DEFAULT_HALF_LIFE: Duration = Duration::days(1);

/// Distribution of resource usage over exponentially growing buckets
pub trait Histogram: fmt::Debug + Send + Sync {
    /// Bucketing policy this histogram was built with
    fn options(&self) -> &HistogramOptions;

    /// Add `weight` at the bucket holding `value`.
    ///
    /// Rejects negative or non-finite values and non-positive weights.
    fn add_sample(&mut self, value: f64, weight: f64, time: DateTime<Utc>)
        -> Result<(), SampleError>;

    /// Remove `weight` previously added at `value` and `time`
    fn subtract_sample(
        &mut self,
        value: f64,
        weight: f64,
        time: DateTime<Utc>,
    ) -> Result<(), SampleError>;

    /// Start of the first bucket at which the cumulative weight reaches
    /// `percentile * total_weight`. Returns 0 for an empty histogram.
    fn percentile(&self, percentile: f64) -> f64;

    fn total_weight(&self) -> f64;

    fn is_empty(&self) -> bool {
        self.total_weight() <= self.options().epsilon()
    }

    fn save_to_checkpoint(&self) -> HistogramCheckpoint;

    /// Replace the current contents with the checkpoint's
    fn load_from_checkpoint(&mut self, checkpoint: &HistogramCheckpoint)
        -> Result<(), CheckpointError>;

    /// Add every bucket of `other` into this histogram.
    ///
    /// # Panics
    ///
    /// Panics if the two histograms were built with different options.
    fn merge(&mut self, other: &Self)
    where
        Self: Sized;
}

/// Which histogram flavour to build for a resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistogramKind {
    Plain,
    Decaying { half_life: Duration },
}

/// Build an empty histogram of the requested kind
pub fn new_histogram(options: HistogramOptions, kind: HistogramKind) -> Box<dyn Histogram> {
    match kind {
        HistogramKind::Plain => Box::new(HistogramImpl::new(options)),
        HistogramKind::Decaying { half_life } => {
            Box::new(DecayingHistogram::new(options, half_life))
        }
    }
}

pub(crate) fn validate_sample(value: f64, weight: f64) -> Result<(), SampleError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SampleError::InvalidValue(value));
    }
    if !weight.is_finite() || weight <= 0.0 {
        return Err(SampleError::InvalidWeight(weight));
    }
    Ok(())
}
