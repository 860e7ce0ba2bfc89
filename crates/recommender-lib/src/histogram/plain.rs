//! Plain (non-decaying) weighted histogram

use super::{validate_sample, Histogram, HistogramCheckpoint, HistogramOptions};
use crate::error::{CheckpointError, SampleError};
use crate::models::EPOCH;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Weighted histogram over the buckets of a `HistogramOptions`.
///
/// `min_bucket..=max_bucket` brackets every bucket holding at least epsilon
/// weight; when the histogram is empty `min_bucket > max_bucket`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramImpl {
    options: HistogramOptions,
    bucket_weight: Vec<f64>,
    total_weight: f64,
    min_bucket: usize,
    max_bucket: usize,
}

impl HistogramImpl {
    pub fn new(options: HistogramOptions) -> Self {
        let num_buckets = options.num_buckets();
        Self {
            options,
            bucket_weight: vec![0.0; num_buckets],
            total_weight: 0.0,
            min_bucket: num_buckets - 1,
            max_bucket: 0,
        }
    }

    /// Weight currently held by `bucket`
    pub fn bucket_weight(&self, bucket: usize) -> f64 {
        self.bucket_weight.get(bucket).copied().unwrap_or(0.0)
    }

    /// Multiply every bucket by `factor`
    pub(crate) fn scale(&mut self, factor: f64) {
        if self.min_bucket > self.max_bucket {
            self.total_weight *= factor;
            return;
        }
        for weight in &mut self.bucket_weight[self.min_bucket..=self.max_bucket] {
            *weight *= factor;
        }
        self.total_weight *= factor;
        self.update_min_and_max_bucket();
    }

    /// Add `factor * other` into this histogram
    pub(crate) fn merge_scaled(&mut self, other: &HistogramImpl, factor: f64) {
        assert_eq!(
            self.options, other.options,
            "cannot merge histograms with different options"
        );
        if other.min_bucket > other.max_bucket {
            return;
        }
        for bucket in other.min_bucket..=other.max_bucket {
            self.bucket_weight[bucket] += other.bucket_weight[bucket] * factor;
        }
        self.total_weight += other.total_weight * factor;
        self.min_bucket = self.min_bucket.min(other.min_bucket);
        self.max_bucket = self.max_bucket.max(other.max_bucket);
        self.update_min_and_max_bucket();
    }

    fn update_min_and_max_bucket(&mut self) {
        let epsilon = self.options.epsilon();
        let last = self.options.num_buckets() - 1;
        while self.bucket_weight[self.min_bucket] < epsilon && self.min_bucket < last {
            self.min_bucket += 1;
        }
        while self.bucket_weight[self.max_bucket] < epsilon && self.max_bucket > 0 {
            self.max_bucket -= 1;
        }
    }

    pub(crate) fn checkpoint_at(&self, reference_timestamp: DateTime<Utc>) -> HistogramCheckpoint {
        let epsilon = self.options.epsilon();
        let bucket_weights: BTreeMap<usize, f64> = if self.min_bucket > self.max_bucket {
            BTreeMap::new()
        } else {
            (self.min_bucket..=self.max_bucket)
                .filter(|&bucket| self.bucket_weight[bucket] > epsilon)
                .map(|bucket| (bucket, self.bucket_weight[bucket]))
                .collect()
        };

        HistogramCheckpoint {
            reference_timestamp,
            bucket_weights,
            total_weight: self.total_weight,
        }
    }
}

impl Histogram for HistogramImpl {
    fn options(&self) -> &HistogramOptions {
        &self.options
    }

    fn add_sample(
        &mut self,
        value: f64,
        weight: f64,
        _time: DateTime<Utc>,
    ) -> Result<(), SampleError> {
        validate_sample(value, weight)?;
        let bucket = self.options.find_bucket(value);
        self.bucket_weight[bucket] += weight;
        self.total_weight += weight;
        if bucket < self.min_bucket && self.bucket_weight[bucket] >= self.options.epsilon() {
            self.min_bucket = bucket;
        }
        if bucket > self.max_bucket && self.bucket_weight[bucket] >= self.options.epsilon() {
            self.max_bucket = bucket;
        }
        Ok(())
    }

    fn subtract_sample(
        &mut self,
        value: f64,
        weight: f64,
        _time: DateTime<Utc>,
    ) -> Result<(), SampleError> {
        validate_sample(value, weight)?;
        let bucket = self.options.find_bucket(value);
        self.bucket_weight[bucket] = (self.bucket_weight[bucket] - weight).max(0.0);
        self.total_weight = (self.total_weight - weight).max(0.0);
        self.update_min_and_max_bucket();
        Ok(())
    }

    fn percentile(&self, percentile: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let threshold = percentile * self.total_weight;
        let mut partial_sum = 0.0;
        for bucket in self.min_bucket..=self.max_bucket {
            partial_sum += self.bucket_weight[bucket];
            if partial_sum >= threshold {
                return self.options.bucket_start(bucket);
            }
        }
        // Rounding can leave the running sum a hair below the total
        self.options.bucket_start(self.max_bucket)
    }

    fn total_weight(&self) -> f64 {
        self.total_weight
    }

    fn save_to_checkpoint(&self) -> HistogramCheckpoint {
        self.checkpoint_at(EPOCH)
    }

    fn load_from_checkpoint(
        &mut self,
        checkpoint: &HistogramCheckpoint,
    ) -> Result<(), CheckpointError> {
        let num_buckets = self.options.num_buckets();
        for (&bucket, &weight) in &checkpoint.bucket_weights {
            if bucket >= num_buckets {
                return Err(CheckpointError::BucketOutOfRange {
                    bucket: bucket as i64,
                    num_buckets,
                });
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(CheckpointError::InvalidWeight {
                    bucket: bucket as i64,
                    weight,
                });
            }
        }
        if !checkpoint.total_weight.is_finite() || checkpoint.total_weight < 0.0 {
            return Err(CheckpointError::InvalidTotalWeight(checkpoint.total_weight));
        }

        self.bucket_weight.iter_mut().for_each(|w| *w = 0.0);
        for (&bucket, &weight) in &checkpoint.bucket_weights {
            self.bucket_weight[bucket] = weight;
        }
        self.total_weight = checkpoint.total_weight;
        self.min_bucket = 0;
        self.max_bucket = num_buckets - 1;
        self.update_min_and_max_bucket();
        Ok(())
    }

    fn merge(&mut self, other: &Self) {
        self.merge_scaled(other, 1.0);
    }
}
