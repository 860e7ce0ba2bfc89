//! Histogram with exponentially decaying sample weights
//!
//! Every stored weight is expressed relative to `reference_timestamp`. When
//! a sample newer than the reference arrives, the whole histogram is scaled
//! down once by `2^(-(ts - reference) / half_life)` and the reference moves
//! to the sample's timestamp, so the newest sample always enters at full
//! weight and nothing can overflow no matter how long the histogram lives.

use super::{validate_sample, Histogram, HistogramCheckpoint, HistogramImpl, HistogramOptions};
use crate::error::{CheckpointError, SampleError};
use crate::models::EPOCH;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct DecayingHistogram {
    histogram: HistogramImpl,
    half_life: Duration,
    reference_timestamp: DateTime<Utc>,
}

impl DecayingHistogram {
    pub fn new(options: HistogramOptions, half_life: Duration) -> Self {
        Self {
            histogram: HistogramImpl::new(options),
            half_life,
            reference_timestamp: EPOCH,
        }
    }

    pub fn half_life(&self) -> Duration {
        self.half_life
    }

    pub fn reference_timestamp(&self) -> DateTime<Utc> {
        self.reference_timestamp
    }

    /// Weight multiplier for a sample at `time` relative to the reference
    fn decay_factor(&self, time: DateTime<Utc>) -> f64 {
        let half_lives = seconds_between(self.reference_timestamp, time) / seconds(self.half_life);
        2f64.powf(half_lives)
    }

    /// Move the reference forward to `timestamp`, rescaling stored weights
    fn shift_reference_timestamp(&mut self, timestamp: DateTime<Utc>) {
        if timestamp <= self.reference_timestamp {
            return;
        }
        let factor = self.decay_factor(timestamp).recip();
        self.histogram.scale(factor);
        self.reference_timestamp = timestamp;
    }
}

fn seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    seconds(to.signed_duration_since(from))
}

impl Histogram for DecayingHistogram {
    fn options(&self) -> &HistogramOptions {
        self.histogram.options()
    }

    fn add_sample(
        &mut self,
        value: f64,
        weight: f64,
        time: DateTime<Utc>,
    ) -> Result<(), SampleError> {
        validate_sample(value, weight)?;
        self.shift_reference_timestamp(time);
        // Samples older than the reference arrive already partially decayed
        let factor = self.decay_factor(time).min(1.0);
        if factor > 0.0 {
            self.histogram.add_sample(value, weight * factor, time)?;
        }
        Ok(())
    }

    fn subtract_sample(
        &mut self,
        value: f64,
        weight: f64,
        time: DateTime<Utc>,
    ) -> Result<(), SampleError> {
        validate_sample(value, weight)?;
        let factor = self.decay_factor(time).min(1.0);
        if factor > 0.0 {
            self.histogram.subtract_sample(value, weight * factor, time)?;
        }
        Ok(())
    }

    fn percentile(&self, percentile: f64) -> f64 {
        self.histogram.percentile(percentile)
    }

    fn total_weight(&self) -> f64 {
        self.histogram.total_weight()
    }

    fn save_to_checkpoint(&self) -> HistogramCheckpoint {
        self.histogram.checkpoint_at(self.reference_timestamp)
    }

    fn load_from_checkpoint(
        &mut self,
        checkpoint: &HistogramCheckpoint,
    ) -> Result<(), CheckpointError> {
        self.histogram.load_from_checkpoint(checkpoint)?;
        self.reference_timestamp = checkpoint.reference_timestamp;
        Ok(())
    }

    /// Rescale both sides to the later reference timestamp, then add.
    ///
    /// # Panics
    ///
    /// Panics if the options or half-lives differ.
    fn merge(&mut self, other: &Self) {
        assert_eq!(
            self.half_life, other.half_life,
            "cannot merge decaying histograms with different half-lives"
        );
        self.shift_reference_timestamp(other.reference_timestamp);
        let factor = self.decay_factor(other.reference_timestamp);
        self.histogram.merge_scaled(&other.histogram, factor);
    }
}
