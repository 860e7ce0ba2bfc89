//! Sparse, serializable histogram snapshot

use crate::models::EPOCH;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a histogram for persistence and transport.
///
/// Only buckets whose weight exceeds the options' epsilon are kept, so a
/// checkpoint is bounded by the bucket count and usually much smaller.
/// Weights are stored at full `f64` precision relative to
/// `reference_timestamp` (the epoch for non-decaying histograms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramCheckpoint {
    pub reference_timestamp: DateTime<Utc>,
    pub bucket_weights: BTreeMap<usize, f64>,
    pub total_weight: f64,
}

impl HistogramCheckpoint {
    pub fn is_empty(&self) -> bool {
        self.bucket_weights.is_empty()
    }
}

impl Default for HistogramCheckpoint {
    fn default() -> Self {
        Self {
            reference_timestamp: EPOCH,
            bucket_weights: BTreeMap::new(),
            total_weight: 0.0,
        }
    }
}
