//! Per-interval container snapshots

use crate::histogram::HistogramCheckpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version written by `ContainerState::to_checkpoint`
pub const CHECKPOINT_VERSION: i32 = 1;

/// Immutable snapshot of one container's state for one collection interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerCheckpoint {
    pub last_update_time: DateTime<Utc>,
    #[serde(default)]
    pub cpu_histogram: Option<HistogramCheckpoint>,
    /// Peak memory usage observed in the interval, in bytes
    pub memory_peak: i64,
    pub first_sample_start: Option<DateTime<Utc>>,
    pub last_sample_start: Option<DateTime<Utc>>,
    pub total_samples_count: u64,
    pub window_end: Option<DateTime<Utc>>,
    pub version: i32,
}

impl ContainerCheckpoint {
    /// True when the checkpoint carries cpu bucket weights
    pub fn has_cpu_data(&self) -> bool {
        self.cpu_histogram
            .as_ref()
            .is_some_and(|histogram| !histogram.is_empty())
    }

    pub fn has_memory_data(&self) -> bool {
        self.memory_peak != 0
    }
}

/// All container checkpoints of one workload for one collection interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalCheckpoints {
    pub interval_start: DateTime<Utc>,
    pub containers: BTreeMap<String, ContainerCheckpoint>,
}

impl IntervalCheckpoints {
    pub fn new(interval_start: DateTime<Utc>) -> Self {
        Self {
            interval_start,
            containers: BTreeMap::new(),
        }
    }

    pub fn with_container(mut self, name: impl Into<String>, checkpoint: ContainerCheckpoint) -> Self {
        self.containers.insert(name.into(), checkpoint);
        self
    }
}
