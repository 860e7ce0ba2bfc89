//! Live per-container usage state

use super::checkpoint::{ContainerCheckpoint, CHECKPOINT_VERSION};
use crate::error::{CheckpointError, SampleError};
use crate::histogram::{
    new_histogram, Histogram, HistogramCheckpoint, HistogramImpl, HistogramKind, HistogramOptions,
    DEFAULT_HALF_LIFE, MIN_SAMPLE_WEIGHT,
};
use crate::models::{ContainerUsageSample, ResourceName};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::debug;

/// Default length of one memory peak window
pub const DEFAULT_MEMORY_AGGREGATION_INTERVAL: Duration = Duration::days(1);

/// Histogram settings used to create container states
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerStateOptions {
    pub cpu_histogram: HistogramOptions,
    pub memory_histogram: HistogramOptions,
    pub cpu_half_life: Duration,
    pub memory_half_life: Duration,
    pub memory_aggregation_interval: Duration,
}

impl Default for ContainerStateOptions {
    fn default() -> Self {
        Self {
            cpu_histogram: HistogramOptions::cpu(),
            memory_histogram: HistogramOptions::memory(),
            cpu_half_life: DEFAULT_HALF_LIFE,
            memory_half_life: DEFAULT_HALF_LIFE,
            memory_aggregation_interval: DEFAULT_MEMORY_AGGREGATION_INTERVAL,
        }
    }
}

/// Sample counters folded across checkpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleCounters {
    pub first_sample_start: Option<DateTime<Utc>>,
    pub last_sample_start: Option<DateTime<Utc>>,
    pub total_samples_count: u64,
}

impl SampleCounters {
    /// Fold another set of counters into this one
    pub fn merge(&mut self, other: &SampleCounters) {
        self.first_sample_start = earliest(self.first_sample_start, other.first_sample_start);
        self.last_sample_start = latest(self.last_sample_start, other.last_sample_start);
        self.total_samples_count += other.total_samples_count;
    }

    fn record(&mut self, time: DateTime<Utc>) {
        self.first_sample_start = earliest(self.first_sample_start, Some(time));
        self.last_sample_start = latest(self.last_sample_start, Some(time));
        self.total_samples_count += 1;
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Usage history of one container.
///
/// Owned by a single writer. CPU samples feed a decaying histogram weighted
/// by the container's request; memory keeps one peak per aggregation
/// interval, replacing the peak in place when a higher one shows up.
pub struct ContainerState {
    cpu_histogram: Box<dyn Histogram>,
    memory_histogram: Box<dyn Histogram>,
    counters: SampleCounters,
    memory_peak: f64,
    memory_peak_time: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
    last_cpu_sample_start: Option<DateTime<Utc>>,
    last_memory_sample_start: Option<DateTime<Utc>>,
    memory_aggregation_interval: Duration,
}

impl ContainerState {
    /// Create an empty state backed by decaying histograms
    pub fn new(options: &ContainerStateOptions) -> Self {
        Self {
            cpu_histogram: new_histogram(
                options.cpu_histogram,
                HistogramKind::Decaying {
                    half_life: options.cpu_half_life,
                },
            ),
            memory_histogram: new_histogram(
                options.memory_histogram,
                HistogramKind::Decaying {
                    half_life: options.memory_half_life,
                },
            ),
            counters: SampleCounters::default(),
            memory_peak: 0.0,
            memory_peak_time: None,
            window_end: None,
            last_cpu_sample_start: None,
            last_memory_sample_start: None,
            memory_aggregation_interval: options.memory_aggregation_interval,
        }
    }

    /// Wrap histograms produced by aggregation so estimators can read them
    pub fn from_aggregate(
        cpu_histogram: HistogramImpl,
        memory_histogram: HistogramImpl,
        counters: SampleCounters,
    ) -> Self {
        Self {
            cpu_histogram: Box::new(cpu_histogram),
            memory_histogram: Box::new(memory_histogram),
            counters,
            memory_peak: 0.0,
            memory_peak_time: None,
            window_end: None,
            last_cpu_sample_start: counters.last_sample_start,
            last_memory_sample_start: None,
            memory_aggregation_interval: DEFAULT_MEMORY_AGGREGATION_INTERVAL,
        }
    }

    pub fn cpu_histogram(&self) -> &dyn Histogram {
        self.cpu_histogram.as_ref()
    }

    pub fn memory_histogram(&self) -> &dyn Histogram {
        self.memory_histogram.as_ref()
    }

    pub fn counters(&self) -> &SampleCounters {
        &self.counters
    }

    pub fn first_sample_start(&self) -> Option<DateTime<Utc>> {
        self.counters.first_sample_start
    }

    pub fn last_sample_start(&self) -> Option<DateTime<Utc>> {
        self.counters.last_sample_start
    }

    pub fn total_samples_count(&self) -> u64 {
        self.counters.total_samples_count
    }

    /// Peak memory of the current window, in bytes
    pub fn memory_peak(&self) -> f64 {
        self.memory_peak
    }

    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.window_end
    }

    /// Time between the first and last observed sample (zero without history)
    pub fn lifespan(&self) -> Duration {
        match (self.counters.first_sample_start, self.counters.last_sample_start) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => Duration::zero(),
        }
    }

    /// Record one usage sample.
    ///
    /// Returns `Ok(false)` when the sample was discarded as a duplicate or
    /// arrived out of order, and an error when it is invalid.
    pub fn add_sample(&mut self, sample: &ContainerUsageSample) -> Result<bool, SampleError> {
        sample.validate()?;
        match sample.resource {
            ResourceName::Cpu => self.add_cpu_sample(sample),
            ResourceName::Memory => self.add_memory_sample(sample),
        }
    }

    fn add_cpu_sample(&mut self, sample: &ContainerUsageSample) -> Result<bool, SampleError> {
        let start = sample.measure_start;
        if self.last_cpu_sample_start.is_some_and(|last| start <= last) {
            debug!(measure_start = %start, "Discarding duplicate or out-of-order cpu sample");
            return Ok(false);
        }

        // A larger request makes the newer history dominate older samples
        let weight = sample.request.max(MIN_SAMPLE_WEIGHT);
        self.cpu_histogram.add_sample(sample.usage, weight, start)?;
        self.last_cpu_sample_start = Some(start);
        self.counters.record(start);
        Ok(true)
    }

    fn add_memory_sample(&mut self, sample: &ContainerUsageSample) -> Result<bool, SampleError> {
        let start = sample.measure_start;
        if self.last_memory_sample_start.is_some_and(|last| start < last) {
            debug!(measure_start = %start, "Discarding out-of-order memory sample");
            return Ok(false);
        }
        self.last_memory_sample_start = Some(start);

        match self.window_end {
            Some(end) if start < end => {
                if sample.usage <= self.memory_peak {
                    return Ok(true);
                }
                if let Some(peak_time) = self.memory_peak_time {
                    self.memory_histogram
                        .subtract_sample(self.memory_peak, 1.0, peak_time)?;
                }
            }
            _ => {
                self.window_end = Some(start + self.memory_aggregation_interval);
            }
        }

        self.memory_peak = sample.usage;
        if sample.usage > 0.0 {
            self.memory_histogram.add_sample(sample.usage, 1.0, start)?;
            self.memory_peak_time = Some(start);
        } else {
            self.memory_peak_time = None;
        }
        Ok(true)
    }

    /// Snapshot the state for the interval ending at `now`
    pub fn to_checkpoint(&self, now: DateTime<Utc>) -> ContainerCheckpoint {
        ContainerCheckpoint {
            last_update_time: now,
            cpu_histogram: Some(self.cpu_histogram.save_to_checkpoint()),
            memory_peak: self.memory_peak.round() as i64,
            first_sample_start: self.counters.first_sample_start,
            last_sample_start: self.counters.last_sample_start,
            total_samples_count: self.counters.total_samples_count,
            window_end: self.window_end,
            version: CHECKPOINT_VERSION,
        }
    }

    /// Restore state from a checkpoint, replacing current contents
    pub fn load_checkpoint(&mut self, checkpoint: &ContainerCheckpoint) -> Result<(), CheckpointError> {
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        if checkpoint.memory_peak < 0 {
            return Err(CheckpointError::InvalidMemoryPeak(checkpoint.memory_peak));
        }
        let empty = HistogramCheckpoint::default();
        self.cpu_histogram
            .load_from_checkpoint(checkpoint.cpu_histogram.as_ref().unwrap_or(&empty))?;
        self.memory_histogram.load_from_checkpoint(&empty)?;

        self.counters = SampleCounters {
            first_sample_start: checkpoint.first_sample_start,
            last_sample_start: checkpoint.last_sample_start,
            total_samples_count: checkpoint.total_samples_count,
        };
        self.last_cpu_sample_start = checkpoint.last_sample_start;
        self.last_memory_sample_start = None;
        self.window_end = checkpoint.window_end;
        self.memory_peak = checkpoint.memory_peak as f64;
        self.memory_peak_time = None;

        if self.memory_peak > 0.0 {
            if let Some(end) = checkpoint.window_end {
                let window_start = end - self.memory_aggregation_interval;
                self.memory_histogram
                    .add_sample(self.memory_peak, 1.0, window_start)
                    .map_err(|_| CheckpointError::InvalidMemoryPeak(checkpoint.memory_peak))?;
                self.memory_peak_time = Some(window_start);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerState")
            .field("cpu_total_weight", &self.cpu_histogram.total_weight())
            .field("memory_total_weight", &self.memory_histogram.total_weight())
            .field("counters", &self.counters)
            .field("memory_peak", &self.memory_peak)
            .field("window_end", &self.window_end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EPOCH;

    fn minutes(n: i64) -> DateTime<Utc> {
        EPOCH + Duration::minutes(n)
    }

    fn new_state() -> ContainerState {
        ContainerState::new(&ContainerStateOptions::default())
    }

    #[test]
    fn test_cpu_samples_update_counters() {
        let mut state = new_state();
        for i in 0..9 {
            assert!(state
                .add_sample(&ContainerUsageSample::cpu(minutes(2 * i), 0.5, 1.0))
                .unwrap());
        }
        assert_eq!(state.total_samples_count(), 9);
        assert_eq!(state.first_sample_start(), Some(minutes(0)));
        assert_eq!(state.last_sample_start(), Some(minutes(16)));
        assert_eq!(state.lifespan(), Duration::minutes(16));
        assert!(!state.cpu_histogram().is_empty());
    }

    #[test]
    fn test_out_of_order_cpu_sample_discarded() {
        let mut state = new_state();
        assert!(state.add_sample(&ContainerUsageSample::cpu(minutes(5), 0.5, 1.0)).unwrap());
        assert!(!state.add_sample(&ContainerUsageSample::cpu(minutes(5), 0.5, 1.0)).unwrap());
        assert!(!state.add_sample(&ContainerUsageSample::cpu(minutes(1), 0.5, 1.0)).unwrap());
        assert_eq!(state.total_samples_count(), 1);
    }

    #[test]
    fn test_cpu_weight_has_floor() {
        let mut state = new_state();
        state.add_sample(&ContainerUsageSample::cpu(EPOCH, 0.5, 0.0)).unwrap();
        assert!((state.cpu_histogram().total_weight() - MIN_SAMPLE_WEIGHT).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_sample_rejected() {
        let mut state = new_state();
        let result = state.add_sample(&ContainerUsageSample::cpu(EPOCH, -1.0, 1.0));
        assert_eq!(result, Err(SampleError::InvalidValue(-1.0)));
        assert_eq!(state.total_samples_count(), 0);
    }

    #[test]
    fn test_memory_peak_replaced_within_window() {
        let mut state = new_state();
        state.add_sample(&ContainerUsageSample::memory(minutes(0), 1e8)).unwrap();
        state.add_sample(&ContainerUsageSample::memory(minutes(10), 3e8)).unwrap();
        state.add_sample(&ContainerUsageSample::memory(minutes(20), 2e8)).unwrap();

        assert_eq!(state.memory_peak(), 3e8);
        assert_eq!(state.window_end(), Some(minutes(0) + Duration::days(1)));
        assert!((state.memory_histogram().total_weight() - 1.0).abs() < 1e-9);
        let options = HistogramOptions::memory();
        assert_eq!(
            state.memory_histogram().percentile(1.0),
            options.bucket_start(options.find_bucket(3e8))
        );
    }

    #[test]
    fn test_memory_window_rolls_over() {
        let mut state = new_state();
        state.add_sample(&ContainerUsageSample::memory(minutes(0), 3e8)).unwrap();
        let next_day = minutes(0) + Duration::days(1);
        state.add_sample(&ContainerUsageSample::memory(next_day, 1e8)).unwrap();

        assert_eq!(state.memory_peak(), 1e8);
        assert_eq!(state.window_end(), Some(next_day + Duration::days(1)));
        // Yesterday's peak is kept at half weight
        assert!((state.memory_histogram().total_weight() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut state = new_state();
        for i in 0..30 {
            state
                .add_sample(&ContainerUsageSample::cpu(minutes(i), 0.1 * (i % 7) as f64, 0.5))
                .unwrap();
        }
        state.add_sample(&ContainerUsageSample::memory(minutes(3), 5e8)).unwrap();

        let checkpoint = state.to_checkpoint(minutes(30));
        assert_eq!(checkpoint.version, CHECKPOINT_VERSION);
        assert_eq!(checkpoint.memory_peak, 500_000_000);
        assert_eq!(checkpoint.total_samples_count, 30);
        assert_eq!(checkpoint.last_update_time, minutes(30));

        let mut restored = new_state();
        restored.load_checkpoint(&checkpoint).unwrap();
        assert_eq!(restored.counters(), state.counters());
        assert_eq!(restored.window_end(), state.window_end());
        for p in [0.25, 0.5, 0.75, 0.99] {
            assert_eq!(
                restored.cpu_histogram().percentile(p),
                state.cpu_histogram().percentile(p)
            );
        }
        assert_eq!(
            restored.memory_histogram().percentile(1.0),
            state.memory_histogram().percentile(1.0)
        );
    }

    #[test]
    fn test_load_checkpoint_replaces_existing_data() {
        let mut source = new_state();
        source.add_sample(&ContainerUsageSample::memory(minutes(0), 3e8)).unwrap();
        let mut checkpoint = source.to_checkpoint(minutes(10));
        checkpoint.cpu_histogram = None;

        let mut target = new_state();
        target.add_sample(&ContainerUsageSample::cpu(minutes(100), 5.0, 1.0)).unwrap();
        target.add_sample(&ContainerUsageSample::memory(minutes(100), 9e8)).unwrap();
        target.load_checkpoint(&checkpoint).unwrap();

        let options = HistogramOptions::memory();
        assert!(target.cpu_histogram().is_empty());
        assert!((target.memory_histogram().total_weight() - 1.0).abs() < 1e-9);
        assert_eq!(
            target.memory_histogram().percentile(1.0),
            options.bucket_start(options.find_bucket(3e8))
        );
        assert_eq!(target.memory_peak(), 3e8);

        // Memory ingestion is no longer gated by the replaced state's samples
        assert!(target
            .add_sample(&ContainerUsageSample::memory(minutes(20), 4e8))
            .unwrap());
        assert_eq!(target.memory_peak(), 4e8);
    }

    #[test]
    fn test_unsupported_checkpoint_version() {
        let mut checkpoint = new_state().to_checkpoint(EPOCH);
        checkpoint.version = 99;
        let result = new_state().load_checkpoint(&checkpoint);
        assert!(matches!(
            result,
            Err(CheckpointError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_sample_counters_merge() {
        let mut a = SampleCounters {
            first_sample_start: Some(minutes(10)),
            last_sample_start: Some(minutes(20)),
            total_samples_count: 5,
        };
        let b = SampleCounters {
            first_sample_start: Some(minutes(5)),
            last_sample_start: Some(minutes(15)),
            total_samples_count: 3,
        };
        a.merge(&b);
        assert_eq!(a.first_sample_start, Some(minutes(5)));
        assert_eq!(a.last_sample_start, Some(minutes(20)));
        assert_eq!(a.total_samples_count, 8);

        let mut empty = SampleCounters::default();
        empty.merge(&b);
        assert_eq!(empty, b);
    }
}
