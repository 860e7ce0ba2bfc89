//! Folds per-interval container checkpoints into per-container histograms
//!
//! CPU checkpoints are loaded into plain histograms and merged bucket-wise.
//! Memory contributes one peak sample per interval with unit weight, so the
//! memory histogram describes the distribution of daily peaks rather than a
//! recency-weighted stream. Missing or unusable data for one resource in one
//! interval is skipped without affecting anything else.

use super::checkpoint::{ContainerCheckpoint, IntervalCheckpoints, CHECKPOINT_VERSION};
use super::container::{ContainerState, SampleCounters};
use crate::histogram::{Histogram, HistogramImpl, HistogramOptions};
use crate::models::{ResourceName, EPOCH};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Default number of days of history combined into one recommendation
pub const DEFAULT_WINDOW_DAYS: i64 = 8;

/// Span of intervals considered by one aggregation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationWindow {
    pub length: Duration,
    pub interval: Duration,
}

impl AggregationWindow {
    pub fn new(length: Duration, interval: Duration) -> Self {
        Self { length, interval }
    }

    /// Start of the window ending at `end`
    pub fn start(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        end - self.length
    }

    /// Whether an interval starting at `interval_start` falls in `[end - length, end)`
    pub fn contains(&self, interval_start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        interval_start >= self.start(end) && interval_start < end
    }

    /// Number of intervals in the window
    pub fn interval_count(&self) -> i64 {
        let interval = self.interval.num_seconds().max(1);
        (self.length.num_seconds() + interval - 1) / interval
    }

    /// Whether `interval_start` lies on an interval boundary counted from the epoch
    pub fn is_aligned(&self, interval_start: DateTime<Utc>) -> bool {
        let interval = self.interval.num_milliseconds();
        if interval <= 0 {
            return true;
        }
        (interval_start - EPOCH).num_milliseconds().rem_euclid(interval) == 0
            && interval_start.timestamp_subsec_nanos() % 1_000_000 == 0
    }
}

impl Default for AggregationWindow {
    fn default() -> Self {
        Self {
            length: Duration::days(DEFAULT_WINDOW_DAYS),
            interval: Duration::days(1),
        }
    }
}

/// Counts of what an aggregation run consumed and skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub intervals_seen: u64,
    pub intervals_outside_window: u64,
    pub checkpoints_merged: u64,
    pub cpu_gaps: u64,
    pub memory_gaps: u64,
    pub rejected_checkpoints: u64,
    /// Intervals aggregated even though they start off an interval boundary
    pub misaligned_intervals: u64,
}

impl AggregationStats {
    pub fn gaps(&self, resource: ResourceName) -> u64 {
        match resource {
            ResourceName::Cpu => self.cpu_gaps,
            ResourceName::Memory => self.memory_gaps,
        }
    }
}

/// Output of an aggregation run
#[derive(Debug, Clone, Default)]
pub struct AggregatedHistograms {
    pub cpu: BTreeMap<String, HistogramImpl>,
    pub memory: BTreeMap<String, HistogramImpl>,
    pub counters: BTreeMap<String, SampleCounters>,
    pub stats: AggregationStats,
}

impl AggregatedHistograms {
    /// Names of every container with data in either resource
    pub fn container_names(&self) -> BTreeSet<&str> {
        self.cpu
            .keys()
            .chain(self.memory.keys())
            .map(String::as_str)
            .collect()
    }

    /// Build one estimator input per container.
    ///
    /// A container missing one resource gets an empty histogram for it.
    pub fn into_container_states(
        self,
        cpu_options: HistogramOptions,
        memory_options: HistogramOptions,
    ) -> BTreeMap<String, ContainerState> {
        let names: Vec<String> = self.container_names().into_iter().map(str::to_owned).collect();
        let mut cpu = self.cpu;
        let mut memory = self.memory;
        let mut counters = self.counters;

        names
            .into_iter()
            .map(|name| {
                let state = ContainerState::from_aggregate(
                    cpu.remove(&name)
                        .unwrap_or_else(|| HistogramImpl::new(cpu_options)),
                    memory
                        .remove(&name)
                        .unwrap_or_else(|| HistogramImpl::new(memory_options)),
                    counters.remove(&name).unwrap_or_default(),
                );
                (name, state)
            })
            .collect()
    }
}

/// Accumulates interval checkpoints container by container.
///
/// Accumulation for one container is sequential; separate aggregators can
/// run over disjoint sets of containers in parallel.
#[derive(Debug, Clone)]
pub struct PartialHistogramAggregator {
    cpu_options: HistogramOptions,
    memory_options: HistogramOptions,
    window: Option<(AggregationWindow, DateTime<Utc>)>,
    output: AggregatedHistograms,
}

impl PartialHistogramAggregator {
    pub fn new(cpu_options: HistogramOptions, memory_options: HistogramOptions) -> Self {
        Self {
            cpu_options,
            memory_options,
            window: None,
            output: AggregatedHistograms::default(),
        }
    }

    /// Only accept intervals inside `window` ending at `end`
    pub fn with_window(mut self, window: AggregationWindow, end: DateTime<Utc>) -> Self {
        self.window = Some((window, end));
        self
    }

    /// Aggregate every interval and return the combined histograms
    pub fn aggregate<'a, I>(mut self, intervals: I) -> AggregatedHistograms
    where
        I: IntoIterator<Item = &'a IntervalCheckpoints>,
    {
        for interval in intervals {
            self.add_interval(interval);
        }
        self.finish()
    }

    pub fn add_interval(&mut self, interval: &IntervalCheckpoints) {
        self.output.stats.intervals_seen += 1;
        if let Some((window, end)) = &self.window {
            if !window.contains(interval.interval_start, *end) {
                debug!(
                    interval_start = %interval.interval_start,
                    window_end = %end,
                    "Skipping interval outside aggregation window"
                );
                self.output.stats.intervals_outside_window += 1;
                return;
            }
            if !window.is_aligned(interval.interval_start) {
                warn!(
                    interval_start = %interval.interval_start,
                    interval_secs = window.interval.num_seconds(),
                    "Interval does not start on an interval boundary"
                );
                self.output.stats.misaligned_intervals += 1;
            }
        }
        for (name, checkpoint) in &interval.containers {
            self.add_container_checkpoint(name, checkpoint);
        }
    }

    pub fn add_container_checkpoint(&mut self, container: &str, checkpoint: &ContainerCheckpoint) {
        if checkpoint.version != CHECKPOINT_VERSION {
            warn!(
                container = %container,
                version = checkpoint.version,
                expected = CHECKPOINT_VERSION,
                "Skipping checkpoint with unsupported version"
            );
            self.output.stats.rejected_checkpoints += 1;
            return;
        }

        let mut merged_any = false;

        match &checkpoint.cpu_histogram {
            Some(cpu) if !cpu.is_empty() => {
                let mut partial = HistogramImpl::new(self.cpu_options);
                match partial.load_from_checkpoint(cpu) {
                    Ok(()) => {
                        self.output
                            .cpu
                            .entry(container.to_owned())
                            .or_insert_with(|| HistogramImpl::new(self.cpu_options))
                            .merge(&partial);
                        merged_any = true;
                    }
                    Err(e) => {
                        warn!(container = %container, error = %e, "Skipping corrupt cpu checkpoint");
                        self.output.stats.cpu_gaps += 1;
                    }
                }
            }
            _ => {
                debug!(container = %container, "No cpu data in checkpoint");
                self.output.stats.cpu_gaps += 1;
            }
        }

        if checkpoint.has_memory_data() {
            let memory = self
                .output
                .memory
                .entry(container.to_owned())
                .or_insert_with(|| HistogramImpl::new(self.memory_options));
            match memory.add_sample(checkpoint.memory_peak as f64, 1.0, EPOCH) {
                Ok(()) => merged_any = true,
                Err(e) => {
                    warn!(container = %container, error = %e, "Skipping invalid memory peak");
                    self.output.stats.memory_gaps += 1;
                }
            }
        } else {
            debug!(container = %container, "No memory peak in checkpoint");
            self.output.stats.memory_gaps += 1;
        }

        if merged_any {
            self.output
                .counters
                .entry(container.to_owned())
                .or_default()
                .merge(&SampleCounters {
                    first_sample_start: checkpoint.first_sample_start,
                    last_sample_start: checkpoint.last_sample_start,
                    total_samples_count: checkpoint.total_samples_count,
                });
            self.output.stats.checkpoints_merged += 1;
        }
    }

    pub fn finish(self) -> AggregatedHistograms {
        self.output
    }
}
