//! Observability infrastructure for the recommender
//!
//! Provides:
//! - Prometheus metrics (aggregation and recommendation latency, skipped data, output counts)
//! - Structured logging of aggregation runs and recommendations with tracing

use crate::models::{ResourceMap, ResourceName};
use crate::state::AggregationStats;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RecommenderMetricsInner> = OnceLock::new();

struct RecommenderMetricsInner {
    aggregation_latency_seconds: Histogram,
    recommendation_latency_seconds: Histogram,
    intervals_processed: IntCounter,
    intervals_outside_window: IntCounter,
    checkpoints_merged: IntCounter,
    checkpoints_rejected: IntCounter,
    intervals_misaligned: IntCounter,
    aggregation_gaps: IntCounterVec,
    recommendations_generated: IntCounter,
    containers_recommended: IntGauge,
}

impl RecommenderMetricsInner {
    fn new() -> Self {
        Self {
            aggregation_latency_seconds: register_histogram!(
                "recommender_aggregation_latency_seconds",
                "Time spent folding interval checkpoints into histograms",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register aggregation_latency_seconds"),

            recommendation_latency_seconds: register_histogram!(
                "recommender_recommendation_latency_seconds",
                "Time spent running estimator chains for one run",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register recommendation_latency_seconds"),

            intervals_processed: register_int_counter!(
                "recommender_intervals_processed_total",
                "Interval checkpoints handed to the aggregator"
            )
            .expect("Failed to register intervals_processed"),

            intervals_outside_window: register_int_counter!(
                "recommender_intervals_outside_window_total",
                "Intervals skipped because they fall outside the aggregation window"
            )
            .expect("Failed to register intervals_outside_window"),

            checkpoints_merged: register_int_counter!(
                "recommender_checkpoints_merged_total",
                "Container checkpoints that contributed data"
            )
            .expect("Failed to register checkpoints_merged"),

            checkpoints_rejected: register_int_counter!(
                "recommender_checkpoints_rejected_total",
                "Container checkpoints skipped for an unsupported version"
            )
            .expect("Failed to register checkpoints_rejected"),

            intervals_misaligned: register_int_counter!(
                "recommender_intervals_misaligned_total",
                "Intervals that do not start on an interval boundary"
            )
            .expect("Failed to register intervals_misaligned"),

            aggregation_gaps: register_int_counter_vec!(
                "recommender_aggregation_gaps_total",
                "Missing or unusable resource data per container checkpoint",
                &["resource"]
            )
            .expect("Failed to register aggregation_gaps"),

            recommendations_generated: register_int_counter!(
                "recommender_recommendations_generated_total",
                "Total number of container recommendations produced"
            )
            .expect("Failed to register recommendations_generated"),

            containers_recommended: register_int_gauge!(
                "recommender_containers_recommended",
                "Number of containers covered by the last run"
            )
            .expect("Failed to register containers_recommended"),
        }
    }
}

/// Recommender metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct RecommenderMetrics {
    _private: (),
}

impl Default for RecommenderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommenderMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RecommenderMetricsInner {
        GLOBAL_METRICS.get_or_init(RecommenderMetricsInner::new)
    }

    pub fn observe_aggregation_latency(&self, duration_secs: f64) {
        self.inner().aggregation_latency_seconds.observe(duration_secs);
    }

    pub fn observe_recommendation_latency(&self, duration_secs: f64) {
        self.inner()
            .recommendation_latency_seconds
            .observe(duration_secs);
    }

    /// Add the counts of one aggregation run
    pub fn record_aggregation(&self, stats: &AggregationStats) {
        let inner = self.inner();
        inner.intervals_processed.inc_by(stats.intervals_seen);
        inner
            .intervals_outside_window
            .inc_by(stats.intervals_outside_window);
        inner.checkpoints_merged.inc_by(stats.checkpoints_merged);
        inner.checkpoints_rejected.inc_by(stats.rejected_checkpoints);
        inner.intervals_misaligned.inc_by(stats.misaligned_intervals);
        for resource in ResourceName::ALL {
            inner
                .aggregation_gaps
                .with_label_values(&[resource.as_str()])
                .inc_by(stats.gaps(resource));
        }
    }

    pub fn inc_recommendations_generated(&self) {
        self.inner().recommendations_generated.inc();
    }

    pub fn set_containers_recommended(&self, count: i64) {
        self.inner().containers_recommended.set(count);
    }

    /// Current value of the gap counter for one resource
    pub fn aggregation_gaps(&self, resource: ResourceName) -> u64 {
        self.inner()
            .aggregation_gaps
            .with_label_values(&[resource.as_str()])
            .get()
    }
}

/// Structured logger for recommender events
#[derive(Clone)]
pub struct StructuredLogger {
    workload: String,
}

impl StructuredLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    /// Log the outcome of an aggregation run
    pub fn log_aggregation(
        &self,
        stats: &AggregationStats,
        expected_intervals: i64,
        containers: usize,
        elapsed_secs: f64,
    ) {
        info!(
            event = "aggregation_completed",
            workload = %self.workload,
            intervals_seen = stats.intervals_seen,
            expected_intervals = expected_intervals,
            intervals_outside_window = stats.intervals_outside_window,
            misaligned_intervals = stats.misaligned_intervals,
            checkpoints_merged = stats.checkpoints_merged,
            rejected_checkpoints = stats.rejected_checkpoints,
            cpu_gaps = stats.cpu_gaps,
            memory_gaps = stats.memory_gaps,
            containers = containers,
            elapsed_secs = elapsed_secs,
            "Aggregated interval checkpoints"
        );
        for resource in ResourceName::ALL {
            let gaps = stats.gaps(resource);
            if gaps > 0 {
                debug!(
                    event = "aggregation_gap",
                    workload = %self.workload,
                    resource = %resource,
                    gaps = gaps,
                    "Skipped checkpoints without usable data"
                );
            }
        }
        if stats.rejected_checkpoints > 0 {
            warn!(
                event = "checkpoints_rejected",
                workload = %self.workload,
                rejected_checkpoints = stats.rejected_checkpoints,
                "Some checkpoints were written by an unsupported version"
            );
        }
    }

    /// Log one container's recommended requests
    pub fn log_recommendation(&self, container: &str, target: &ResourceMap, total_samples: u64) {
        info!(
            event = "recommendation_generated",
            workload = %self.workload,
            container = %container,
            cpu_millicores = ?target.get(ResourceName::Cpu.as_str()),
            memory_bytes = ?target.get(ResourceName::Memory.as_str()),
            total_samples = total_samples,
            "Generated resource recommendation"
        );
    }

    /// Log a container that had no usable history in the window
    pub fn log_missing_history(&self, container: &str) {
        debug!(
            event = "missing_history",
            workload = %self.workload,
            container = %container,
            "Container has no samples in the aggregation window"
        );
    }
}
