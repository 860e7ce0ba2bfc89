//! Recommendation variants and the per-run pipeline
//!
//! A [`Recommender`] holds one estimator chain per variant and turns a
//! container state into a [`ContainerRecommendation`]. The
//! [`RecommendationPipeline`] runs one workload end to end: aggregate the
//! interval checkpoints in the window, build container states, then
//! recommend for every container that has history or a current allocation.

use crate::config::{ChainConfig, EstimatorConfig, LimitsPolicy, RecommenderConfig, VariantConfig};
use crate::error::ConfigError;
use crate::estimator::{ConstEstimator, PercentileEstimator, ResourceEstimator};
use crate::histogram::{HistogramImpl, HistogramOptions};
use crate::models::ResourceMap;
use crate::observability::{RecommenderMetrics, StructuredLogger};
use crate::resource_amount::{convert_to_readable_form, make_resource_map};
use crate::state::{
    AggregationStats, AggregationWindow, ContainerState, IntervalCheckpoints,
    PartialHistogramAggregator, SampleCounters,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::warn;

/// Requests and limits of one container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub requests: ResourceMap,
    pub limits: ResourceMap,
}

/// Requests and limits rendered for humans (`"250m"`, `"256M"`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadableRequirement {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirement {
    pub fn new(requests: ResourceMap, limits: ResourceMap) -> Self {
        Self { requests, limits }
    }

    pub fn readable(&self) -> ReadableRequirement {
        ReadableRequirement {
            requests: convert_to_readable_form(&self.requests),
            limits: convert_to_readable_form(&self.limits),
        }
    }
}

/// Every variant recommended for one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    /// The allocation the container runs with today, when known
    pub current: Option<ResourceRequirement>,
    pub burstable: ResourceRequirement,
    pub guaranteed: ResourceRequirement,
    pub recommended: ResourceRequirement,
}

impl ContainerRecommendation {
    /// Readable form keyed by variant name
    pub fn readable(&self) -> BTreeMap<&'static str, ReadableRequirement> {
        let mut variants = BTreeMap::new();
        if let Some(current) = &self.current {
            variants.insert("current", current.readable());
        }
        variants.insert("burstable", self.burstable.readable());
        variants.insert("guaranteed", self.guaranteed.readable());
        variants.insert("recommended", self.recommended.readable());
        variants
    }
}

enum Limits {
    None,
    SameAsRequests,
    Chain(Box<dyn ResourceEstimator>),
}

struct VariantEstimator {
    requests: Box<dyn ResourceEstimator>,
    limits: Limits,
}

impl VariantEstimator {
    fn new(variant: &VariantConfig, estimators: &EstimatorConfig) -> Self {
        let limits = match &variant.limits {
            LimitsPolicy::None => Limits::None,
            LimitsPolicy::SameAsRequests => Limits::SameAsRequests,
            LimitsPolicy::Chain(chain) => Limits::Chain(build_chain(chain, estimators)),
        };
        Self {
            requests: build_chain(&variant.requests, estimators),
            limits,
        }
    }

    fn estimate(&self, state: &ContainerState) -> ResourceRequirement {
        let requests = self.requests.get_resource_estimation(state);
        let limits = match &self.limits {
            Limits::None => ResourceMap::new(),
            Limits::SameAsRequests => requests.clone(),
            Limits::Chain(estimator) => estimator.get_resource_estimation(state),
        };
        ResourceRequirement { requests, limits }
    }
}

/// percentile -> confidence multiplier -> margin -> minimum -> omit
fn build_chain(chain: &ChainConfig, estimators: &EstimatorConfig) -> Box<dyn ResourceEstimator> {
    let percentile = PercentileEstimator::new(chain.cpu_percentile, chain.memory_percentile);
    let base = match chain.confidence {
        Some(confidence) => percentile
            .with_confidence_multiplier(confidence.multiplier, confidence.exponent)
            .with_sample_normalization(estimators.confidence_normalization)
            .boxed(),
        None => percentile.boxed(),
    };

    base.with_margin(chain.margin_fraction)
        .with_min_resources(make_resource_map(
            estimators.min_cpu_millicores,
            estimators.min_memory_bytes,
        ))
        .with_omitted_resources(&chain.omit)
        .boxed()
}

/// Produces every recommendation variant for a container state
pub struct Recommender {
    recommended: VariantEstimator,
    burstable: VariantEstimator,
    guaranteed: VariantEstimator,
}

impl Recommender {
    pub fn new(estimators: &EstimatorConfig) -> Self {
        Self {
            recommended: VariantEstimator::new(&estimators.recommended, estimators),
            burstable: VariantEstimator::new(&estimators.burstable, estimators),
            guaranteed: VariantEstimator::new(&estimators.guaranteed, estimators),
        }
    }

    /// Validate the configuration, then build the chains
    pub fn from_config(config: &RecommenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(&config.estimators))
    }

    pub fn recommend(
        &self,
        state: &ContainerState,
        current: Option<&ResourceRequirement>,
    ) -> ContainerRecommendation {
        let current = current.map(|current| ResourceRequirement {
            requests: ConstEstimator::of(current.requests.clone()).get_resource_estimation(state),
            limits: ConstEstimator::of(current.limits.clone()).get_resource_estimation(state),
        });

        ContainerRecommendation {
            current,
            burstable: self.burstable.estimate(state),
            guaranteed: self.guaranteed.estimate(state),
            recommended: self.recommended.estimate(state),
        }
    }
}

impl Default for Recommender {
    fn default() -> Self {
        Self::new(&EstimatorConfig::default())
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct RecommendationRun {
    pub recommendations: BTreeMap<String, ContainerRecommendation>,
    pub stats: AggregationStats,
    /// Serialized records that could not be decoded
    pub records_skipped: u64,
    /// Containers dropped from otherwise decodable records
    pub containers_skipped: u64,
}

/// Aggregates a workload's interval checkpoints and recommends per container
pub struct RecommendationPipeline {
    recommender: Recommender,
    cpu_options: HistogramOptions,
    memory_options: HistogramOptions,
    window: AggregationWindow,
    metrics: RecommenderMetrics,
    logger: StructuredLogger,
}

impl RecommendationPipeline {
    pub fn new(workload: impl Into<String>, config: &RecommenderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            recommender: Recommender::from_config(config)?,
            cpu_options: config.cpu_histogram_options()?,
            memory_options: config.memory_histogram_options()?,
            window: config.aggregation_window(),
            metrics: RecommenderMetrics::new(),
            logger: StructuredLogger::new(workload),
        })
    }

    pub fn window(&self) -> AggregationWindow {
        self.window
    }

    /// Recommend for every container seen in `intervals` or `current`.
    ///
    /// Only intervals starting in `[end - window, end)` contribute.
    pub fn run<'a, I>(
        &self,
        intervals: I,
        current: &BTreeMap<String, ResourceRequirement>,
        end: DateTime<Utc>,
    ) -> RecommendationRun
    where
        I: IntoIterator<Item = &'a IntervalCheckpoints>,
    {
        let started = Instant::now();
        let aggregated = PartialHistogramAggregator::new(self.cpu_options, self.memory_options)
            .with_window(self.window, end)
            .aggregate(intervals);
        let stats = aggregated.stats;
        let mut states = aggregated.into_container_states(self.cpu_options, self.memory_options);

        let aggregation_secs = started.elapsed().as_secs_f64();
        self.metrics.observe_aggregation_latency(aggregation_secs);
        self.metrics.record_aggregation(&stats);
        self.logger.log_aggregation(
            &stats,
            self.window.interval_count(),
            states.len(),
            aggregation_secs,
        );

        for name in current.keys() {
            if !states.contains_key(name) {
                self.logger.log_missing_history(name);
                states.insert(name.clone(), self.empty_state());
            }
        }

        let started = Instant::now();
        let recommendations: BTreeMap<String, ContainerRecommendation> = states
            .iter()
            .map(|(name, state)| {
                let recommendation = self.recommender.recommend(state, current.get(name));
                self.logger.log_recommendation(
                    name,
                    &recommendation.recommended.requests,
                    state.total_samples_count(),
                );
                self.metrics.inc_recommendations_generated();
                (name.clone(), recommendation)
            })
            .collect();
        self.metrics
            .observe_recommendation_latency(started.elapsed().as_secs_f64());
        self.metrics
            .set_containers_recommended(recommendations.len() as i64);

        RecommendationRun {
            recommendations,
            stats,
            ..RecommendationRun::default()
        }
    }

    /// Decode serialized `IntervalCheckpoints` records, then [`run`](Self::run).
    ///
    /// Records that fail to decode are skipped. Within a record, a corrupt
    /// cpu histogram only costs that container its cpu data.
    pub fn run_encoded<B: AsRef<[u8]>>(
        &self,
        records: &[B],
        current: &BTreeMap<String, ResourceRequirement>,
        end: DateTime<Utc>,
    ) -> RecommendationRun {
        let mut records_skipped = 0;
        let mut containers_skipped = 0;
        let mut intervals = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match IntervalCheckpoints::decode_with_report(record.as_ref()) {
                Ok((interval, report)) => {
                    containers_skipped += report.containers_skipped;
                    intervals.push(interval);
                }
                Err(e) => {
                    warn!(record = index, error = %e, "Skipping undecodable interval record");
                    records_skipped += 1;
                }
            }
        }

        let mut run = self.run(&intervals, current, end);
        run.records_skipped = records_skipped;
        run.containers_skipped = containers_skipped;
        run
    }

    fn empty_state(&self) -> ContainerState {
        ContainerState::from_aggregate(
            HistogramImpl::new(self.cpu_options),
            HistogramImpl::new(self.memory_options),
            SampleCounters::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerUsageSample, EPOCH, MAX_RESOURCE_AMOUNT};
    use crate::resource_amount::{cpu_amount_from_cores, memory_amount_from_bytes, scale_resource};
    use crate::state::ContainerStateOptions;
    use chrono::Duration;

    const MIN_MEMORY: i64 = 250 * 1024 * 1024;

    fn state_with_history(days: i64, cpu_cores: f64, memory_bytes: f64) -> ContainerState {
        let mut state = ContainerState::new(&ContainerStateOptions::default());
        for minute in 0..days * 1440 {
            let time = EPOCH + Duration::minutes(minute);
            state
                .add_sample(&ContainerUsageSample::cpu(time, cpu_cores, 1.0))
                .unwrap();
            if minute % 60 == 0 {
                state
                    .add_sample(&ContainerUsageSample::memory(time, memory_bytes))
                    .unwrap();
            }
        }
        state
    }

    fn expected(cpu_cores: f64, memory_bytes: f64) -> ResourceMap {
        let cpu = HistogramOptions::cpu();
        let memory = HistogramOptions::memory();
        make_resource_map(
            scale_resource(
                cpu_amount_from_cores(cpu.bucket_start(cpu.find_bucket(cpu_cores))),
                1.0 + 0.15,
            ),
            scale_resource(
                memory_amount_from_bytes(memory.bucket_start(memory.find_bucket(memory_bytes))),
                1.0 + 0.15,
            ),
        )
    }

    #[test]
    fn test_empty_state_gets_floors_and_saturated_limits() {
        let recommender = Recommender::default();
        let state = ContainerState::new(&ContainerStateOptions::default());
        let recommendation = recommender.recommend(&state, None);

        let floors = make_resource_map(25, MIN_MEMORY);
        assert_eq!(recommendation.current, None);
        assert_eq!(recommendation.recommended.requests, floors);
        assert!(recommendation.recommended.limits.is_empty());
        assert_eq!(recommendation.burstable.requests, floors);
        assert_eq!(
            recommendation.burstable.limits,
            ResourceMap::from([("memory".to_string(), MAX_RESOURCE_AMOUNT)])
        );
        assert_eq!(recommendation.guaranteed.requests, floors);
        assert_eq!(recommendation.guaranteed.limits, floors);
    }

    #[test]
    fn test_recommended_tracks_percentile_with_margin() {
        let state = state_with_history(2, 0.5, 6e8);
        let recommendation = Recommender::default().recommend(&state, None);

        assert_eq!(recommendation.recommended.requests, expected(0.5, 6e8));
        assert_eq!(recommendation.guaranteed.requests, expected(0.5, 6e8));
        assert_eq!(
            recommendation.guaranteed.limits,
            recommendation.guaranteed.requests
        );
        assert!(!recommendation.burstable.limits.contains_key("cpu"));
        assert!(
            recommendation.burstable.limits["memory"] >= recommendation.burstable.requests["memory"]
        );
    }

    #[test]
    fn test_current_passes_through() {
        let current = ResourceRequirement::new(
            make_resource_map(500, 512_000_000),
            make_resource_map(1000, 1_024_000_000),
        );
        let state = ContainerState::new(&ContainerStateOptions::default());
        let recommendation = Recommender::default().recommend(&state, Some(&current));

        assert_eq!(recommendation.current, Some(current));
        let readable = recommendation.readable();
        assert_eq!(readable["current"].requests["cpu"], "500m");
        assert_eq!(readable["current"].limits["memory"], "1024M");
        assert_eq!(readable["recommended"].requests["cpu"], "25m");
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = RecommenderConfig::default();
        config.estimators.recommended.requests.memory_percentile = -0.5;
        assert!(Recommender::from_config(&config).is_err());
    }

    fn daily_intervals(days: i64, cpu_cores: f64, memory_bytes: f64) -> Vec<IntervalCheckpoints> {
        (0..days)
            .map(|day| {
                let start = EPOCH + Duration::days(day);
                let mut state = ContainerState::new(&ContainerStateOptions::default());
                for minute in 0..1440 {
                    let time = start + Duration::minutes(minute);
                    state
                        .add_sample(&ContainerUsageSample::cpu(time, cpu_cores, 1.0))
                        .unwrap();
                }
                state
                    .add_sample(&ContainerUsageSample::memory(start, memory_bytes))
                    .unwrap();
                IntervalCheckpoints::new(start)
                    .with_container("app", state.to_checkpoint(start + Duration::days(1)))
            })
            .collect()
    }

    #[test]
    fn test_pipeline_run() {
        let pipeline = RecommendationPipeline::new("checkout", &RecommenderConfig::default()).unwrap();
        let intervals = daily_intervals(10, 0.5, 6e8);
        let mut current = BTreeMap::new();
        current.insert(
            "init".to_string(),
            ResourceRequirement::new(make_resource_map(100, 100_000_000), ResourceMap::new()),
        );

        let run = pipeline.run(&intervals, &current, EPOCH + Duration::days(10));

        assert_eq!(run.stats.intervals_seen, 10);
        assert_eq!(run.stats.intervals_outside_window, 2);
        assert_eq!(run.stats.checkpoints_merged, 8);
        assert_eq!(run.records_skipped, 0);

        let app = &run.recommendations["app"];
        assert_eq!(app.current, None);
        assert_eq!(app.recommended.requests, expected(0.5, 6e8));

        let init = &run.recommendations["init"];
        assert_eq!(init.current, current.get("init").cloned());
        assert_eq!(init.recommended.requests, make_resource_map(25, MIN_MEMORY));
    }

    #[test]
    fn test_pipeline_skips_undecodable_records() {
        let pipeline = RecommendationPipeline::new("checkout", &RecommenderConfig::default()).unwrap();
        let mut records: Vec<Vec<u8>> = daily_intervals(3, 0.25, 3e8)
            .iter()
            .map(IntervalCheckpoints::encode_to_vec)
            .collect();
        records.push(vec![0xff, 0xff, 0xff]);

        let run = pipeline.run_encoded(&records, &BTreeMap::new(), EPOCH + Duration::days(3));

        assert_eq!(run.records_skipped, 1);
        assert_eq!(run.stats.checkpoints_merged, 3);
        assert_eq!(run.recommendations["app"].recommended.requests, expected(0.25, 3e8));
    }
}
