use super::ResourceEstimator;
use crate::models::{ResourceMap, MAX_RESOURCE_AMOUNT};
use crate::resource_amount::scale_resource;
use crate::state::ContainerState;

/// Samples expected per day at one-minute resolution
pub const SAMPLES_PER_DAY: f64 = 1440.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Widens the inner estimate when little history backs it.
///
/// Each amount is scaled by `(1 + multiplier / confidence) ^ exponent`, where
/// confidence is the smaller of the history's lifespan in days and the sample
/// count divided by the normalization. A state with zero lifespan saturates:
/// `MAX_RESOURCE_AMOUNT` for a positive exponent, zero for a negative one.
#[derive(Debug, Clone)]
pub struct ConfidenceMultiplierEstimator<E> {
    inner: E,
    multiplier: f64,
    exponent: f64,
    sample_normalization: f64,
}

impl<E: ResourceEstimator> ConfidenceMultiplierEstimator<E> {
    pub fn new(inner: E, multiplier: f64, exponent: f64) -> Self {
        Self {
            inner,
            multiplier,
            exponent,
            sample_normalization: SAMPLES_PER_DAY,
        }
    }

    /// Number of samples that count as one day of history
    pub fn with_sample_normalization(mut self, samples: f64) -> Self {
        self.sample_normalization = samples;
        self
    }

    /// Confidence in days backing the state's history
    pub fn confidence(&self, state: &ContainerState) -> f64 {
        let lifespan_days = state.lifespan().num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
        let sample_days = state.total_samples_count() as f64 / self.sample_normalization;
        lifespan_days.min(sample_days)
    }

    fn saturate(&self, amount: i64) -> i64 {
        if self.exponent > 0.0 {
            MAX_RESOURCE_AMOUNT
        } else if self.exponent < 0.0 {
            0
        } else {
            amount
        }
    }
}

impl<E: ResourceEstimator> ResourceEstimator for ConfidenceMultiplierEstimator<E> {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        let resources = self.inner.get_resource_estimation(state);
        let confidence = self.confidence(state);

        if confidence <= 0.0 {
            return resources
                .into_iter()
                .map(|(name, amount)| (name, self.saturate(amount)))
                .collect();
        }

        let factor = (1.0 + self.multiplier / confidence).powf(self.exponent);
        resources
            .into_iter()
            .map(|(name, amount)| (name, scale_resource(amount, factor)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::test_support::empty_state;
    use crate::estimator::ConstEstimator;
    use crate::models::{ContainerUsageSample, EPOCH};
    use crate::resource_amount::{cpu_amount_from_cores, make_resource_map};
    use chrono::Duration;

    fn state_with_samples(count: i64, spacing: Duration) -> ContainerState {
        let mut state = empty_state();
        for i in 0..count {
            state
                .add_sample(&ContainerUsageSample::cpu(EPOCH + spacing * i as i32, 1.0, 1.0))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_zero_history_saturates_up() {
        let estimator =
            ConstEstimator::of(make_resource_map(3140, 100)).with_confidence_multiplier(1.0, 1.0);
        let result = estimator.get_resource_estimation(&empty_state());
        assert_eq!(result["cpu"], MAX_RESOURCE_AMOUNT);
        assert_eq!(result["memory"], MAX_RESOURCE_AMOUNT);
    }

    #[test]
    fn test_zero_history_saturates_down() {
        let estimator =
            ConstEstimator::of(make_resource_map(3140, 100)).with_confidence_multiplier(1.0, -1.0);
        assert_eq!(
            estimator.get_resource_estimation(&empty_state()),
            make_resource_map(0, 0)
        );
    }

    #[test]
    fn test_single_sample_counts_as_zero_history() {
        let state = state_with_samples(1, Duration::minutes(1));
        let estimator =
            ConstEstimator::of(make_resource_map(100, 100)).with_confidence_multiplier(1.0, 1.0);
        assert_eq!(estimator.get_resource_estimation(&state)["cpu"], MAX_RESOURCE_AMOUNT);
    }

    #[test]
    fn test_zero_exponent_keeps_amount() {
        let estimator =
            ConstEstimator::of(make_resource_map(3140, 100)).with_confidence_multiplier(1.0, 0.0);
        assert_eq!(
            estimator.get_resource_estimation(&empty_state()),
            make_resource_map(3140, 100)
        );
    }

    #[test]
    fn test_confidence_from_sample_count() {
        let state = state_with_samples(9, Duration::minutes(2));
        let estimator = ConstEstimator::of(make_resource_map(cpu_amount_from_cores(3.14), 0))
            .with_confidence_multiplier(0.1, 2.0);

        assert!((estimator.confidence(&state) - 0.00625).abs() < 1e-12);
        // 3.14 cores * (1 + 0.1 / 0.00625)^2 = 907.46 cores
        let cpu = estimator.get_resource_estimation(&state)["cpu"];
        assert!((cpu as f64 - 907_460.0).abs() <= 907_460.0 * 1e-6);
    }

    #[test]
    fn test_confidence_from_lifespan() {
        // 3 samples over 2 days: lifespan dominates sample count
        let state = state_with_samples(3, Duration::days(1));
        let estimator = ConstEstimator::of(make_resource_map(1000, 1000))
            .with_confidence_multiplier(1.0, 1.0)
            .with_sample_normalization(1.0);

        assert!((estimator.confidence(&state) - 2.0).abs() < 1e-12);
        assert_eq!(
            estimator.get_resource_estimation(&state),
            make_resource_map(1500, 1500)
        );
    }
}
