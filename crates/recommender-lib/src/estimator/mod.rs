//! Composable resource estimators
//!
//! A leaf estimator (`ConstEstimator`, `PercentileEstimator`) turns a
//! container state into a resource map. Decorators wrap exactly one inner
//! estimator and post-process its output; they are built with the fluent
//! `with_*` methods, each of which consumes the estimator and returns a new
//! wrapper:
//!
//! ```
//! use recommender_lib::estimator::{PercentileEstimator, ResourceEstimator};
//! use recommender_lib::models::ResourceName;
//!
//! let estimator = PercentileEstimator::new(0.9, 0.9)
//!     .with_confidence_multiplier(1.0, 1.0)
//!     .with_margin(0.15)
//!     .with_omitted_resources(&[ResourceName::Cpu]);
//! # let _ = estimator;
//! ```

mod confidence;
mod constant;
mod margin;
mod min_resources;
mod omit;
mod percentile;

pub use confidence::{ConfidenceMultiplierEstimator, SAMPLES_PER_DAY};
pub use constant::ConstEstimator;
pub use margin::MarginEstimator;
pub use min_resources::MinResourcesEstimator;
pub use omit::OmitResourceEstimator;
pub use percentile::PercentileEstimator;

use crate::models::{ResourceMap, ResourceName};
use crate::state::ContainerState;
use std::sync::Arc;

/// Strategy that derives a recommendation from a container's history.
///
/// Implementations are pure: the same state always yields the same map.
/// CPU amounts are millicores, memory amounts bytes.
pub trait ResourceEstimator: Send + Sync {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap;

    /// Scale every amount by `1 + margin_fraction`
    fn with_margin(self, margin_fraction: f64) -> MarginEstimator<Self>
    where
        Self: Sized,
    {
        MarginEstimator::new(self, margin_fraction)
    }

    /// Scale every amount by `(1 + multiplier / confidence) ^ exponent`
    fn with_confidence_multiplier(
        self,
        multiplier: f64,
        exponent: f64,
    ) -> ConfidenceMultiplierEstimator<Self>
    where
        Self: Sized,
    {
        ConfidenceMultiplierEstimator::new(self, multiplier, exponent)
    }

    /// Drop the given resources from the output
    fn with_omitted_resources(self, resources: &[ResourceName]) -> OmitResourceEstimator<Self>
    where
        Self: Sized,
    {
        OmitResourceEstimator::new(self, resources)
    }

    /// Raise every amount to at least the matching entry of `min_resources`
    fn with_min_resources(self, min_resources: ResourceMap) -> MinResourcesEstimator<Self>
    where
        Self: Sized,
    {
        MinResourcesEstimator::new(self, min_resources)
    }

    fn boxed(self) -> Box<dyn ResourceEstimator>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl<E: ResourceEstimator + ?Sized> ResourceEstimator for Box<E> {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        (**self).get_resource_estimation(state)
    }
}

impl<E: ResourceEstimator + ?Sized> ResourceEstimator for Arc<E> {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        (**self).get_resource_estimation(state)
    }
}
