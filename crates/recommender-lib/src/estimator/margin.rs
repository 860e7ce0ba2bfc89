use super::ResourceEstimator;
use crate::models::ResourceMap;
use crate::resource_amount::scale_resource;
use crate::state::ContainerState;

/// Adds a safety margin on top of the inner estimate
#[derive(Debug, Clone)]
pub struct MarginEstimator<E> {
    inner: E,
    margin_fraction: f64,
}

impl<E: ResourceEstimator> MarginEstimator<E> {
    pub fn new(inner: E, margin_fraction: f64) -> Self {
        Self {
            inner,
            margin_fraction,
        }
    }
}

impl<E: ResourceEstimator> ResourceEstimator for MarginEstimator<E> {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        let factor = 1.0 + self.margin_fraction;
        self.inner
            .get_resource_estimation(state)
            .into_iter()
            .map(|(name, amount)| (name, scale_resource(amount, factor)))
            .collect()
    }
}
