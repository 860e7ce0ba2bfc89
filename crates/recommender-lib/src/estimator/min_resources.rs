use super::ResourceEstimator;
use crate::models::ResourceMap;
use crate::state::ContainerState;

/// Raises each amount of the inner estimate to a per-resource floor.
///
/// Resources the inner estimator does not report stay absent.
#[derive(Debug, Clone)]
pub struct MinResourcesEstimator<E> {
    inner: E,
    min_resources: ResourceMap,
}

impl<E: ResourceEstimator> MinResourcesEstimator<E> {
    pub fn new(inner: E, min_resources: ResourceMap) -> Self {
        Self {
            inner,
            min_resources,
        }
    }
}

impl<E: ResourceEstimator> ResourceEstimator for MinResourcesEstimator<E> {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        self.inner
            .get_resource_estimation(state)
            .into_iter()
            .map(|(name, amount)| {
                let floor = self.min_resources.get(&name).copied().unwrap_or(0);
                (name, amount.max(floor))
            })
            .collect()
    }
}
