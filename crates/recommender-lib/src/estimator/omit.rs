use super::ResourceEstimator;
use crate::models::{ResourceMap, ResourceName};
use crate::state::ContainerState;

/// Removes resources from the inner estimate; omitted keys are absent, not zero
#[derive(Debug, Clone)]
pub struct OmitResourceEstimator<E> {
    inner: E,
    omitted: Vec<ResourceName>,
}

impl<E: ResourceEstimator> OmitResourceEstimator<E> {
    pub fn new(inner: E, resources: &[ResourceName]) -> Self {
        Self {
            inner,
            omitted: resources.to_vec(),
        }
    }
}

impl<E: ResourceEstimator> ResourceEstimator for OmitResourceEstimator<E> {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        let mut resources = self.inner.get_resource_estimation(state);
        for resource in &self.omitted {
            resources.remove(resource.as_str());
        }
        resources
    }
}
