use super::ResourceEstimator;
use crate::models::ResourceMap;
use crate::state::ContainerState;

/// Returns the same resources regardless of history
#[derive(Debug, Clone, PartialEq)]
pub struct ConstEstimator {
    resources: ResourceMap,
}

impl ConstEstimator {
    pub fn of(resources: ResourceMap) -> Self {
        Self { resources }
    }
}

impl ResourceEstimator for ConstEstimator {
    fn get_resource_estimation(&self, _state: &ContainerState) -> ResourceMap {
        self.resources.clone()
    }
}
