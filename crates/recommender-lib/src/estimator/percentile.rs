use super::ResourceEstimator;
use crate::models::ResourceMap;
use crate::resource_amount::{cpu_amount_from_cores, make_resource_map, memory_amount_from_bytes};
use crate::state::ContainerState;

/// Reads a percentile from each resource histogram.
///
/// An empty histogram yields a zero amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileEstimator {
    cpu_percentile: f64,
    memory_percentile: f64,
}

impl PercentileEstimator {
    pub fn new(cpu_percentile: f64, memory_percentile: f64) -> Self {
        Self {
            cpu_percentile,
            memory_percentile,
        }
    }

    pub fn cpu_percentile(&self) -> f64 {
        self.cpu_percentile
    }

    pub fn memory_percentile(&self) -> f64 {
        self.memory_percentile
    }
}

impl ResourceEstimator for PercentileEstimator {
    fn get_resource_estimation(&self, state: &ContainerState) -> ResourceMap {
        let cpu_cores = state.cpu_histogram().percentile(self.cpu_percentile);
        let memory_bytes = state.memory_histogram().percentile(self.memory_percentile);
        make_resource_map(
            cpu_amount_from_cores(cpu_cores),
            memory_amount_from_bytes(memory_bytes),
        )
    }
}
