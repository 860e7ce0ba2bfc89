//! Core data models for the recommender

use crate::error::SampleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Upper bound for any resource amount (millicores or bytes)
pub const MAX_RESOURCE_AMOUNT: i64 = 100_000_000_000_000;

/// Timestamp used for samples that carry no meaningful time
pub const EPOCH: DateTime<Utc> = DateTime::UNIX_EPOCH;

/// Resource amounts keyed by resource name ("cpu" in millicores, "memory" in bytes)
pub type ResourceMap = BTreeMap<String, i64>;

/// Resource types tracked by the recommender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceName {
    Cpu,
    Memory,
}

impl ResourceName {
    pub const ALL: [ResourceName; 2] = [ResourceName::Cpu, ResourceName::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::Cpu => "cpu",
            ResourceName::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(ResourceName::Cpu),
            "memory" => Ok(ResourceName::Memory),
            other => Err(format!("unknown resource name: {}", other)),
        }
    }
}

/// A single usage observation for one resource of one container
///
/// CPU usage and request are in cores, memory usage and request in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsageSample {
    pub measure_start: DateTime<Utc>,
    pub usage: f64,
    pub request: f64,
    pub resource: ResourceName,
}

impl ContainerUsageSample {
    pub fn cpu(measure_start: DateTime<Utc>, usage_cores: f64, request_cores: f64) -> Self {
        Self {
            measure_start,
            usage: usage_cores,
            request: request_cores,
            resource: ResourceName::Cpu,
        }
    }

    pub fn memory(measure_start: DateTime<Utc>, usage_bytes: f64) -> Self {
        Self {
            measure_start,
            usage: usage_bytes,
            request: 0.0,
            resource: ResourceName::Memory,
        }
    }

    /// Reject samples that must never reach a histogram
    pub fn validate(&self) -> Result<(), SampleError> {
        if !self.usage.is_finite() || self.usage < 0.0 {
            return Err(SampleError::InvalidValue(self.usage));
        }
        if !self.request.is_finite() || self.request < 0.0 {
            return Err(SampleError::InvalidRequest(self.request));
        }
        Ok(())
    }
}
