//! Histogram-based resource recommendations for containers
//!
//! This crate provides the core functionality for:
//! - Exponentially bucketed, optionally decaying usage histograms
//! - Per-container usage state and its checkpoints
//! - Aggregating per-interval checkpoints over a sliding window
//! - Composable estimator chains and the recommendation variants built from them
//! - Protobuf wire format, configuration and observability

pub mod config;
pub mod error;
pub mod estimator;
pub mod histogram;
pub mod models;
pub mod observability;
pub mod proto;
pub mod recommender;
pub mod resource_amount;
pub mod state;

pub use config::RecommenderConfig;
pub use error::{CheckpointError, ConfigError, OptionsError, SampleError};
pub use models::*;
pub use observability::{RecommenderMetrics, StructuredLogger};
pub use recommender::{
    ContainerRecommendation, RecommendationPipeline, RecommendationRun, Recommender,
    ResourceRequirement,
};
