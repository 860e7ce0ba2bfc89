//! Container usage state, checkpoints and cross-interval aggregation

mod aggregator;
mod checkpoint;
mod container;

pub use aggregator::{
    AggregatedHistograms, AggregationStats, AggregationWindow, PartialHistogramAggregator,
    DEFAULT_WINDOW_DAYS,
};
pub use checkpoint::{ContainerCheckpoint, IntervalCheckpoints, CHECKPOINT_VERSION};
pub use container::{
    ContainerState, ContainerStateOptions, SampleCounters, DEFAULT_MEMORY_AGGREGATION_INTERVAL,
};
