//! Protobuf wire messages
//!
//! Checkpoint messages are written by hand with `prost` derives so the crate
//! needs no `protoc` at build time. Field tags are stable; new fields must
//! take fresh tags. Conversions to and from the domain types live in
//! [`convert`].

pub mod convert;

pub mod recommender {
    pub mod v1 {
        use prost::Message;
        use std::collections::BTreeMap;

        /// Sparse histogram snapshot.
        ///
        /// `reference_timestamp` is a `google.protobuf.Timestamp` rather than
        /// int64 epoch millis, so sub-millisecond references survive a round
        /// trip. Readers treat an absent value as the epoch.
        #[derive(Clone, PartialEq, Message)]
        pub struct HistogramCheckpoint {
            #[prost(message, optional, tag = "1")]
            pub reference_timestamp: Option<prost_types::Timestamp>,
            #[prost(btree_map = "int32, double", tag = "2")]
            pub bucket_weights: BTreeMap<i32, f64>,
            #[prost(double, tag = "3")]
            pub total_weight: f64,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct ContainerCheckpoint {
            #[prost(message, optional, tag = "1")]
            pub last_update_time: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "2")]
            pub cpu_histogram: Option<HistogramCheckpoint>,
            #[prost(int64, tag = "3")]
            pub memory_peak: i64,
            #[prost(message, optional, tag = "4")]
            pub first_sample_start: Option<prost_types::Timestamp>,
            #[prost(message, optional, tag = "5")]
            pub last_sample_start: Option<prost_types::Timestamp>,
            #[prost(uint64, tag = "6")]
            pub total_samples_count: u64,
            #[prost(message, optional, tag = "7")]
            pub window_end: Option<prost_types::Timestamp>,
            #[prost(int32, tag = "8")]
            pub version: i32,
        }

        #[derive(Clone, PartialEq, Message)]
        pub struct IntervalCheckpoints {
            #[prost(message, optional, tag = "1")]
            pub interval_start: Option<prost_types::Timestamp>,
            #[prost(btree_map = "string, message", tag = "2")]
            pub containers: BTreeMap<String, ContainerCheckpoint>,
        }
    }
}
