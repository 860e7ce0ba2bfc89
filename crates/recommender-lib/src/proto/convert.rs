//! Domain <-> wire conversions
//!
//! Encoding is infallible. Decoding validates everything the wire format
//! cannot express: bucket indices must be non-negative, required timestamps
//! present and every timestamp within chrono's range. Interval decoding
//! tolerates bad data per container so one corrupt entry never hides the
//! rest of the interval.

use super::recommender::v1 as pb;
use crate::error::CheckpointError;
use crate::histogram::HistogramCheckpoint;
use crate::models::EPOCH;
use crate::state::{ContainerCheckpoint, IntervalCheckpoints};
use chrono::{DateTime, Utc};
use prost::Message;
use tracing::warn;

const NANOS_PER_SECOND: i32 = 1_000_000_000;

pub fn to_timestamp(time: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: time.timestamp(),
        nanos: time.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_timestamp(timestamp: &prost_types::Timestamp) -> Result<DateTime<Utc>, CheckpointError> {
    if !(0..NANOS_PER_SECOND).contains(&timestamp.nanos) {
        return Err(CheckpointError::InvalidTimestamp(format!(
            "nanos {} outside [0, 1e9)",
            timestamp.nanos
        )));
    }
    DateTime::from_timestamp(timestamp.seconds, timestamp.nanos as u32).ok_or_else(|| {
        CheckpointError::InvalidTimestamp(format!("{} seconds since epoch", timestamp.seconds))
    })
}

fn optional_time(
    timestamp: Option<&prost_types::Timestamp>,
) -> Result<Option<DateTime<Utc>>, CheckpointError> {
    timestamp.map(from_timestamp).transpose()
}

fn required_time(
    timestamp: Option<&prost_types::Timestamp>,
    field: &'static str,
) -> Result<DateTime<Utc>, CheckpointError> {
    let timestamp = timestamp.ok_or(CheckpointError::MissingField(field))?;
    from_timestamp(timestamp)
}

impl From<&HistogramCheckpoint> for pb::HistogramCheckpoint {
    fn from(checkpoint: &HistogramCheckpoint) -> Self {
        Self {
            reference_timestamp: Some(to_timestamp(checkpoint.reference_timestamp)),
            bucket_weights: checkpoint
                .bucket_weights
                .iter()
                // Indices past i32::MAX are out of range for any histogram and
                // stay rejected when the checkpoint is loaded
                .map(|(&bucket, &weight)| (i32::try_from(bucket).unwrap_or(i32::MAX), weight))
                .collect(),
            total_weight: checkpoint.total_weight,
        }
    }
}

impl TryFrom<&pb::HistogramCheckpoint> for HistogramCheckpoint {
    type Error = CheckpointError;

    fn try_from(message: &pb::HistogramCheckpoint) -> Result<Self, Self::Error> {
        let bucket_weights = message
            .bucket_weights
            .iter()
            .map(|(&bucket, &weight)| {
                usize::try_from(bucket)
                    .map(|index| (index, weight))
                    .map_err(|_| CheckpointError::NegativeBucket(bucket))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            // Plain histograms are anchored at the epoch
            reference_timestamp: optional_time(message.reference_timestamp.as_ref())?
                .unwrap_or(EPOCH),
            bucket_weights,
            total_weight: message.total_weight,
        })
    }
}

impl From<&ContainerCheckpoint> for pb::ContainerCheckpoint {
    fn from(checkpoint: &ContainerCheckpoint) -> Self {
        Self {
            last_update_time: Some(to_timestamp(checkpoint.last_update_time)),
            cpu_histogram: checkpoint.cpu_histogram.as_ref().map(Into::into),
            memory_peak: checkpoint.memory_peak,
            first_sample_start: checkpoint.first_sample_start.map(to_timestamp),
            last_sample_start: checkpoint.last_sample_start.map(to_timestamp),
            total_samples_count: checkpoint.total_samples_count,
            window_end: checkpoint.window_end.map(to_timestamp),
            version: checkpoint.version,
        }
    }
}

impl TryFrom<&pb::ContainerCheckpoint> for ContainerCheckpoint {
    type Error = CheckpointError;

    fn try_from(message: &pb::ContainerCheckpoint) -> Result<Self, Self::Error> {
        let cpu_histogram = message
            .cpu_histogram
            .as_ref()
            .map(HistogramCheckpoint::try_from)
            .transpose()?;
        container_with_cpu(message, cpu_histogram)
    }
}

fn container_with_cpu(
    message: &pb::ContainerCheckpoint,
    cpu_histogram: Option<HistogramCheckpoint>,
) -> Result<ContainerCheckpoint, CheckpointError> {
    Ok(ContainerCheckpoint {
        last_update_time: required_time(message.last_update_time.as_ref(), "last_update_time")?,
        cpu_histogram,
        memory_peak: message.memory_peak,
        first_sample_start: optional_time(message.first_sample_start.as_ref())?,
        last_sample_start: optional_time(message.last_sample_start.as_ref())?,
        total_samples_count: message.total_samples_count,
        window_end: optional_time(message.window_end.as_ref())?,
        version: message.version,
    })
}

impl From<&IntervalCheckpoints> for pb::IntervalCheckpoints {
    fn from(interval: &IntervalCheckpoints) -> Self {
        Self {
            interval_start: Some(to_timestamp(interval.interval_start)),
            containers: interval
                .containers
                .iter()
                .map(|(name, checkpoint)| (name.clone(), checkpoint.into()))
                .collect(),
        }
    }
}

/// Container data dropped while decoding one interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Containers left out because a timestamp was missing or out of range
    pub containers_skipped: u64,
    /// Cpu histograms discarded while the rest of their container was kept
    pub cpu_histograms_dropped: u64,
}

impl IntervalCheckpoints {
    /// Convert a wire message container by container.
    ///
    /// An invalid cpu histogram is dropped and the container keeps its
    /// memory peak; a container with unusable timestamps is skipped. Only a
    /// missing or invalid `interval_start` fails the whole interval.
    pub fn from_message(
        message: &pb::IntervalCheckpoints,
    ) -> Result<(Self, DecodeReport), CheckpointError> {
        let interval_start = required_time(message.interval_start.as_ref(), "interval_start")?;
        let mut report = DecodeReport::default();
        let mut interval = Self::new(interval_start);

        for (name, container) in &message.containers {
            let cpu_histogram = match container
                .cpu_histogram
                .as_ref()
                .map(HistogramCheckpoint::try_from)
                .transpose()
            {
                Ok(cpu_histogram) => cpu_histogram,
                Err(e) => {
                    warn!(container = %name, error = %e, "Dropping undecodable cpu histogram");
                    report.cpu_histograms_dropped += 1;
                    None
                }
            };

            match container_with_cpu(container, cpu_histogram) {
                Ok(checkpoint) => {
                    interval.containers.insert(name.clone(), checkpoint);
                }
                Err(e) => {
                    warn!(container = %name, error = %e, "Skipping undecodable container checkpoint");
                    report.containers_skipped += 1;
                }
            }
        }
        Ok((interval, report))
    }

    /// Serialize as a `recommender.v1.IntervalCheckpoints` message
    pub fn encode_to_vec(&self) -> Vec<u8> {
        pb::IntervalCheckpoints::from(self).encode_to_vec()
    }

    /// Parse a `recommender.v1.IntervalCheckpoints` message, see [`Self::from_message`]
    pub fn decode_with_report(bytes: &[u8]) -> Result<(Self, DecodeReport), CheckpointError> {
        let message = pb::IntervalCheckpoints::decode(bytes)?;
        Self::from_message(&message)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CheckpointError> {
        Self::decode_with_report(bytes).map(|(interval, _)| interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerUsageSample;
    use crate::state::{ContainerState, ContainerStateOptions};
    use chrono::Duration;

    fn sample_interval() -> IntervalCheckpoints {
        let start = EPOCH + Duration::days(100);
        let mut state = ContainerState::new(&ContainerStateOptions::default());
        for i in 0..20 {
            let time = start + Duration::seconds(90 * i) + Duration::nanoseconds(123_456_789);
            state
                .add_sample(&ContainerUsageSample::cpu(time, 0.05 * i as f64, 0.5))
                .unwrap();
        }
        state
            .add_sample(&ContainerUsageSample::memory(start, 734_003_200.0))
            .unwrap();

        let idle = ContainerState::new(&ContainerStateOptions::default());

        IntervalCheckpoints::new(start)
            .with_container("app", state.to_checkpoint(start + Duration::hours(1)))
            .with_container("sidecar", idle.to_checkpoint(start))
    }

    #[test]
    fn test_interval_round_trip() {
        let interval = sample_interval();
        let decoded = IntervalCheckpoints::decode(&interval.encode_to_vec()).unwrap();
        assert_eq!(decoded, interval);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = IntervalCheckpoints::decode(&[0xff, 0xff]);
        assert!(matches!(result, Err(CheckpointError::Decode(_))));
    }

    #[test]
    fn test_negative_bucket_rejected() {
        let mut message = pb::ContainerCheckpoint::from(&sample_interval().containers["app"]);
        message
            .cpu_histogram
            .as_mut()
            .unwrap()
            .bucket_weights
            .insert(-3, 1.0);

        let result = ContainerCheckpoint::try_from(&message);
        assert!(matches!(result, Err(CheckpointError::NegativeBucket(-3))));
    }

    #[test]
    fn test_corrupt_cpu_histogram_keeps_memory_and_other_containers() {
        let interval = sample_interval()
            .with_container("cache", {
                let mut state = ContainerState::new(&ContainerStateOptions::default());
                state
                    .add_sample(&ContainerUsageSample::memory(EPOCH + Duration::days(100), 4e8))
                    .unwrap();
                state.to_checkpoint(EPOCH + Duration::days(101))
            });
        let mut message = pb::IntervalCheckpoints::from(&interval);
        message
            .containers
            .get_mut("app")
            .unwrap()
            .cpu_histogram
            .as_mut()
            .unwrap()
            .bucket_weights
            .insert(-1, 1.0);

        let (decoded, report) =
            IntervalCheckpoints::decode_with_report(&message.encode_to_vec()).unwrap();

        assert_eq!(report.cpu_histograms_dropped, 1);
        assert_eq!(report.containers_skipped, 0);
        assert_eq!(decoded.containers["cache"], interval.containers["cache"]);
        assert_eq!(decoded.containers["cache"].memory_peak, 400_000_000);
        let app = &decoded.containers["app"];
        assert_eq!(app.cpu_histogram, None);
        assert_eq!(app.memory_peak, interval.containers["app"].memory_peak);
    }

    #[test]
    fn test_container_missing_timestamp_is_skipped() {
        let mut message = pb::IntervalCheckpoints::from(&sample_interval());
        message.containers.get_mut("app").unwrap().last_update_time = None;

        let (decoded, report) = IntervalCheckpoints::from_message(&message).unwrap();
        assert_eq!(report.containers_skipped, 1);
        assert!(!decoded.containers.contains_key("app"));
        assert!(decoded.containers.contains_key("sidecar"));

        let strict = ContainerCheckpoint::try_from(&message.containers["app"]);
        assert!(matches!(
            strict,
            Err(CheckpointError::MissingField("last_update_time"))
        ));
    }

    #[test]
    fn test_missing_interval_start_fails_interval() {
        let mut message = pb::IntervalCheckpoints::from(&sample_interval());
        message.interval_start = None;
        assert!(matches!(
            IntervalCheckpoints::from_message(&message),
            Err(CheckpointError::MissingField("interval_start"))
        ));
    }

    #[test]
    fn test_invalid_nanos_rejected() {
        let timestamp = prost_types::Timestamp {
            seconds: 10,
            nanos: -1,
        };
        assert!(matches!(
            from_timestamp(&timestamp),
            Err(CheckpointError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_reference_timestamp_keeps_sub_millisecond_precision() {
        let checkpoint = HistogramCheckpoint {
            reference_timestamp: EPOCH + Duration::days(3) + Duration::nanoseconds(1_500_007),
            bucket_weights: [(4, 2.0)].into_iter().collect(),
            total_weight: 2.0,
        };
        let message = pb::HistogramCheckpoint::from(&checkpoint);
        assert_eq!(
            message.reference_timestamp,
            Some(prost_types::Timestamp {
                seconds: 3 * 86_400,
                nanos: 1_500_007,
            })
        );

        let bytes = message.encode_to_vec();
        let decoded = pb::HistogramCheckpoint::decode(bytes.as_slice()).unwrap();
        assert_eq!(HistogramCheckpoint::try_from(&decoded).unwrap(), checkpoint);
    }

    #[test]
    fn test_missing_reference_defaults_to_epoch() {
        let message = pb::HistogramCheckpoint {
            reference_timestamp: None,
            bucket_weights: [(4, 2.0)].into_iter().collect(),
            total_weight: 2.0,
        };
        let checkpoint = HistogramCheckpoint::try_from(&message).unwrap();
        assert_eq!(checkpoint.reference_timestamp, EPOCH);
        assert_eq!(checkpoint.bucket_weights.get(&4), Some(&2.0));
    }
}
