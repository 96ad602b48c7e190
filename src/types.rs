//! Core types for the stress terrain pipeline
//!
//! This module defines the data structures that flow through each stage:
//! health samples in, baseline keys and events in the middle, clusters out.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Activity label used when a sample carries none
pub const DEFAULT_ACTIVITY: &str = "REST";

/// Number of hours covered by one time-of-day bucket
pub const HOURS_PER_BUCKET: u32 = 4;

/// A single health reading supplied by the sample store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// Reading time (epoch milliseconds)
    pub timestamp: i64,
    /// Heart rate (bpm)
    #[serde(default, alias = "heartRate", skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    /// Latitude (degrees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    /// Longitude (degrees)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Free-form activity label (e.g. "WALKING", "RUNNING")
    #[serde(default, alias = "activityType", skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
}

impl HealthSample {
    /// Create a sample with only a timestamp set
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            heart_rate: None,
            latitude: None,
            longitude: None,
            activity_type: None,
        }
    }

    pub fn with_heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity_type = Some(activity.into());
        self
    }

    /// Activity label with the REST default applied
    pub fn activity(&self) -> &str {
        self.activity_type.as_deref().unwrap_or(DEFAULT_ACTIVITY)
    }

    /// Heart rate if present and strictly positive
    pub fn valid_heart_rate(&self) -> Option<f64> {
        self.heart_rate.filter(|hr| *hr > 0.0)
    }

    /// Both coordinates, if present
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }

    /// Sample time in UTC, `None` when the timestamp is out of range
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Composite key identifying one baseline group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaselineKey {
    /// Activity label ("REST" when the sample had none)
    pub activity: String,
    /// Time-of-day bucket, 0..=5
    pub bucket: u8,
}

impl BaselineKey {
    pub fn new(activity: impl Into<String>, bucket: u8) -> Self {
        Self {
            activity: activity.into(),
            bucket,
        }
    }

    /// Derive the key for a sample using the given local clock offset
    pub fn for_sample(sample: &HealthSample, offset: &FixedOffset) -> Option<Self> {
        let local = sample.observed_at()?.with_timezone(offset);
        Some(Self::new(sample.activity(), time_bucket(local.hour())))
    }
}

/// Map an hour of day (0..=23) to its 4-hour bucket
pub fn time_bucket(hour: u32) -> u8 {
    (hour / HOURS_PER_BUCKET) as u8
}

/// Which detection path produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Heart rate spiked above baseline
    Stress,
    /// Heart rate at a place stayed below baseline
    Calming,
}

/// A detected stress or calming event at a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressEvent {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Observed heart rate (mean of the location group for calming events)
    pub heart_rate: f64,
    /// Baseline the observation was compared against
    pub baseline_heart_rate: f64,
    pub activity_type: String,
    /// Normalized intensity, 0-1
    pub intensity: f64,
    pub kind: EventKind,
}

/// Aggregated events within one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressCluster {
    /// Centroid latitude (mean of members)
    pub latitude: f64,
    /// Centroid longitude (mean of members)
    pub longitude: f64,
    /// Mean intensity of members, 0-1
    pub weight: f64,
    pub event_count: usize,
    pub is_calming_zone: bool,
}

/// Output of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainResult {
    pub stress_clusters: Vec<StressCluster>,
    pub calming_clusters: Vec<StressCluster>,
}

impl TerrainResult {
    /// The "nothing to show" result
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stress_clusters.is_empty() && self.calming_clusters.is_empty()
    }

    /// Split into the (stress, calming) pair
    pub fn into_pair(self) -> (Vec<StressCluster>, Vec<StressCluster>) {
        (self.stress_clusters, self.calming_clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_activity_defaults_to_rest() {
        let sample = HealthSample::at(0).with_heart_rate(72.0);
        assert_eq!(sample.activity(), "REST");
        assert_eq!(sample.with_activity("WALKING").activity(), "WALKING");
    }

    #[test]
    fn test_valid_heart_rate_rejects_non_positive() {
        assert_eq!(HealthSample::at(0).with_heart_rate(0.0).valid_heart_rate(), None);
        assert_eq!(HealthSample::at(0).with_heart_rate(-5.0).valid_heart_rate(), None);
        assert_eq!(HealthSample::at(0).valid_heart_rate(), None);
        assert_eq!(
            HealthSample::at(0).with_heart_rate(61.5).valid_heart_rate(),
            Some(61.5)
        );
    }

    #[test]
    fn test_time_buckets() {
        assert_eq!(time_bucket(0), 0);
        assert_eq!(time_bucket(3), 0);
        assert_eq!(time_bucket(4), 1);
        assert_eq!(time_bucket(13), 3);
        assert_eq!(time_bucket(23), 5);
    }

    #[test]
    fn test_baseline_key_uses_local_hour() {
        // 2024-01-15 02:30 UTC
        let ts = Utc
            .with_ymd_and_hms(2024, 1, 15, 2, 30, 0)
            .unwrap()
            .timestamp_millis();
        let sample = HealthSample::at(ts).with_heart_rate(70.0);

        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            BaselineKey::for_sample(&sample, &utc),
            Some(BaselineKey::new("REST", 0))
        );

        // UTC+05:30 puts the reading at 08:00 local
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        assert_eq!(
            BaselineKey::for_sample(&sample, &ist),
            Some(BaselineKey::new("REST", 2))
        );
    }

    #[test]
    fn test_sample_deserializes_camel_case_aliases() {
        let json = r#"{"timestamp":1700000000000,"heartRate":88.0,"latitude":1.0,"longitude":2.0,"activityType":"WALKING"}"#;
        let sample: HealthSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.heart_rate, Some(88.0));
        assert_eq!(sample.activity(), "WALKING");
        assert_eq!(sample.location(), Some((1.0, 2.0)));
    }
}
