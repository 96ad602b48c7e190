//! Stress and calming event detection
//!
//! Two deliberately different detectors run against the same baselines:
//! - Stress detection is per sample: a single reading well above baseline,
//!   outside vigorous activity, is an event.
//! - Calming detection is per place: samples are grouped by a coarse location
//!   and a group whose mean heart rate sits well below baseline yields one event.

use crate::baseline::{mean, BaselineTable};
use crate::config::TerrainConfig;
use crate::types::{BaselineKey, EventKind, HealthSample, StressEvent};
use std::collections::BTreeMap;

/// Coarse location used to group samples for calming detection.
///
/// Coordinates are truncated (toward zero) to the configured number of
/// decimal places; with two decimals a key covers roughly 1.1 km.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey {
    pub lat: i64,
    pub lng: i64,
}

impl LocationKey {
    pub fn new(latitude: f64, longitude: f64, decimals: u32) -> Self {
        let scale = 10f64.powi(decimals as i32);
        Self {
            lat: (latitude * scale).trunc() as i64,
            lng: (longitude * scale).trunc() as i64,
        }
    }
}

/// Rule-based detector for stress and calming events
pub struct EventDetector<'a> {
    config: &'a TerrainConfig,
    baselines: &'a BaselineTable,
}

impl<'a> EventDetector<'a> {
    pub fn new(config: &'a TerrainConfig, baselines: &'a BaselineTable) -> Self {
        Self { config, baselines }
    }

    /// True when the activity label contains any vigorous fragment (case-insensitive)
    pub fn is_vigorous(&self, activity: &str) -> bool {
        is_vigorous_activity(activity, &self.config.vigorous_activities)
    }

    /// Flag every sample whose heart rate exceeds its baseline by more than the
    /// stress threshold, unless the activity is vigorous.
    pub fn detect_stress(&self, samples: &[HealthSample]) -> Vec<StressEvent> {
        let offset = self.config.local_offset();
        let mut events = Vec::new();

        for sample in samples {
            let Some(heart_rate) = sample.valid_heart_rate() else {
                continue;
            };
            let Some((latitude, longitude)) = sample.location() else {
                continue;
            };
            let Some(key) = BaselineKey::for_sample(sample, &offset) else {
                continue;
            };

            let baseline = self.baselines.lookup(&key);
            let deviation = heart_rate - baseline;

            if deviation > self.config.stress_threshold_bpm && !self.is_vigorous(&key.activity) {
                let intensity =
                    (deviation / (baseline * self.config.stress_intensity_scale)).clamp(0.0, 1.0);
                events.push(StressEvent {
                    timestamp: sample.timestamp,
                    latitude,
                    longitude,
                    heart_rate,
                    baseline_heart_rate: baseline,
                    activity_type: key.activity,
                    intensity,
                    kind: EventKind::Stress,
                });
            }
        }

        events
    }

    /// Emit one calming event per location group whose mean heart rate is more
    /// than the calming threshold below the baseline of its first sample.
    pub fn detect_calming(&self, samples: &[HealthSample]) -> Vec<StressEvent> {
        let offset = self.config.local_offset();
        let decimals = self.config.calming_location_decimals;

        let mut groups: BTreeMap<LocationKey, Vec<&HealthSample>> = BTreeMap::new();
        for sample in samples {
            if let Some((lat, lng)) = sample.location() {
                groups
                    .entry(LocationKey::new(lat, lng, decimals))
                    .or_default()
                    .push(sample);
            }
        }

        let mut events = Vec::new();
        for group in groups.values() {
            let readings: Vec<f64> = group.iter().filter_map(|s| s.valid_heart_rate()).collect();
            let Some(mean_heart_rate) = mean(&readings) else {
                continue;
            };

            let first = group[0];
            let Some((latitude, longitude)) = first.location() else {
                continue;
            };
            let Some(key) = BaselineKey::for_sample(first, &offset) else {
                continue;
            };
            let baseline = self.baselines.lookup(&key);
            let drop = baseline - mean_heart_rate;

            if drop > self.config.calming_threshold_bpm {
                events.push(StressEvent {
                    timestamp: first.timestamp,
                    latitude,
                    longitude,
                    heart_rate: mean_heart_rate,
                    baseline_heart_rate: baseline,
                    activity_type: key.activity,
                    intensity: (drop / baseline).clamp(0.0, 1.0),
                    kind: EventKind::Calming,
                });
            }
        }

        events
    }
}

/// Substring match of `activity` against the vigorous fragments, ignoring case
pub fn is_vigorous_activity(activity: &str, vigorous: &[String]) -> bool {
    let upper = activity.to_uppercase();
    vigorous
        .iter()
        .any(|fragment| upper.contains(&fragment.to_uppercase()))
}
