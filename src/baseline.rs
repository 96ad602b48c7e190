//! Baseline estimation
//!
//! This module computes resting heart-rate baselines per activity type and
//! time-of-day bucket. Baselines are the reference point for both stress and
//! calming detection.

use crate::config::{TerrainConfig, DEFAULT_BASELINE_BPM};
use crate::types::{BaselineKey, HealthSample};
use std::collections::HashMap;

/// Baseline heart rates keyed by (activity, bucket)
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTable {
    entries: HashMap<BaselineKey, f64>,
    /// Returned by `lookup` for keys with no entry
    default_bpm: f64,
}

impl Default for BaselineTable {
    fn default() -> Self {
        Self::with_default(DEFAULT_BASELINE_BPM)
    }
}

impl BaselineTable {
    /// Create an empty table that falls back to `default_bpm`
    pub fn with_default(default_bpm: f64) -> Self {
        Self {
            entries: HashMap::new(),
            default_bpm,
        }
    }

    /// Baseline for `key`, or the default when the group had no valid readings
    pub fn lookup(&self, key: &BaselineKey) -> f64 {
        self.entries.get(key).copied().unwrap_or(self.default_bpm)
    }

    pub fn insert(&mut self, key: BaselineKey, bpm: f64) {
        self.entries.insert(key, bpm);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}

/// Estimator for per-group resting baselines
pub struct BaselineEstimator;

impl BaselineEstimator {
    /// Group samples by (activity, bucket) and average the valid heart rates
    /// of each group. Groups without a positive heart rate get no entry.
    pub fn estimate(samples: &[HealthSample], config: &TerrainConfig) -> BaselineTable {
        let offset = config.local_offset();
        let mut groups: HashMap<BaselineKey, Vec<f64>> = HashMap::new();

        for sample in samples {
            let Some(key) = BaselineKey::for_sample(sample, &offset) else {
                continue;
            };
            let readings = groups.entry(key).or_default();
            if let Some(hr) = sample.valid_heart_rate() {
                readings.push(hr);
            }
        }

        let mut table = BaselineTable::with_default(config.default_baseline_bpm);
        for (key, readings) in groups {
            if let Some(mean) = mean(&readings) {
                table.insert(key, mean);
            }
        }
        table
    }
}

/// Arithmetic mean, `None` for an empty slice
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(hour: u32, minute: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_groups_by_activity_and_bucket() {
        let samples = vec![
            HealthSample::at(ts(1, 0)).with_heart_rate(60.0),
            HealthSample::at(ts(2, 0)).with_heart_rate(64.0),
            HealthSample::at(ts(9, 0)).with_heart_rate(80.0),
            HealthSample::at(ts(9, 30))
                .with_heart_rate(90.0)
                .with_activity("WALKING"),
        ];
        let table = BaselineEstimator::estimate(&samples, &TerrainConfig::default());

        assert_eq!(table.len(), 3);
        assert!((table.lookup(&BaselineKey::new("REST", 0)) - 62.0).abs() < 1e-9);
        assert!((table.lookup(&BaselineKey::new("REST", 2)) - 80.0).abs() < 1e-9);
        assert!((table.lookup(&BaselineKey::new("WALKING", 2)) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_ignores_missing_and_non_positive_heart_rates() {
        let samples = vec![
            HealthSample::at(ts(13, 0)).with_heart_rate(70.0),
            HealthSample::at(ts(13, 5)).with_heart_rate(0.0),
            HealthSample::at(ts(13, 10)),
            HealthSample::at(ts(14, 0)).with_heart_rate(74.0),
        ];
        let table = BaselineEstimator::estimate(&samples, &TerrainConfig::default());

        assert_eq!(table.len(), 1);
        assert!((table.lookup(&BaselineKey::new("REST", 3)) - 72.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_without_valid_readings_is_absent() {
        let samples = vec![
            HealthSample::at(ts(20, 0)).with_activity("SLEEP"),
            HealthSample::at(ts(21, 0))
                .with_activity("SLEEP")
                .with_heart_rate(-1.0),
        ];
        let table = BaselineEstimator::estimate(&samples, &TerrainConfig::default());

        let key = BaselineKey::new("SLEEP", 5);
        assert!(table.is_empty());
        assert_eq!(table.lookup(&key), 70.0);
    }

    #[test]
    fn test_empty_input() {
        let table = BaselineEstimator::estimate(&[], &TerrainConfig::default());
        assert!(table.is_empty());
        assert_eq!(table.lookup(&BaselineKey::new("REST", 0)), 70.0);
    }

    #[test]
    fn test_configured_default_baseline() {
        let config = TerrainConfig {
            default_baseline_bpm: 65.0,
            ..Default::default()
        };
        let table = BaselineEstimator::estimate(&[], &config);
        assert_eq!(table.lookup(&BaselineKey::new("REST", 1)), 65.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }
}
