//! Pipeline orchestration
//!
//! This module provides the public API for stress terrain analysis.
//! It orchestrates the full pipeline from health samples to clusters.

use crate::baseline::BaselineEstimator;
use crate::cluster::SpatialClusterer;
use crate::config::TerrainConfig;
use crate::detector::EventDetector;
use crate::error::TerrainError;
use crate::source::{SampleSource, TimeRange};
use crate::types::{HealthSample, TerrainResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Run the analysis stages over an in-memory sample set.
///
/// Pipeline stages:
/// 1. Filter - keep samples that pass [`HealthSample::validate`]
/// 2. BaselineEstimator - per (activity, bucket) resting baselines
/// 3. EventDetector - stress events (per sample) and calming events (per place)
/// 4. SpatialClusterer - stress and calming clusters
///
/// # Example
/// ```ignore
/// let result = analyze(&samples, &TerrainConfig::default());
/// let (stress, calming) = result.into_pair();
/// ```
pub fn analyze(samples: &[HealthSample], config: &TerrainConfig) -> TerrainResult {
    // Stage 1: keep readings that can be placed on the map
    let located: Vec<HealthSample> = samples
        .iter()
        .filter(|s| s.validate().is_ok())
        .cloned()
        .collect();

    if located.is_empty() {
        debug!("No health samples with location and heart rate");
        return TerrainResult::empty();
    }

    debug!(samples = located.len(), "Processing located health samples");

    // Stage 2: baselines
    let baselines = BaselineEstimator::estimate(&located, config);
    debug!(groups = baselines.len(), "Calculated baseline heart rate groups");

    // Stage 3: events
    let detector = EventDetector::new(config, &baselines);
    let stress_events = detector.detect_stress(&located);
    let calming_events = detector.detect_calming(&located);
    debug!(
        stress = stress_events.len(),
        calming = calming_events.len(),
        "Detected terrain events"
    );

    // Stage 4: clusters
    let clusterer = SpatialClusterer::from_config(config);
    let result = TerrainResult {
        stress_clusters: clusterer.cluster(&stress_events, false),
        calming_clusters: clusterer.cluster(&calming_events, true),
    };

    info!(
        stress_clusters = result.stress_clusters.len(),
        calming_clusters = result.calming_clusters.len(),
        "Built stress terrain"
    );

    result
}

/// Stress terrain analyzer bound to a sample source.
///
/// Every call is independent: the analyzer holds no per-user state and never
/// caches results between invocations.
pub struct StressTerrainAnalyzer<S: SampleSource> {
    source: Arc<S>,
    config: TerrainConfig,
}

impl<S: SampleSource> Clone for StressTerrainAnalyzer<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: self.config.clone(),
        }
    }
}

impl<S: SampleSource + 'static> StressTerrainAnalyzer<S> {
    /// Create an analyzer with default settings
    pub fn new(source: Arc<S>) -> Self {
        Self::with_config(source, TerrainConfig::default())
    }

    pub fn with_config(source: Arc<S>, config: TerrainConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Terrain for the trailing `day_count` days ending now.
    ///
    /// Failures, including an invalid configuration, are logged and reported
    /// as an empty result.
    pub async fn terrain_data(&self, user_id: &str, day_count: u32) -> TerrainResult {
        self.terrain_data_at(user_id, day_count, Utc::now()).await
    }

    /// Terrain over the configured default window ending now
    pub async fn default_terrain_data(&self, user_id: &str) -> TerrainResult {
        self.terrain_data(user_id, self.config.default_day_window)
            .await
    }

    /// Terrain for the `day_count` days ending at `now`
    pub async fn terrain_data_at(
        &self,
        user_id: &str,
        day_count: u32,
        now: DateTime<Utc>,
    ) -> TerrainResult {
        match self.try_terrain_data(user_id, day_count, now).await {
            Ok(result) => result,
            Err(e) => {
                warn!(user_id, error = %e, "Error getting stress terrain data");
                TerrainResult::empty()
            }
        }
    }

    async fn try_terrain_data(
        &self,
        user_id: &str,
        day_count: u32,
        now: DateTime<Utc>,
    ) -> Result<TerrainResult, TerrainError> {
        self.config.validate()?;
        let range = TimeRange::trailing_days(now, day_count)?;
        debug!(user_id, day_count, "Fetching health data for stress analysis");
        let samples = self.source.fetch_range(user_id, range).await?;
        Ok(analyze(&samples, &self.config))
    }

    /// Stream of terrain results: one immediately, then one per source update.
    ///
    /// The background task stops when the receiver is dropped, or after the
    /// first emission when the source is not live.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn watch(&self, user_id: &str, day_count: u32) -> mpsc::Receiver<TerrainResult> {
        let (tx, rx) = mpsc::channel(4);
        let analyzer = self.clone();
        let user_id = user_id.to_string();
        let mut revisions = self.source.revisions();

        tokio::spawn(async move {
            if let Some(updates) = revisions.as_mut() {
                updates.borrow_and_update();
            }

            loop {
                let result = analyzer.terrain_data(&user_id, day_count).await;
                if tx.send(result).await.is_err() {
                    debug!(user_id = %user_id, "Terrain subscriber went away");
                    break;
                }

                let Some(updates) = revisions.as_mut() else {
                    break;
                };
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        updates.borrow_and_update();
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySampleStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 18, 0, 0).unwrap()
    }

    fn hours_ago(hours: i64) -> i64 {
        (now() - Duration::hours(hours)).timestamp_millis()
    }

    /// A commute day: calm at home, a spike downtown, a run in the park
    fn commute_samples() -> Vec<HealthSample> {
        let mut samples = Vec::new();

        // Home: low readings
        for i in 0..4 {
            samples.push(
                HealthSample::at(hours_ago(10) + i * 60_000)
                    .with_heart_rate(52.0)
                    .with_location(37.7600, -122.4400),
            );
        }

        // Downtown: mostly normal with a spike
        for i in 0..6 {
            samples.push(
                HealthSample::at(hours_ago(9) + i * 60_000)
                    .with_heart_rate(72.0)
                    .with_location(37.7749 + (i as f64) * 0.00001, -122.4194),
            );
        }
        samples.push(
            HealthSample::at(hours_ago(9) + 10 * 60_000)
                .with_heart_rate(110.0)
                .with_location(37.7750, -122.4195),
        );

        // Park run: high but vigorous
        for i in 0..3 {
            samples.push(
                HealthSample::at(hours_ago(9) + (20 + i) * 60_000)
                    .with_heart_rate(165.0)
                    .with_location(37.7694, -122.4862)
                    .with_activity("RUNNING"),
            );
        }

        // Unusable readings
        samples.push(HealthSample::at(hours_ago(9)).with_heart_rate(120.0));
        samples.push(HealthSample::at(hours_ago(9)).with_location(37.7749, -122.4194));

        samples
    }

    #[test]
    fn test_analyze_commute() {
        let result = analyze(&commute_samples(), &TerrainConfig::default());

        // REST baseline for the 08:00-12:00 bucket: (4*52 + 6*72 + 110) / 11
        let baseline: f64 = 750.0 / 11.0;

        // Only the downtown spike clears baseline + 20; the run is vigorous
        assert_eq!(result.stress_clusters.len(), 1);
        let stress = &result.stress_clusters[0];
        assert_eq!(stress.event_count, 1);
        assert!((stress.latitude - 37.7750).abs() < 1e-9);
        assert!((stress.weight - ((110.0 - baseline) / (baseline * 0.5)).min(1.0)).abs() < 1e-9);
        assert!(!stress.is_calming_zone);

        // Home averages 52, more than 15 below the shared baseline
        assert_eq!(result.calming_clusters.len(), 1);
        let calm = &result.calming_clusters[0];
        assert!(calm.is_calming_zone);
        assert!((calm.latitude - 37.7600).abs() < 1e-9);
        assert!((calm.weight - 178.0 / 750.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_calming_zone_against_shared_baseline() {
        // One shared REST baseline, dominated by the busy place
        let mut samples = Vec::new();
        for i in 0..8 {
            samples.push(
                HealthSample::at(hours_ago(2) + i * 60_000)
                    .with_heart_rate(90.0)
                    .with_location(51.5007, -0.1246),
            );
        }
        for i in 0..2 {
            samples.push(
                HealthSample::at(hours_ago(2) + (30 + i) * 60_000)
                    .with_heart_rate(50.0)
                    .with_location(51.5290, -0.1550),
            );
        }
        // baseline = (8*90 + 2*50) / 10 = 82; quiet mean 50 → drop 32
        let result = analyze(&samples, &TerrainConfig::default());

        assert_eq!(result.calming_clusters.len(), 1);
        let calm = &result.calming_clusters[0];
        assert!(calm.is_calming_zone);
        assert_eq!(calm.event_count, 1);
        assert!((calm.weight - 32.0 / 82.0).abs() < 1e-9);
        assert!(result.stress_clusters.is_empty());
    }

    #[test]
    fn test_analyze_empty_inputs() {
        let config = TerrainConfig::default();
        assert_eq!(analyze(&[], &config), TerrainResult::empty());

        let unplaceable = vec![
            HealthSample::at(hours_ago(1)).with_heart_rate(130.0),
            HealthSample::at(hours_ago(1)).with_location(1.0, 1.0),
            HealthSample::at(hours_ago(1))
                .with_heart_rate(0.0)
                .with_location(1.0, 1.0),
        ];
        assert!(analyze(&unplaceable, &config).is_empty());
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let samples: Vec<HealthSample> = (0..200)
            .map(|i| {
                HealthSample::at(hours_ago(i % 72))
                    .with_heart_rate(45.0 + ((i * 37) % 90) as f64)
                    .with_location(
                        48.85 + ((i * 13) % 17) as f64 * 0.003,
                        2.35 + ((i * 7) % 11) as f64 * 0.004,
                    )
                    .with_activity(if i % 5 == 0 { "WALKING" } else { "REST" })
            })
            .collect();
        let config = TerrainConfig::default();

        let first = analyze(&samples, &config);
        let second = analyze(&samples, &config);
        assert_eq!(first, second);

        for cluster in first.stress_clusters.iter().chain(first.calming_clusters.iter()) {
            assert!((0.0..=1.0).contains(&cluster.weight));
        }
        for pair in first.stress_clusters.windows(2) {
            assert!(pair[0].event_count >= pair[1].event_count);
        }
    }

    #[test]
    fn test_analyze_skips_what_validation_rejects() {
        let t = hours_ago(3);
        let mut samples: Vec<HealthSample> = (0..4)
            .map(|_| HealthSample::at(t).with_heart_rate(60.0).with_location(10.0, 10.0))
            .collect();
        samples.push(HealthSample::at(t).with_heart_rate(140.0).with_location(91.0, 10.0));
        samples.push(HealthSample::at(t).with_heart_rate(140.0).with_location(10.0, 181.0));

        let issues = crate::ingest::SampleReader::validate_samples(&samples);
        assert_eq!(issues.len(), 2);

        let config = TerrainConfig::default();
        let result = analyze(&samples, &config);
        assert!(result.stress_clusters.is_empty());
        assert_eq!(result, analyze(&samples[..4], &config));
    }

    #[test]
    fn test_analyze_with_unchecked_offset_uses_utc() {
        let samples = commute_samples();
        let config = TerrainConfig {
            utc_offset_minutes: 40_000_000,
            ..Default::default()
        };
        assert_eq!(
            analyze(&samples, &config),
            analyze(&samples, &TerrainConfig::default())
        );
    }

    #[tokio::test]
    async fn test_invalid_config_yields_empty_result() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert("alice", commute_samples()).await;
        let config = TerrainConfig {
            utc_offset_minutes: i32::MIN,
            ..Default::default()
        };
        let analyzer = StressTerrainAnalyzer::with_config(store, config);

        assert!(analyzer.terrain_data_at("alice", 30, now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_default_window_is_thirty_days() {
        let store = Arc::new(InMemorySampleStore::new());
        let day_ms = Duration::days(1).num_milliseconds();
        let now_ms = Utc::now().timestamp_millis();

        for (days_ago, lat) in [(29, 35.6762), (31, 34.6937)] {
            let t = now_ms - days_ago * day_ms;
            let samples: Vec<HealthSample> = (0..5)
                .map(|i| {
                    HealthSample::at(t)
                        .with_heart_rate(if i == 0 { 140.0 } else { 70.0 })
                        .with_location(lat, 139.6503)
                })
                .collect();
            store.insert("alice", samples).await;
        }

        let analyzer = StressTerrainAnalyzer::new(store);
        assert_eq!(analyzer.config().default_day_window, 30);

        let result = analyzer.default_terrain_data("alice").await;
        assert_eq!(result.stress_clusters.len(), 1);
        assert!((result.stress_clusters[0].latitude - 35.6762).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_watch_task_ends_when_receiver_dropped() {
        let store = Arc::new(InMemorySampleStore::new());
        let analyzer = StressTerrainAnalyzer::new(Arc::clone(&store));
        let mut rx = analyzer.watch("alice", 30);
        assert!(rx.recv().await.is_some());

        drop(rx);
        drop(analyzer);

        let released = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while Arc::strong_count(&store) > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(released.is_ok());
    }

    struct FailingSource;

    #[async_trait]
    impl SampleSource for FailingSource {
        async fn fetch_range(
            &self,
            _user_id: &str,
            _range: TimeRange,
        ) -> Result<Vec<HealthSample>, TerrainError> {
            Err(TerrainError::SourceUnavailable("database closed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_empty_result() {
        let analyzer = StressTerrainAnalyzer::new(Arc::new(FailingSource));
        let result = analyzer.terrain_data_at("alice", 30, now()).await;
        assert_eq!(result, TerrainResult::empty());
    }

    #[tokio::test]
    async fn test_invalid_window_yields_empty_result() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert("alice", commute_samples()).await;
        let analyzer = StressTerrainAnalyzer::new(store);

        assert!(analyzer.terrain_data_at("alice", 0, now()).await.is_empty());
        assert!(!analyzer.terrain_data_at("alice", 30, now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_window_excludes_old_samples() {
        let store = Arc::new(InMemorySampleStore::new());
        let old: Vec<HealthSample> = commute_samples()
            .into_iter()
            .map(|mut s| {
                s.timestamp -= Duration::days(45).num_milliseconds();
                s
            })
            .collect();
        store.insert("alice", old).await;
        let analyzer = StressTerrainAnalyzer::new(store);

        assert!(analyzer.terrain_data_at("alice", 30, now()).await.is_empty());
        assert!(!analyzer.terrain_data_at("alice", 60, now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_watch_emits_on_every_update() {
        let store = Arc::new(InMemorySampleStore::new());
        let analyzer = StressTerrainAnalyzer::new(Arc::clone(&store));
        let mut rx = analyzer.watch("alice", 30);

        let initial = rx.recv().await.unwrap();
        assert!(initial.is_empty());

        let recent_ms = Utc::now().timestamp_millis() - 60_000;
        let recent: Vec<HealthSample> = (0..5)
            .map(|i| {
                HealthSample::at(recent_ms)
                    .with_heart_rate(if i == 0 { 140.0 } else { 70.0 })
                    .with_location(35.6762, 139.6503)
            })
            .collect();
        store.insert("alice", recent).await;

        let updated = rx.recv().await.unwrap();
        assert!(!updated.stress_clusters.is_empty());
    }

    #[tokio::test]
    async fn test_watch_single_shot_for_static_source() {
        let analyzer = StressTerrainAnalyzer::new(Arc::new(FailingSource));
        let mut rx = analyzer.watch("alice", 30);

        assert_eq!(rx.recv().await, Some(TerrainResult::empty()));
        assert_eq!(rx.recv().await, None);
    }
}
