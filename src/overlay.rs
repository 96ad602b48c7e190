//! Map overlay output
//!
//! Converts clusters into what a map layer draws: heatmap points, labelled
//! markers, and a serializable report envelope.

use crate::error::TerrainError;
use crate::types::{StressCluster, TerrainResult};
use crate::{PRODUCER_NAME, TERRAIN_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weighted point for a heatmap layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub weight: f64,
}

/// Heatmap points at cluster centroids, weighted by cluster weight
pub fn heatmap_points(clusters: &[StressCluster]) -> Vec<HeatmapPoint> {
    clusters
        .iter()
        .map(|c| HeatmapPoint {
            latitude: c.latitude,
            longitude: c.longitude,
            weight: c.weight,
        })
        .collect()
}

/// Labelled marker for a single cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMarker {
    pub latitude: f64,
    pub longitude: f64,
    /// Cluster weight as a whole percentage, 0-100
    pub intensity_pct: u8,
    pub label: String,
    pub is_calming_zone: bool,
}

impl ClusterMarker {
    pub fn from_cluster(cluster: &StressCluster) -> Self {
        let noun = match (cluster.is_calming_zone, cluster.event_count) {
            (false, 1) => "stress event",
            (false, _) => "stress events",
            (true, 1) => "calming reading",
            (true, _) => "calming readings",
        };
        Self {
            latitude: cluster.latitude,
            longitude: cluster.longitude,
            intensity_pct: (cluster.weight.clamp(0.0, 1.0) * 100.0).round() as u8,
            label: format!("{} {}", cluster.event_count, noun),
            is_calming_zone: cluster.is_calming_zone,
        }
    }
}

/// Totals across one cluster list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub clusters: usize,
    pub events: usize,
    /// Event-weighted mean cluster weight, absent when there are no clusters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_weight: Option<f64>,
}

impl ZoneSummary {
    pub fn of(clusters: &[StressCluster]) -> Self {
        let events: usize = clusters.iter().map(|c| c.event_count).sum();
        let mean_weight = (events > 0).then(|| {
            clusters
                .iter()
                .map(|c| c.weight * c.event_count as f64)
                .sum::<f64>()
                / events as f64
        });
        Self {
            clusters: clusters.len(),
            events,
            mean_weight,
        }
    }
}

/// Producer metadata stamped on every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
}

/// Complete terrain report for one user and window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainReport {
    pub report_id: String,
    pub producer: ReportProducer,
    pub user_id: String,
    pub window_days: u32,
    /// RFC 3339 timestamp in UTC
    pub computed_at: String,
    pub stress: ZoneSummary,
    pub calming: ZoneSummary,
    pub stress_clusters: Vec<StressCluster>,
    pub calming_clusters: Vec<StressCluster>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<ClusterMarker>,
}

impl TerrainReport {
    /// Wrap a pipeline result, computed now
    pub fn new(user_id: &str, window_days: u32, result: TerrainResult) -> Self {
        Self::new_at(user_id, window_days, result, Utc::now())
    }

    pub fn new_at(
        user_id: &str,
        window_days: u32,
        result: TerrainResult,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let (stress_clusters, calming_clusters) = result.into_pair();
        Self {
            report_id: Uuid::new_v4().to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: TERRAIN_VERSION.to_string(),
            },
            user_id: user_id.to_string(),
            window_days,
            computed_at: computed_at.to_rfc3339(),
            stress: ZoneSummary::of(&stress_clusters),
            calming: ZoneSummary::of(&calming_clusters),
            stress_clusters,
            calming_clusters,
            markers: Vec::new(),
        }
    }

    /// Attach markers for every stress and calming cluster
    pub fn with_markers(mut self) -> Self {
        self.markers = self
            .stress_clusters
            .iter()
            .chain(self.calming_clusters.iter())
            .map(ClusterMarker::from_cluster)
            .collect();
        self
    }

    pub fn to_json(&self) -> Result<String, TerrainError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, TerrainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One compact JSON line per cluster, stress clusters first
    pub fn to_ndjson(&self) -> Result<String, TerrainError> {
        let lines = self
            .stress_clusters
            .iter()
            .chain(self.calming_clusters.iter())
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines.join("\n"))
    }
}
