//! Analysis configuration
//!
//! Thresholds and grid sizes used by every pipeline stage. Defaults reproduce
//! the rule set the mobile app shipped with; a JSON file can override them.

use crate::error::TerrainError;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default trailing window in days
pub const DEFAULT_DAY_WINDOW: u32 = 30;

/// Baseline assumed when no group matches a sample
pub const DEFAULT_BASELINE_BPM: f64 = 70.0;

const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Tunable parameters for terrain analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Heart rate above baseline (bpm) that flags a stress event
    pub stress_threshold_bpm: f64,
    /// Mean heart rate below baseline (bpm) that marks a calming zone
    pub calming_threshold_bpm: f64,
    /// Baseline used when the (activity, bucket) group is missing
    pub default_baseline_bpm: f64,
    /// Fraction of baseline that maps to full stress intensity
    pub stress_intensity_scale: f64,
    /// Side length of a clustering cell (meters)
    pub grid_cell_meters: f64,
    /// Equirectangular meters-per-degree approximation
    pub meters_per_degree: f64,
    /// Decimal places kept when grouping samples for calming detection
    pub calming_location_decimals: u32,
    /// Trailing window used when the caller does not pass one
    pub default_day_window: u32,
    /// Offset of the user's local clock from UTC (minutes).
    ///
    /// The offset is fixed for the whole window: a window that crosses a
    /// daylight-saving change buckets the hours on the other side of the
    /// change one hour off. Defaults to UTC.
    pub utc_offset_minutes: i32,
    /// Activity label fragments excluded from stress detection
    pub vigorous_activities: Vec<String>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            stress_threshold_bpm: 20.0,
            calming_threshold_bpm: 15.0,
            default_baseline_bpm: DEFAULT_BASELINE_BPM,
            stress_intensity_scale: 0.5,
            grid_cell_meters: 500.0,
            meters_per_degree: 111_000.0,
            calming_location_decimals: 2,
            default_day_window: DEFAULT_DAY_WINDOW,
            utc_offset_minutes: 0,
            vigorous_activities: ["RUNNING", "CYCLING", "SPORTS", "HIKING", "WORKOUT", "EXERCISE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TerrainConfig {
    /// Clustering cell size in degrees
    pub fn cell_size_degrees(&self) -> f64 {
        self.grid_cell_meters / self.meters_per_degree
    }

    /// Local clock used for time-of-day buckets
    pub fn local_offset(&self) -> FixedOffset {
        // validate() bounds the offset; fall back to UTC for unchecked configs
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Check that every parameter is usable
    pub fn validate(&self) -> Result<(), TerrainError> {
        let positive = [
            ("stress_threshold_bpm", self.stress_threshold_bpm),
            ("calming_threshold_bpm", self.calming_threshold_bpm),
            ("default_baseline_bpm", self.default_baseline_bpm),
            ("stress_intensity_scale", self.stress_intensity_scale),
            ("grid_cell_meters", self.grid_cell_meters),
            ("meters_per_degree", self.meters_per_degree),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TerrainError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.utc_offset_minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
            return Err(TerrainError::InvalidConfig(format!(
                "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {}",
                self.utc_offset_minutes
            )));
        }

        if self.default_day_window == 0 {
            return Err(TerrainError::InvalidConfig(
                "default_day_window must be at least 1".to_string(),
            ));
        }

        if self.calming_location_decimals > 6 {
            return Err(TerrainError::InvalidConfig(format!(
                "calming_location_decimals must be at most 6, got {}",
                self.calming_location_decimals
            )));
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, TerrainError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, TerrainError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a file, or use defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, TerrainError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }
}
