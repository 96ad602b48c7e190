//! Spatial clustering
//!
//! Events are bucketed into a fixed grid (500 m cells by default, using a flat
//! meters-per-degree conversion) and each occupied cell becomes one cluster.

use crate::baseline::mean;
use crate::config::TerrainConfig;
use crate::types::{StressCluster, StressEvent};
use std::collections::BTreeMap;

/// Integer grid cell indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub row: i64,
    pub col: i64,
}

impl GridCell {
    /// Cell containing the point, `floor(coord / cell_size)` on each axis
    pub fn containing(latitude: f64, longitude: f64, cell_size: f64) -> Self {
        Self {
            row: (latitude / cell_size).floor() as i64,
            col: (longitude / cell_size).floor() as i64,
        }
    }

    /// South-west corner of the cell in degrees
    pub fn origin(&self, cell_size: f64) -> (f64, f64) {
        (self.row as f64 * cell_size, self.col as f64 * cell_size)
    }
}

/// Grid-based clusterer
pub struct SpatialClusterer {
    cell_size: f64,
}

impl Default for SpatialClusterer {
    fn default() -> Self {
        Self::from_config(&TerrainConfig::default())
    }
}

impl SpatialClusterer {
    pub fn from_config(config: &TerrainConfig) -> Self {
        Self {
            cell_size: config.cell_size_degrees(),
        }
    }

    /// Cell size in degrees
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Group events by grid cell and aggregate each cell.
    ///
    /// Every returned cluster carries `is_calming` as its zone flag. Output is
    /// ordered by descending event count; equal counts keep grid order.
    pub fn cluster(&self, events: &[StressEvent], is_calming: bool) -> Vec<StressCluster> {
        if events.is_empty() {
            return Vec::new();
        }

        let mut cells: BTreeMap<GridCell, Vec<&StressEvent>> = BTreeMap::new();
        for event in events {
            cells
                .entry(GridCell::containing(event.latitude, event.longitude, self.cell_size))
                .or_default()
                .push(event);
        }

        let mut clusters: Vec<StressCluster> = cells
            .values()
            .filter_map(|members| aggregate(members, is_calming))
            .collect();

        // stable: ties stay in grid order
        clusters.sort_by(|a, b| b.event_count.cmp(&a.event_count));
        clusters
    }
}

fn aggregate(members: &[&StressEvent], is_calming: bool) -> Option<StressCluster> {
    let latitudes: Vec<f64> = members.iter().map(|e| e.latitude).collect();
    let longitudes: Vec<f64> = members.iter().map(|e| e.longitude).collect();
    let intensities: Vec<f64> = members.iter().map(|e| e.intensity).collect();

    Some(StressCluster {
        latitude: mean(&latitudes)?,
        longitude: mean(&longitudes)?,
        weight: mean(&intensities)?.clamp(0.0, 1.0),
        event_count: members.len(),
        is_calming_zone: is_calming,
    })
}
