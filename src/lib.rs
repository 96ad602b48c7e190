//! VitalMind Terrain - stress terrain analytics for wearable health data
//!
//! Terrain turns located heart-rate samples into map-ready stress and calming
//! zones through a deterministic pipeline: baseline estimation → event
//! detection → spatial clustering.
//!
//! ## Modules
//!
//! - **Pipeline**: pure `analyze` plus an async analyzer bound to a sample source
//! - **Overlay**: heatmap points, markers and JSON reports for map layers

pub mod baseline;
pub mod cluster;
pub mod config;
pub mod detector;
pub mod error;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod source;
pub mod types;

pub use config::TerrainConfig;
pub use error::TerrainError;
pub use pipeline::{analyze, StressTerrainAnalyzer};
pub use source::{InMemorySampleStore, SampleSource, TimeRange};
pub use types::{HealthSample, StressCluster, StressEvent, TerrainResult};

/// Terrain version embedded in all reports
pub const TERRAIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "vitalmind-terrain";
