//! Health sample ingestion
//!
//! Parses samples from JSON arrays or NDJSON and reports samples that the
//! pipeline would silently skip.

use crate::error::TerrainError;
use crate::types::HealthSample;
use thiserror::Error;

/// Why a sample cannot contribute to the terrain
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleValidationError {
    #[error("Timestamp {0} is out of range")]
    TimestampOutOfRange(i64),

    #[error("Missing heart rate")]
    MissingHeartRate,

    #[error("Heart rate must be positive, got {0}")]
    NonPositiveHeartRate(f64),

    #[error("Missing latitude or longitude")]
    MissingLocation,

    #[error("Latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

impl HealthSample {
    /// Check that the sample has everything the pipeline needs
    pub fn validate(&self) -> Result<(), SampleValidationError> {
        if self.observed_at().is_none() {
            return Err(SampleValidationError::TimestampOutOfRange(self.timestamp));
        }

        match self.heart_rate {
            None => return Err(SampleValidationError::MissingHeartRate),
            Some(hr) if hr.is_nan() || hr <= 0.0 => {
                return Err(SampleValidationError::NonPositiveHeartRate(hr));
            }
            Some(_) => {}
        }

        let (lat, lng) = self
            .location()
            .ok_or(SampleValidationError::MissingLocation)?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(SampleValidationError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(SampleValidationError::LongitudeOutOfRange(lng));
        }

        Ok(())
    }
}

/// Validation outcome for one rejected sample
#[derive(Debug, Clone)]
pub struct SampleIssue {
    pub index: usize,
    pub timestamp: i64,
    pub error: SampleValidationError,
}

/// Reader for sample files
pub struct SampleReader;

impl SampleReader {
    /// Parse a JSON array of samples
    pub fn parse_array(json: &str) -> Result<Vec<HealthSample>, TerrainError> {
        let samples: Vec<HealthSample> = serde_json::from_str(json)?;
        Ok(samples)
    }

    /// Parse NDJSON (one sample per line, blank lines ignored)
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<HealthSample>, TerrainError> {
        let mut samples = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<HealthSample>(trimmed) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    return Err(TerrainError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(samples)
    }

    /// Every sample that would be skipped, with the reason
    pub fn validate_samples(samples: &[HealthSample]) -> Vec<SampleIssue> {
        samples
            .iter()
            .enumerate()
            .filter_map(|(index, sample)| {
                sample.validate().err().map(|error| SampleIssue {
                    index,
                    timestamp: sample.timestamp,
                    error,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"{"timestamp":1716228000000,"heart_rate":72.0,"latitude":37.77,"longitude":-122.41}

{"timestamp":1716228060000,"heartRate":95.5,"latitude":37.77,"longitude":-122.41,"activityType":"WALKING"}"#;

        let samples = SampleReader::parse_ndjson(ndjson).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].heart_rate, Some(95.5));
        assert_eq!(samples[1].activity(), "WALKING");
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"timestamp\":1}\n{not json}\n";
        let err = SampleReader::parse_ndjson(ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let json = r#"[{"timestamp":1},{"timestamp":2,"heart_rate":60}]"#;
        let samples = SampleReader::parse_array(json).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].heart_rate, None);
        assert!(SampleReader::parse_array("{}").is_err());
    }

    #[test]
    fn test_validate_samples() {
        let good = HealthSample::at(1_716_228_000_000)
            .with_heart_rate(70.0)
            .with_location(10.0, 20.0);
        let samples = vec![
            good.clone(),
            HealthSample::at(1_716_228_000_000).with_location(10.0, 20.0),
            HealthSample {
                heart_rate: Some(0.0),
                ..good.clone()
            },
            HealthSample {
                longitude: None,
                ..good.clone()
            },
            HealthSample {
                latitude: Some(91.0),
                ..good.clone()
            },
            HealthSample {
                timestamp: i64::MAX,
                ..good.clone()
            },
        ];

        let issues = SampleReader::validate_samples(&samples);
        let errors: Vec<SampleValidationError> = issues.iter().map(|i| i.error.clone()).collect();
        assert_eq!(
            errors,
            vec![
                SampleValidationError::MissingHeartRate,
                SampleValidationError::NonPositiveHeartRate(0.0),
                SampleValidationError::MissingLocation,
                SampleValidationError::LatitudeOutOfRange(91.0),
                SampleValidationError::TimestampOutOfRange(i64::MAX),
            ]
        );
        assert_eq!(issues[0].index, 1);
    }
}
