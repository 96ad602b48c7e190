//! Sample sources
//!
//! The pipeline never performs I/O itself; it asks a [`SampleSource`] for the
//! readings in a time range. Sources that can change over time expose a
//! revision channel so that streaming consumers can recompute on every update.

use crate::error::TerrainError;
use crate::types::HealthSample;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::{watch, RwLock};

/// Inclusive time range in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    /// The `days` days ending at `now`
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Result<Self, TerrainError> {
        if days == 0 {
            return Err(TerrainError::InvalidWindow(
                "day count must be at least 1".to_string(),
            ));
        }
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| TerrainError::InvalidWindow(format!("{days} days before {now}")))?;
        Ok(Self {
            start_ms: start.timestamp_millis(),
            end_ms: now.timestamp_millis(),
        })
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        (self.start_ms..=self.end_ms).contains(&timestamp_ms)
    }
}

/// Data-access collaborator that supplies health samples
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Samples for `user_id` within `range`, in time order
    async fn fetch_range(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<Vec<HealthSample>, TerrainError>;

    /// Revision counter bumped on every change, if the source is live
    fn revisions(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// In-memory sample store, per user, publishing a revision on each write
pub struct InMemorySampleStore {
    samples: RwLock<HashMap<String, Vec<HealthSample>>>,
    revision: watch::Sender<u64>,
}

impl Default for InMemorySampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            samples: RwLock::new(HashMap::new()),
            revision,
        }
    }

    /// Append samples for a user, keeping the user's list in time order
    pub async fn insert(&self, user_id: &str, samples: impl IntoIterator<Item = HealthSample>) {
        {
            let mut guard = self.samples.write().await;
            let list = guard.entry(user_id.to_string()).or_default();
            list.extend(samples);
            list.sort_by_key(|s| s.timestamp);
        }
        self.bump();
    }

    /// Replace all samples for a user
    pub async fn replace(&self, user_id: &str, mut samples: Vec<HealthSample>) {
        samples.sort_by_key(|s| s.timestamp);
        self.samples
            .write()
            .await
            .insert(user_id.to_string(), samples);
        self.bump();
    }

    /// Total number of stored samples for a user
    pub async fn len(&self, user_id: &str) -> usize {
        self.samples
            .read()
            .await
            .get(user_id)
            .map_or(0, |list| list.len())
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

#[async_trait]
impl SampleSource for InMemorySampleStore {
    async fn fetch_range(
        &self,
        user_id: &str,
        range: TimeRange,
    ) -> Result<Vec<HealthSample>, TerrainError> {
        let guard = self.samples.read().await;
        Ok(guard
            .get(user_id)
            .map(|list| {
                list.iter()
                    .filter(|s| range.contains(s.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn revisions(&self) -> Option<watch::Receiver<u64>> {
        Some(self.revision.subscribe())
    }
}
