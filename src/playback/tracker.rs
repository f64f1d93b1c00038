// OnePace Mobile - Episode Browser and Offline Player
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Watch progress per episode
//!
//! Progress is stored as a percentage of the episode's duration under
//! `progress_{episode_id}`. Two value shapes are accepted:
//!
//! ```text
//! 42.5                                   partially watched
//! {"progress": 100, "isFinished": true}  marked as finished
//! ```
//!
//! Older builds stored the raw position in milliseconds under
//! `video_position_{episode_id}`; those records are folded into the
//! percentage form the first time the duration is known.

use crate::error::{PaceError, Result};
use crate::file::validate_episode_id;
use crate::storage::{keys, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredProgress {
    Percentage(f64),
    Record {
        progress: f64,
        #[serde(default, rename = "isFinished")]
        is_finished: bool,
    },
}

/// How the episode list shows an episode's progress
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", content = "percentage", rename_all = "camelCase")]
pub enum ProgressDisplay {
    NotStarted,
    Partial(f64),
    Finished,
}

/// Decoded progress record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub episode_id: String,
    /// 0–100, 100 when finished
    pub percentage: f64,
    pub is_finished: bool,
}

impl ProgressRecord {
    fn empty(episode_id: &str) -> Self {
        Self {
            episode_id: episode_id.to_string(),
            percentage: 0.0,
            is_finished: false,
        }
    }

    fn parse(episode_id: &str, raw: &str) -> Self {
        match serde_json::from_str::<StoredProgress>(raw) {
            Ok(StoredProgress::Percentage(p)) if p.is_finite() => Self {
                episode_id: episode_id.to_string(),
                percentage: p.clamp(0.0, 100.0),
                is_finished: false,
            },
            Ok(StoredProgress::Record { is_finished: true, .. }) => Self {
                episode_id: episode_id.to_string(),
                percentage: 100.0,
                is_finished: true,
            },
            Ok(StoredProgress::Record { progress, .. }) if progress.is_finite() => Self {
                episode_id: episode_id.to_string(),
                percentage: progress.clamp(0.0, 100.0),
                is_finished: false,
            },
            _ => {
                warn!(episode_id, raw, "Ignoring malformed progress record");
                Self::empty(episode_id)
            }
        }
    }

    pub fn display(&self) -> ProgressDisplay {
        if self.is_finished {
            ProgressDisplay::Finished
        } else if self.percentage > 0.0 {
            ProgressDisplay::Partial(self.percentage)
        } else {
            ProgressDisplay::NotStarted
        }
    }

    /// 0–1 for progress bars
    pub fn fraction(&self) -> f64 {
        self.percentage / 100.0
    }
}

/// Reads and writes playback progress records
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    store: KeyValueStore,
}

impl ProgressTracker {
    pub fn new(store: KeyValueStore) -> Self {
        Self { store }
    }

    /// Stored percentage, 0 when absent or malformed, 100 when finished
    pub async fn get_progress(&self, episode_id: &str) -> Result<f64> {
        Ok(self.record(episode_id).await?.percentage)
    }

    /// Overwrite the stored percentage, clamped to [0, 100]
    pub async fn set_progress(&self, episode_id: &str, percentage: f64) -> Result<()> {
        validate_episode_id(episode_id)?;
        if !percentage.is_finite() {
            return Err(PaceError::invalid_input(format!(
                "Progress must be a finite number, got {}",
                percentage
            )));
        }

        let percentage = percentage.clamp(0.0, 100.0);
        self.store
            .set_json(&keys::progress(episode_id), &percentage)
            .await
    }

    /// Remove the record, returns whether there was one
    pub async fn clear(&self, episode_id: &str) -> Result<bool> {
        validate_episode_id(episode_id)?;
        self.store.remove(&keys::progress(episode_id)).await
    }

    pub async fn mark_finished(&self, episode_id: &str) -> Result<()> {
        validate_episode_id(episode_id)?;
        self.store
            .set_json(
                &keys::progress(episode_id),
                &json!({ "progress": 100, "isFinished": true }),
            )
            .await
    }

    /// Decoded record for one episode
    pub async fn record(&self, episode_id: &str) -> Result<ProgressRecord> {
        validate_episode_id(episode_id)?;

        let raw = match self.store.get(&keys::progress(episode_id)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(episode_id, "Failed to read progress, assuming none: {}", e);
                None
            }
        };

        Ok(match raw {
            Some(raw) => ProgressRecord::parse(episode_id, &raw),
            None => ProgressRecord::empty(episode_id),
        })
    }

    /// Every stored progress record, sorted by episode id
    pub async fn load_all(&self) -> Result<Vec<ProgressRecord>> {
        let entries = self.store.entries_with_prefix(keys::PROGRESS_PREFIX).await?;

        Ok(entries
            .into_iter()
            .filter_map(|(key, raw)| {
                let episode_id = key.strip_prefix(keys::PROGRESS_PREFIX)?;
                Some(ProgressRecord::parse(episode_id, &raw))
            })
            .collect())
    }

    /// Fold a legacy millisecond position into the percentage record
    ///
    /// Needs the duration, so it runs once the player knows it. An existing
    /// percentage record wins over the legacy one. The legacy key is removed
    /// either way; returns the percentage that was written, if any.
    pub async fn migrate_legacy_position(
        &self,
        episode_id: &str,
        duration_ms: u64,
    ) -> Result<Option<f64>> {
        validate_episode_id(episode_id)?;
        if duration_ms == 0 {
            return Ok(None);
        }

        let legacy_key = keys::legacy_position(episode_id);
        let raw = match self.store.get(&legacy_key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let written = match raw.trim().parse::<f64>() {
            Ok(position_ms) if position_ms.is_finite() && position_ms > 0.0 => {
                let has_record = self.store.get(&keys::progress(episode_id)).await?.is_some();
                if has_record {
                    None
                } else {
                    let percentage = percentage_of(position_ms as u64, duration_ms).unwrap_or(0.0);
                    self.set_progress(episode_id, percentage).await?;
                    Some(percentage)
                }
            }
            _ => None,
        };

        self.store.remove(&legacy_key).await?;
        debug!(episode_id, ?written, "Migrated legacy playback position");
        Ok(written)
    }

    /// Playback offset for a stored percentage
    ///
    /// `None` when the duration is unknown.
    pub fn to_seek_offset(percentage: f64, total_ms: u64) -> Option<u64> {
        if total_ms == 0 || !percentage.is_finite() {
            return None;
        }
        let fraction = percentage.clamp(0.0, 100.0) / 100.0;
        Some((fraction * total_ms as f64).round() as u64)
    }
}

/// Percentage of `duration_ms` covered by `position_ms`, clamped to [0, 100]
pub fn percentage_of(position_ms: u64, duration_ms: u64) -> Option<f64> {
    if duration_ms == 0 {
        return None;
    }
    Some((position_ms as f64 / duration_ms as f64 * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn tracker() -> (ProgressTracker, KeyValueStore) {
        let db = Database::new_in_memory().await.unwrap();
        let kv = KeyValueStore::new(db.pool().clone());
        (ProgressTracker::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (tracker, _) = tracker().await;

        tracker.set_progress("E7", 42.5).await.unwrap();
        assert_eq!(tracker.get_progress("E7").await.unwrap(), 42.5);

        tracker.set_progress("E7", 140.0).await.unwrap();
        assert_eq!(tracker.get_progress("E7").await.unwrap(), 100.0);

        assert!(tracker.set_progress("E7", f64::NAN).await.is_err());
    }

    #[tokio::test]
    async fn test_absent_and_malformed_are_zero() {
        let (tracker, kv) = tracker().await;
        assert_eq!(tracker.get_progress("E1").await.unwrap(), 0.0);

        kv.set(&keys::progress("E1"), "\"halfway\"").await.unwrap();
        assert_eq!(tracker.get_progress("E1").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_finished_record() {
        let (tracker, kv) = tracker().await;
        tracker.mark_finished("E2").await.unwrap();

        let record = tracker.record("E2").await.unwrap();
        assert_eq!(record.percentage, 100.0);
        assert_eq!(record.display(), ProgressDisplay::Finished);

        let raw = kv.get(&keys::progress("E2")).await.unwrap().unwrap();
        assert_eq!(raw, r#"{"progress":100,"isFinished":true}"#);

        assert!(tracker.clear("E2").await.unwrap());
        assert_eq!(
            tracker.record("E2").await.unwrap().display(),
            ProgressDisplay::NotStarted
        );
    }

    #[tokio::test]
    async fn test_load_all() {
        let (tracker, kv) = tracker().await;
        tracker.set_progress("A", 10.0).await.unwrap();
        tracker.mark_finished("B").await.unwrap();
        kv.set(keys::DOWNLOADED_EPISODES, "[]").await.unwrap();

        let all = tracker.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].display(), ProgressDisplay::Partial(10.0));
        assert!(all[1].is_finished);
    }

    #[tokio::test]
    async fn test_legacy_position_migrates_once() {
        let (tracker, kv) = tracker().await;
        kv.set(&keys::legacy_position("E3"), "30000").await.unwrap();

        assert_eq!(tracker.migrate_legacy_position("E3", 0).await.unwrap(), None);
        assert_eq!(
            tracker.migrate_legacy_position("E3", 120_000).await.unwrap(),
            Some(25.0)
        );
        assert_eq!(tracker.get_progress("E3").await.unwrap(), 25.0);
        assert_eq!(kv.get(&keys::legacy_position("E3")).await.unwrap(), None);

        assert_eq!(tracker.migrate_legacy_position("E3", 120_000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_legacy_position_does_not_override() {
        let (tracker, kv) = tracker().await;
        tracker.set_progress("E4", 80.0).await.unwrap();
        kv.set(&keys::legacy_position("E4"), "1000").await.unwrap();

        assert_eq!(tracker.migrate_legacy_position("E4", 10_000).await.unwrap(), None);
        assert_eq!(tracker.get_progress("E4").await.unwrap(), 80.0);
        assert_eq!(kv.get(&keys::legacy_position("E4")).await.unwrap(), None);
    }

    #[test]
    fn test_seek_offset() {
        assert_eq!(ProgressTracker::to_seek_offset(25.0, 200_000), Some(50_000));
        assert_eq!(ProgressTracker::to_seek_offset(25.0, 0), None);
        assert_eq!(ProgressTracker::to_seek_offset(0.0, 200_000), Some(0));
        assert_eq!(percentage_of(50, 200), Some(25.0));
        assert_eq!(percentage_of(50, 0), None);
    }
}
