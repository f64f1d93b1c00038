//! The downloaded set
//!
//! Ids of episodes whose files are complete, persisted as a JSON array under
//! [`keys::DOWNLOADED_EPISODES`]. Every change is a read-modify-write against
//! the store so the stored array stays the source of truth across restarts.

use crate::error::Result;
use crate::file::EpisodeFiles;
use crate::storage::{keys, KeyValueStore};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Difference between the stored set and the files on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// Files present on disk that were missing from the set
    pub added: Vec<String>,
    /// Ids in the set whose file is gone
    pub removed: Vec<String>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Persistent set of downloaded episode ids
#[derive(Debug, Clone)]
pub struct DownloadedSet {
    store: KeyValueStore,
}

impl DownloadedSet {
    pub fn new(store: KeyValueStore) -> Self {
        Self { store }
    }

    /// Stored ids in stored order
    ///
    /// A missing or unreadable value is an empty set.
    pub async fn load(&self) -> Vec<String> {
        match self
            .store
            .get_json::<Vec<String>>(keys::DOWNLOADED_EPISODES)
            .await
        {
            Ok(ids) => ids.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read downloaded episodes, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Membership check, reads the store on every call
    pub async fn contains(&self, episode_id: &str) -> bool {
        self.load().await.iter().any(|id| id == episode_id)
    }

    /// Add an id, returns whether it was new
    pub async fn add(&self, episode_id: &str) -> Result<bool> {
        let mut ids = self.load().await;
        if ids.iter().any(|id| id == episode_id) {
            return Ok(false);
        }

        ids.push(episode_id.to_string());
        self.store.set_json(keys::DOWNLOADED_EPISODES, &ids).await?;
        Ok(true)
    }

    /// Remove an id, returns whether it was present
    pub async fn remove(&self, episode_id: &str) -> Result<bool> {
        let mut ids = self.load().await;
        let before = ids.len();
        ids.retain(|id| id != episode_id);

        if ids.len() == before {
            return Ok(false);
        }

        self.store.set_json(keys::DOWNLOADED_EPISODES, &ids).await?;
        Ok(true)
    }

    /// Sorted, de-duplicated view
    pub async fn snapshot(&self) -> BTreeSet<String> {
        self.load().await.into_iter().collect()
    }

    /// Make the set agree with the download directory
    ///
    /// Complete files missing from the set are added. Ids whose file is gone
    /// are dropped. Unfinished `.part` files never count as downloaded.
    pub async fn reconcile(&self, files: &EpisodeFiles) -> Result<DriftReport> {
        let stored = self.load().await;
        let on_disk: BTreeSet<String> = files
            .list_downloaded()
            .await?
            .into_iter()
            .filter(|f| f.size_bytes > 0)
            .map(|f| f.episode_id)
            .collect();

        let mut report = DriftReport::default();
        let mut kept: Vec<String> = Vec::with_capacity(stored.len());

        for id in stored {
            if kept.contains(&id) {
                continue;
            }
            if on_disk.contains(&id) {
                kept.push(id);
            } else {
                report.removed.push(id);
            }
        }

        for id in on_disk {
            if !kept.contains(&id) {
                report.added.push(id.clone());
                kept.push(id);
            }
        }

        if !report.is_empty() {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                "Reconciled downloaded episodes with disk"
            );
            self.store.set_json(keys::DOWNLOADED_EPISODES, &kept).await?;
        }

        Ok(report)
    }
}
