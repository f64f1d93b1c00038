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


//! File operations for downloaded episodes
//!
//! # Key Operations
//! - Download directory creation (idempotent)
//! - Per-episode existence checks
//! - Idempotent deletion with retry
//! - Listing and clearing the download directory
//! - Atomic writes for the cached catalog

use crate::error::{PaceError, Result};
use crate::file::paths::EpisodePaths;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// A downloaded episode found on disk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedFile {
    pub episode_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// File store for downloaded episodes
#[derive(Debug, Clone)]
pub struct EpisodeFiles {
    paths: EpisodePaths,
}

impl EpisodeFiles {
    pub fn new(paths: EpisodePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &EpisodePaths {
        &self.paths
    }

    /// Deterministic destination of an episode download
    pub fn episode_file(&self, episode_id: &str) -> Result<PathBuf> {
        self.paths.episode_file(episode_id)
    }

    /// Where the unfinished download of an episode is written
    pub fn partial_file(&self, episode_id: &str) -> Result<PathBuf> {
        self.paths.partial_file(episode_id)
    }

    /// Create the download directory if it is missing
    pub async fn ensure_downloads_dir(&self) -> Result<PathBuf> {
        let dir = self.paths.downloads_dir();
        Self::ensure_directory_exists(&dir).await?;
        Ok(dir)
    }

    /// Whether the episode's file is present
    pub async fn episode_exists(&self, episode_id: &str) -> Result<bool> {
        let path = self.episode_file(episode_id)?;
        Ok(Self::file_exists(&path).await)
    }

    /// Delete an episode's file
    ///
    /// Returns `false` when there was nothing to delete. A missing file is
    /// not an error.
    pub async fn delete_episode(&self, episode_id: &str) -> Result<bool> {
        let path = self.episode_file(episode_id)?;
        if !Self::file_exists(&path).await {
            debug!(episode_id, "Episode file already absent");
            return Ok(false);
        }
        Self::safe_delete(&path).await?;
        Ok(true)
    }

    /// Delete an episode's unfinished download, if any
    pub async fn delete_partial(&self, episode_id: &str) -> Result<bool> {
        let path = self.partial_file(episode_id)?;
        if !Self::file_exists(&path).await {
            return Ok(false);
        }
        Self::safe_delete(&path).await?;
        Ok(true)
    }

    /// All episode files currently in the download directory
    ///
    /// Unfinished `.part` files and files that don't follow the naming
    /// scheme are skipped. A missing download directory means nothing has
    /// been downloaded yet.
    pub async fn list_downloaded(&self) -> Result<Vec<DownloadedFile>> {
        let dir = self.paths.downloads_dir();
        if !Self::file_exists(&dir).await {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            PaceError::FileIoError(format!("Failed to read directory {}: {}", dir.display(), e))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if let Some(episode_id) = self.paths.episode_id_from_file(&path) {
                files.push(DownloadedFile {
                    episode_id,
                    path,
                    size_bytes: metadata.len(),
                });
            }
        }

        files.sort_by(|a, b| a.episode_id.cmp(&b.episode_id));
        Ok(files)
    }

    /// Remove everything in the download directory
    ///
    /// Returns the number of entries removed.
    pub async fn clear_downloads(&self) -> Result<usize> {
        let dir = self.paths.downloads_dir();
        if !Self::file_exists(&dir).await {
            return Ok(0);
        }

        let mut entries = fs::read_dir(&dir).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                Self::safe_delete(&path).await?;
            }
            removed += 1;
        }

        Ok(removed)
    }

    /// Safe delete operation with retry
    pub async fn safe_delete(path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::safe_delete_once(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(PaceError::FileIoError(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    async fn safe_delete_once(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PaceError::FileIoError(format!(
                "Delete failed: {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Ensure directory exists, creating parent directories as needed
    pub async fn ensure_directory_exists(path: &Path) -> Result<()> {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(PaceError::FileIoError(format!(
                    "Not a directory: {}",
                    path.display()
                )))
            }
            Err(_) => {}
        }

        fs::create_dir_all(path).await.map_err(|e| {
            PaceError::FileIoError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Check if file exists
    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    /// Get file size in bytes
    pub async fn get_file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            PaceError::FileIoError(format!("Failed to get file size {}: {}", path.display(), e))
        })?;

        Ok(metadata.len())
    }

    /// Atomic write: write to a sibling temp file, sync, then rename
    pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        if let Some(parent) = path.parent() {
            Self::ensure_directory_exists(parent).await?;
        }

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            PaceError::FileIoError(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await.map_err(|e| {
            PaceError::FileIoError(format!(
                "Failed to move {} into place: {}",
                temp_path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn files_in(temp_dir: &TempDir) -> EpisodeFiles {
        EpisodeFiles::new(EpisodePaths::new(
            temp_dir.path().to_path_buf(),
            "downloaded_episodes".to_string(),
            "mp4".to_string(),
            "episodes.json".to_string(),
        ))
    }

    #[tokio::test]
    async fn test_ensure_downloads_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);

        let dir = files.ensure_downloads_dir().await.unwrap();
        files.ensure_downloads_dir().await.unwrap();

        assert!(dir.is_dir());
        assert_eq!(dir, temp_dir.path().join("downloaded_episodes"));
    }

    #[tokio::test]
    async fn test_ensure_downloads_dir_rejects_regular_file() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);
        fs::write(temp_dir.path().join("downloaded_episodes"), b"oops")
            .await
            .unwrap();

        let err = files.ensure_downloads_dir().await.unwrap_err();
        assert!(matches!(err, PaceError::FileIoError(_)));
    }

    #[tokio::test]
    async fn test_delete_episode_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);
        files.ensure_downloads_dir().await.unwrap();

        let path = files.episode_file("E1").unwrap();
        fs::write(&path, b"video").await.unwrap();

        assert!(files.delete_episode("E1").await.unwrap());
        assert!(!path.exists());
        assert!(!files.delete_episode("E1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_downloaded_skips_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);
        let dir = files.ensure_downloads_dir().await.unwrap();

        fs::write(dir.join("B2.mp4"), b"12345").await.unwrap();
        fs::write(dir.join("A1.mp4"), b"1").await.unwrap();
        fs::write(dir.join("readme.txt"), b"x").await.unwrap();
        fs::write(dir.join("C3.mp4.part"), b"half").await.unwrap();

        let listed = files.list_downloaded().await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|f| f.episode_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B2"]);
        assert_eq!(listed[1].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_delete_partial_leaves_episode_file() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);
        files.ensure_downloads_dir().await.unwrap();

        let partial = files.partial_file("E1").unwrap();
        fs::write(&partial, b"vid").await.unwrap();
        fs::write(files.episode_file("E1").unwrap(), b"video").await.unwrap();

        assert!(files.delete_partial("E1").await.unwrap());
        assert!(!partial.exists());
        assert!(files.episode_exists("E1").await.unwrap());
        assert!(!files.delete_partial("E1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_without_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);
        assert!(files.list_downloaded().await.unwrap().is_empty());
        assert_eq!(files.clear_downloads().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_downloads() {
        let temp_dir = TempDir::new().unwrap();
        let files = files_in(&temp_dir);
        let dir = files.ensure_downloads_dir().await.unwrap();
        fs::write(dir.join("A1.mp4"), b"1").await.unwrap();
        fs::write(dir.join("B2.mp4"), b"2").await.unwrap();

        assert_eq!(files.clear_downloads().await.unwrap(), 2);
        assert!(files.list_downloaded().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("episodes.json");

        EpisodeFiles::atomic_write(&path, b"{}").await.unwrap();
        EpisodeFiles::atomic_write(&path, b"{\"a\":1}").await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "{\"a\":1}");
    }
}
