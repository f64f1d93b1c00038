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


//! Core configuration
//!
//! The mobile shell builds one [`AppConfig`] at startup (usually from JSON
//! handed across the bridge) and every component derives its paths and URLs
//! from it. Values not present in the JSON fall back to the defaults below.

use crate::error::{PaceError, Result};
use crate::file::paths::EpisodePaths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Remote catalog published by the project
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/M4rga/one-pace-app/main/assets/others/episodes.json";

/// File host serving both streams and downloads
pub const DEFAULT_MEDIA_BASE_URL: &str = "https://pixeldrain.com/api/file";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// App documents directory (expo `documentDirectory` equivalent)
    pub documents_root: PathBuf,

    /// SQLite database backing the key-value store.
    /// Defaults to `<documents_root>/onepace.db` when unset.
    pub database_path: Option<PathBuf>,

    /// URL of the catalog JSON
    pub catalog_url: String,

    /// Base URL for `{base}/{id}` streams and `{base}/{id}?download` transfers
    pub media_base_url: String,

    /// Directory under `documents_root` holding downloaded episodes
    pub download_dir_name: String,

    /// Extension of downloaded episode files, empty for none
    pub file_extension: String,

    /// File under `documents_root` caching the last good catalog
    pub catalog_cache_file: String,

    /// Resynchronise the downloaded set with the download directory on start
    pub reconcile_on_startup: bool,

    /// Minimum interval between persisted playback position writes
    pub progress_write_interval_ms: u64,

    /// HTTP request timeout
    pub request_timeout_secs: u64,

    /// How long stop/pause waits for a transfer task to wind down
    pub stop_grace_period_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            documents_root: PathBuf::from("."),
            database_path: None,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            media_base_url: DEFAULT_MEDIA_BASE_URL.to_string(),
            download_dir_name: "downloaded_episodes".to_string(),
            file_extension: "mp4".to_string(),
            catalog_cache_file: "episodes.json".to_string(),
            reconcile_on_startup: true,
            progress_write_interval_ms: 1000,
            request_timeout_secs: 300,
            stop_grace_period_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Config rooted at the given documents directory, defaults elsewhere
    pub fn with_documents_root<P: Into<PathBuf>>(documents_root: P) -> Self {
        Self {
            documents_root: documents_root.into(),
            ..Self::default()
        }
    }

    /// Parse a config from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values that would otherwise fail much later
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.catalog_url)
            .map_err(|e| PaceError::InvalidConfiguration(format!("catalogUrl: {}", e)))?;
        url::Url::parse(&self.media_base_url)
            .map_err(|e| PaceError::InvalidConfiguration(format!("mediaBaseUrl: {}", e)))?;

        if self.download_dir_name.is_empty()
            || self.download_dir_name.contains(['/', '\\'])
            || self.download_dir_name == ".."
        {
            return Err(PaceError::InvalidConfiguration(format!(
                "download_dir_name must be a single path component, got '{}'",
                self.download_dir_name
            )));
        }

        if self.catalog_cache_file.is_empty() || self.catalog_cache_file.contains(['/', '\\']) {
            return Err(PaceError::InvalidConfiguration(format!(
                "catalog_cache_file must be a file name, got '{}'",
                self.catalog_cache_file
            )));
        }

        Ok(())
    }

    /// Path helper for this configuration
    pub fn paths(&self) -> EpisodePaths {
        EpisodePaths::new(
            self.documents_root.clone(),
            self.download_dir_name.clone(),
            self.file_extension.clone(),
            self.catalog_cache_file.clone(),
        )
    }

    /// Resolved database location
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.documents_root.join("onepace.db"))
    }

    pub fn progress_write_interval(&self) -> Duration {
        Duration::from_millis(self.progress_write_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }
}
