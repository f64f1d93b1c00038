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


//! Path generation for downloaded episodes
//!
//! # Layout
//! ```text
//! <documents_root>/
//!   episodes.json                 cached catalog
//!   downloaded_episodes/
//!     <episode_id>.mp4            one file per downloaded episode
//!     <episode_id>.mp4.part       transfer in progress or paused
//! ```
//!
//! Episode ids come from the remote catalog and end up both as file names and
//! as URL path segments, so they are validated before any path is built.

use crate::error::{PaceError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Suffix appended to an episode file while its transfer is unfinished
pub const PARTIAL_SUFFIX: &str = ".part";

lazy_static::lazy_static! {
    static ref EPISODE_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap();
}

/// Check that an episode id is safe to use as a file name and URL segment
pub fn validate_episode_id(episode_id: &str) -> Result<()> {
    if EPISODE_ID_RE.is_match(episode_id) {
        Ok(())
    } else {
        Err(PaceError::InvalidInput(format!(
            "Invalid episode id: '{}'",
            episode_id
        )))
    }
}

/// Sibling of `path` that holds the bytes received so far
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Paths derived from the app documents directory
#[derive(Debug, Clone)]
pub struct EpisodePaths {
    documents_root: PathBuf,
    download_dir_name: String,
    file_extension: String,
    catalog_cache_file: String,
}

impl EpisodePaths {
    pub fn new(
        documents_root: PathBuf,
        download_dir_name: String,
        file_extension: String,
        catalog_cache_file: String,
    ) -> Self {
        Self {
            documents_root,
            download_dir_name,
            file_extension,
            catalog_cache_file,
        }
    }

    pub fn documents_root(&self) -> &Path {
        &self.documents_root
    }

    /// Directory shared by all downloaded episodes
    pub fn downloads_dir(&self) -> PathBuf {
        self.documents_root.join(&self.download_dir_name)
    }

    /// Deterministic file path for an episode
    pub fn episode_file(&self, episode_id: &str) -> Result<PathBuf> {
        validate_episode_id(episode_id)?;
        Ok(self.downloads_dir().join(self.file_name(episode_id)))
    }

    /// Where an unfinished download of the episode is written
    pub fn partial_file(&self, episode_id: &str) -> Result<PathBuf> {
        Ok(partial_path(&self.episode_file(episode_id)?))
    }

    /// Cached copy of the catalog JSON
    pub fn catalog_cache(&self) -> PathBuf {
        self.documents_root.join(&self.catalog_cache_file)
    }

    /// Map a file inside the downloads directory back to its episode id
    ///
    /// Returns `None` for files that don't follow the naming scheme
    /// (partial state files, stray files copied in by the user).
    pub fn episode_id_from_file(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(PARTIAL_SUFFIX) {
            return None;
        }

        let id = if self.file_extension.is_empty() {
            name
        } else {
            name.strip_suffix(&format!(".{}", self.file_extension))?
        };

        validate_episode_id(id).ok().map(|_| id.to_string())
    }

    fn file_name(&self, episode_id: &str) -> String {
        if self.file_extension.is_empty() {
            episode_id.to_string()
        } else {
            format!("{}.{}", episode_id, self.file_extension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(extension: &str) -> EpisodePaths {
        EpisodePaths::new(
            PathBuf::from("/docs"),
            "downloaded_episodes".to_string(),
            extension.to_string(),
            "episodes.json".to_string(),
        )
    }

    #[test]
    fn test_episode_file_layout() {
        let p = paths("mp4");
        assert_eq!(
            p.episode_file("7m6KDEuw").unwrap(),
            PathBuf::from("/docs/downloaded_episodes/7m6KDEuw.mp4")
        );
        assert_eq!(p.catalog_cache(), PathBuf::from("/docs/episodes.json"));
    }

    #[test]
    fn test_extensionless_layout() {
        let p = paths("");
        let file = p.episode_file("abc").unwrap();
        assert_eq!(file, PathBuf::from("/docs/downloaded_episodes/abc"));
        assert_eq!(p.episode_id_from_file(&file).as_deref(), Some("abc"));
    }

    #[test]
    fn test_rejects_traversal_ids() {
        let p = paths("mp4");
        assert!(p.episode_file("../secret").is_err());
        assert!(p.episode_file("").is_err());
        assert!(p.episode_file("a/b").is_err());
    }

    #[test]
    fn test_id_from_file_ignores_foreign_files() {
        let p = paths("mp4");
        assert_eq!(
            p.episode_id_from_file(Path::new("/docs/downloaded_episodes/E1.mp4")).as_deref(),
            Some("E1")
        );
        assert_eq!(
            p.episode_id_from_file(Path::new("/docs/downloaded_episodes/E1.download_state.json")),
            None
        );
        assert_eq!(
            p.episode_id_from_file(Path::new("/docs/downloaded_episodes/notes.txt")),
            None
        );
    }

    #[test]
    fn test_partial_files_are_not_episodes() {
        for extension in ["mp4", ""] {
            let p = paths(extension);
            let partial = p.partial_file("E1").unwrap();
            assert!(partial.to_str().unwrap().ends_with(".part"));
            assert_eq!(partial.parent(), p.episode_file("E1").unwrap().parent());
            assert_eq!(p.episode_id_from_file(&partial), None);
        }

        // An id that happens to end in "part" is still an episode
        let p = paths("");
        let file = p.episode_file("counterpart").unwrap();
        assert_eq!(p.episode_id_from_file(&file).as_deref(), Some("counterpart"));
    }
}
