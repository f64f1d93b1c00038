//! One playback of one episode
//!
//! The native player owns decoding and rendering; this type only decides
//! where to play from, where to start and what to remember. The player calls
//! [`PlaybackSession::on_loaded`] once the duration is known, feeds every
//! status update to [`PlaybackSession::on_status`] and calls
//! [`PlaybackSession::close`] when the screen goes away.

use crate::download::DownloadedSet;
use crate::error::Result;
use crate::file::EpisodeFiles;
use crate::media;
use crate::playback::tracker::{percentage_of, ProgressTracker};
use crate::settings::PlaybackSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Shown when the source can't be played
pub const PLAYBACK_ERROR_TITLE: &str = "Error";
pub const PLAYBACK_ERROR_MESSAGE: &str = "Error link not found";

/// Where the player reads the video from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum PlaybackSource {
    /// Downloaded file
    Local(PathBuf),
    /// Stream from the file host
    Remote(Url),
}

impl PlaybackSource {
    /// URI to hand to the native player
    pub fn uri(&self) -> String {
        match self {
            PlaybackSource::Local(path) => Url::from_file_path(path)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| path.display().to_string()),
            PlaybackSource::Remote(url) => url.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, PlaybackSource::Local(_))
    }
}

/// Player status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub position_ms: u64,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub is_loaded: bool,
}

/// What the UI should do next
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PlaybackAction {
    /// Show a blocking alert, then leave the player screen
    NavigateBack { title: String, message: String },
}

/// State of a single playback
#[derive(Debug)]
pub struct PlaybackSession {
    episode_id: String,
    source: PlaybackSource,
    settings: PlaybackSettings,
    tracker: ProgressTracker,
    write_interval: Duration,
    seek_done: bool,
    last_write: Option<Instant>,
    pending: Option<f64>,
}

impl PlaybackSession {
    /// Resolve the source and prepare a session
    ///
    /// The local copy is used when the episode is in the downloaded set and
    /// its file is on disk, the remote stream otherwise.
    pub async fn open(
        episode_id: &str,
        downloaded: &DownloadedSet,
        files: &EpisodeFiles,
        media_base_url: &str,
        tracker: ProgressTracker,
        settings: PlaybackSettings,
        write_interval: Duration,
    ) -> Result<Self> {
        let remote = media::stream_url(media_base_url, episode_id)?;
        let local = files.episode_file(episode_id)?;

        let source = if downloaded.contains(episode_id).await && EpisodeFiles::file_exists(&local).await {
            PlaybackSource::Local(local)
        } else {
            PlaybackSource::Remote(remote)
        };

        info!(episode_id, local = source.is_local(), "Opening playback session");

        Ok(Self {
            episode_id: episode_id.to_string(),
            source,
            settings,
            tracker,
            write_interval,
            seek_done: false,
            last_write: None,
            pending: None,
        })
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn source(&self) -> &PlaybackSource {
        &self.source
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Offset to seek to once the media is loaded
    ///
    /// Only the first call can return an offset. Nothing to seek when the
    /// duration is unknown, nothing was watched yet, or the episode was
    /// finished (it starts over).
    pub async fn on_loaded(&mut self, duration_ms: Option<u64>) -> Option<u64> {
        if self.seek_done {
            return None;
        }
        self.seek_done = true;

        let duration_ms = duration_ms.filter(|d| *d > 0)?;

        if let Err(e) = self
            .tracker
            .migrate_legacy_position(&self.episode_id, duration_ms)
            .await
        {
            warn!(episode_id = %self.episode_id, "Legacy position migration failed: {}", e);
        }

        let record = match self.tracker.record(&self.episode_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(episode_id = %self.episode_id, "Failed to read progress: {}", e);
                return None;
            }
        };

        if record.is_finished || record.percentage <= 0.0 {
            return None;
        }

        let offset = ProgressTracker::to_seek_offset(record.percentage, duration_ms);
        debug!(episode_id = %self.episode_id, ?offset, "Resuming playback");
        offset
    }

    /// Remember the position from a player status update
    ///
    /// Updates that arrive before [`on_loaded`](Self::on_loaded) are dropped,
    /// they would overwrite the stored position before it is read. Writes are
    /// throttled to one per write interval; the first always goes through
    /// and the latest skipped value is kept for [`close`](Self::close).
    pub async fn on_status(&mut self, status: PlaybackStatus) -> Result<()> {
        if !status.is_loaded || !self.seek_done {
            return Ok(());
        }
        let percentage = match status
            .duration_ms
            .and_then(|duration| percentage_of(status.position_ms, duration))
        {
            Some(percentage) => percentage,
            None => return Ok(()),
        };

        let due = self
            .last_write
            .map(|at| at.elapsed() >= self.write_interval)
            .unwrap_or(true);

        if due {
            self.write(percentage).await
        } else {
            self.pending = Some(percentage);
            Ok(())
        }
    }

    /// Flush the last position and end the session
    pub async fn close(mut self) -> Result<()> {
        if let Some(percentage) = self.pending.take() {
            self.write(percentage).await?;
        }
        debug!(episode_id = %self.episode_id, "Playback session closed");
        Ok(())
    }

    /// The source failed to load
    pub fn on_error(&self, detail: &str) -> PlaybackAction {
        warn!(episode_id = %self.episode_id, uri = %self.source.uri(), "Playback failed: {}", detail);
        PlaybackAction::NavigateBack {
            title: PLAYBACK_ERROR_TITLE.to_string(),
            message: PLAYBACK_ERROR_MESSAGE.to_string(),
        }
    }

    async fn write(&mut self, percentage: f64) -> Result<()> {
        self.tracker.set_progress(&self.episode_id, percentage).await?;
        self.last_write = Some(Instant::now());
        self.pending = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::storage::{keys, Database, KeyValueStore};

    struct Fixture {
        _dir: tempfile::TempDir,
        kv: KeyValueStore,
        files: EpisodeFiles,
        config: AppConfig,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::with_documents_root(dir.path());
        let db = Database::new_in_memory().await.unwrap();
        Fixture {
            kv: KeyValueStore::new(db.pool().clone()),
            files: EpisodeFiles::new(config.paths()),
            config,
            _dir: dir,
        }
    }

    async fn open(f: &Fixture, id: &str, interval: Duration) -> PlaybackSession {
        PlaybackSession::open(
            id,
            &DownloadedSet::new(f.kv.clone()),
            &f.files,
            &f.config.media_base_url,
            ProgressTracker::new(f.kv.clone()),
            PlaybackSettings::default(),
            interval,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_source_resolution() {
        let f = fixture().await;
        let set = DownloadedSet::new(f.kv.clone());

        // In the set but the file is gone: stream it
        set.add("E1").await.unwrap();
        let session = open(&f, "E1", Duration::ZERO).await;
        assert_eq!(
            session.source().uri(),
            "https://pixeldrain.com/api/file/E1"
        );

        let dir = f.files.ensure_downloads_dir().await.unwrap();
        tokio::fs::write(dir.join("E1.mp4"), b"video").await.unwrap();
        let session = open(&f, "E1", Duration::ZERO).await;
        assert!(session.source().is_local());
    }

    #[tokio::test]
    async fn test_seek_once_from_stored_progress() {
        let f = fixture().await;
        ProgressTracker::new(f.kv.clone())
            .set_progress("E2", 25.0)
            .await
            .unwrap();

        let mut session = open(&f, "E2", Duration::ZERO).await;
        assert_eq!(session.on_loaded(Some(200_000)).await, Some(50_000));
        assert_eq!(session.on_loaded(Some(200_000)).await, None);
    }

    #[tokio::test]
    async fn test_no_seek_for_unknown_duration_or_finished() {
        let f = fixture().await;
        let tracker = ProgressTracker::new(f.kv.clone());
        tracker.set_progress("E3", 50.0).await.unwrap();
        tracker.mark_finished("E4").await.unwrap();

        let mut session = open(&f, "E3", Duration::ZERO).await;
        assert_eq!(session.on_loaded(None).await, None);

        let mut session = open(&f, "E4", Duration::ZERO).await;
        assert_eq!(session.on_loaded(Some(1_000)).await, None);
    }

    #[tokio::test]
    async fn test_legacy_position_is_used_for_seek() {
        let f = fixture().await;
        f.kv.set(&keys::legacy_position("E5"), "60000").await.unwrap();

        let mut session = open(&f, "E5", Duration::ZERO).await;
        assert_eq!(session.on_loaded(Some(240_000)).await, Some(60_000));
    }

    #[tokio::test]
    async fn test_status_writes_are_throttled_and_flushed() {
        let f = fixture().await;
        let tracker = ProgressTracker::new(f.kv.clone());
        let mut session = open(&f, "E6", Duration::from_secs(3600)).await;
        assert_eq!(session.on_loaded(Some(1_000)).await, None);

        let status = |position_ms| PlaybackStatus {
            position_ms,
            duration_ms: Some(1_000),
            is_loaded: true,
        };

        session.on_status(status(100)).await.unwrap();
        assert_eq!(tracker.get_progress("E6").await.unwrap(), 10.0);

        session.on_status(status(500)).await.unwrap();
        assert_eq!(tracker.get_progress("E6").await.unwrap(), 10.0);

        session
            .on_status(PlaybackStatus {
                position_ms: 900,
                duration_ms: Some(1_000),
                is_loaded: false,
            })
            .await
            .unwrap();

        session.close().await.unwrap();
        assert_eq!(tracker.get_progress("E6").await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn test_status_before_load_keeps_resume_position() {
        let f = fixture().await;
        let tracker = ProgressTracker::new(f.kv.clone());
        tracker.set_progress("E8", 50.0).await.unwrap();

        let mut session = open(&f, "E8", Duration::ZERO).await;
        let initial = PlaybackStatus {
            position_ms: 0,
            duration_ms: Some(200_000),
            is_loaded: true,
        };
        session.on_status(initial).await.unwrap();
        assert_eq!(tracker.get_progress("E8").await.unwrap(), 50.0);

        assert_eq!(session.on_loaded(Some(200_000)).await, Some(100_000));

        session
            .on_status(PlaybackStatus {
                position_ms: 120_000,
                ..initial
            })
            .await
            .unwrap();
        assert_eq!(tracker.get_progress("E8").await.unwrap(), 60.0);

        // Closing before anything new was pending leaves the record alone
        session.close().await.unwrap();
        assert_eq!(tracker.get_progress("E8").await.unwrap(), 60.0);
    }

    #[tokio::test]
    async fn test_error_navigates_back() {
        let f = fixture().await;
        let session = open(&f, "E7", Duration::ZERO).await;

        assert_eq!(
            session.on_error("404"),
            PlaybackAction::NavigateBack {
                title: "Error".to_string(),
                message: "Error link not found".to_string(),
            }
        );
    }
}
