//! Per-episode download state machine
//!
//! ```text
//!            start              completed
//!   Idle ─────────────▶ Downloading ─────────▶ Downloaded
//!    ▲  ◀── failed ────   │    ▲                  │
//!    │                pause  resume               │ delete
//!    │                    ▼    │                  │
//!    ├──── stop ─────── Paused ◀─ resume failed   │
//!    └────────────────────────────────────────────┘
//! ```
//!
//! [`DownloadEntry`] is a plain value: it knows nothing about files, HTTP or
//! storage. The coordinator owns one entry per episode and feeds it events;
//! side effects are only performed when [`DownloadEntry::apply`] accepts the
//! event. Events that are not valid in the current state are ignored, which is
//! what makes "resume while idle" or "start while downloaded" no-ops.

use serde::{Deserialize, Serialize};

/// Lifecycle of one episode download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Nothing on disk (or the download was stopped/deleted)
    Idle,
    /// Transfer in flight
    Downloading,
    /// Transfer suspended, partial data kept
    Paused,
    /// File complete and listed in the downloaded set
    Downloaded,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Idle => "idle",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Downloaded => "downloaded",
        }
    }

    /// A transfer handle exists for this status
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DownloadStatus::Downloading | DownloadStatus::Paused)
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// User asked to download
    Start,
    /// User asked to pause the running transfer
    Pause,
    /// User asked to continue a paused transfer
    Resume,
    /// Transfer reported a chunk
    Progress {
        bytes_written: u64,
        total_bytes: Option<u64>,
    },
    /// Transfer finished with a usable file
    Completed,
    /// A fresh transfer failed
    Failed,
    /// A resumed transfer failed, partial data is still usable
    ResumeFailed,
    /// User cancelled an in-flight transfer
    Stop,
    /// User removed a completed download
    Delete,
}

/// Fraction of a transfer done, in [0, 1]
///
/// Unknown or zero totals count as no progress.
pub fn progress_fraction(bytes_written: u64, total_bytes: Option<u64>) -> f64 {
    match total_bytes {
        Some(total) if total > 0 => (bytes_written as f64 / total as f64).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// In-session download state for one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEntry {
    pub episode_id: String,
    pub status: DownloadStatus,
    pub progress_fraction: f64,
}

impl DownloadEntry {
    /// Initial entry for a fresh session
    ///
    /// Only membership in the downloaded set matters here; in-flight states
    /// never survive a restart.
    pub fn from_index(episode_id: impl Into<String>, in_downloaded_set: bool) -> Self {
        let (status, progress_fraction) = if in_downloaded_set {
            (DownloadStatus::Downloaded, 1.0)
        } else {
            (DownloadStatus::Idle, 0.0)
        };

        Self {
            episode_id: episode_id.into(),
            status,
            progress_fraction,
        }
    }

    /// Apply an event, returns whether it caused a change
    pub fn apply(&mut self, event: &DownloadEvent) -> bool {
        use DownloadStatus::*;

        match (self.status, event) {
            (Idle, DownloadEvent::Start) => {
                self.status = Downloading;
                self.progress_fraction = 0.0;
                true
            }
            (Downloading, DownloadEvent::Pause) => {
                self.status = Paused;
                true
            }
            (Paused, DownloadEvent::Resume) => {
                self.status = Downloading;
                true
            }
            (Downloading, DownloadEvent::Progress { bytes_written, total_bytes }) => {
                let fraction = progress_fraction(*bytes_written, *total_bytes);
                let changed = fraction != self.progress_fraction;
                self.progress_fraction = fraction;
                changed
            }
            // A pause can race the last chunk; the file is complete either way.
            (Downloading | Paused, DownloadEvent::Completed) => {
                self.status = Downloaded;
                self.progress_fraction = 1.0;
                true
            }
            (Downloading, DownloadEvent::Failed) => {
                self.reset();
                true
            }
            (Downloading, DownloadEvent::ResumeFailed) => {
                self.status = Paused;
                true
            }
            (Downloading | Paused, DownloadEvent::Stop) => {
                self.reset();
                true
            }
            (Downloaded, DownloadEvent::Delete) => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.status = DownloadStatus::Idle;
        self.progress_fraction = 0.0;
    }
}
