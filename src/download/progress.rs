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


//! Transfer progress snapshots and speed estimation
//!
//! [`TransferProgress`] is what a running transfer reports after every chunk.
//! [`SpeedTracker`] keeps a sliding window of positions for front-ends that
//! want to show a rate or a time estimate next to the bar.

use crate::download::state::progress_fraction;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bytes on disk versus the expected total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes written to the destination file, including earlier sessions
    pub bytes_written: u64,

    /// Total size announced by the server, if any
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    pub fn new(bytes_written: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_written,
            total_bytes,
        }
    }

    /// Fraction in [0, 1], zero when the total is unknown
    pub fn fraction(&self) -> f64 {
        progress_fraction(self.bytes_written, self.total_bytes)
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }

    pub fn bytes_remaining(&self) -> Option<u64> {
        self.total_bytes
            .map(|total| total.saturating_sub(self.bytes_written))
    }

    /// Format bytes as human-readable string (e.g. "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        let mb = bytes as f64 / 1_000_000.0;
        format!("{:.1} MB", mb)
    }

    /// One-line summary, e.g. "37.0% (3.7 MB / 10.0 MB)"
    pub fn display_string(&self) -> String {
        match self.total_bytes {
            Some(total) if total > 0 => format!(
                "{:.1}% ({} / {})",
                self.percent(),
                Self::bytes_string(self.bytes_written),
                Self::bytes_string(total)
            ),
            _ => format!("{} (size unknown)", Self::bytes_string(self.bytes_written)),
        }
    }
}

/// Download speed with a moving average
///
/// Samples older than the window are dropped, which smooths out bursts from
/// the network without lagging too far behind real changes.
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<SpeedSample>,
    window: Duration,
}

#[derive(Debug, Clone, Copy)]
struct SpeedSample {
    at: Instant,
    position: u64,
}

impl SpeedTracker {
    /// Tracker with a 10 second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Record the total bytes written so far
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample { at: now, position });

        while let Some(oldest) = self.samples.front() {
            if now.duration_since(oldest.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average speed in bytes per second over the window
    pub fn average_speed(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => return 0.0,
        };

        let bytes = last.position.saturating_sub(first.position);
        let secs = last.at.duration_since(first.at).as_secs_f64();

        if secs > 0.0 {
            bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Time left at the current average speed
    pub fn estimate_remaining(&self, bytes_remaining: u64) -> Option<Duration> {
        let speed = self.average_speed();
        if speed > 0.0 {
            Some(Duration::from_secs_f64(bytes_remaining as f64 / speed))
        } else {
            None
        }
    }

    /// e.g. "2.5 MB/s"
    pub fn speed_string(&self) -> String {
        format!("{:.1} MB/s", self.average_speed() / 1_000_000.0)
    }

    /// e.g. "5m 30s", or "calculating..." before there is a rate
    pub fn eta_string(&self, bytes_remaining: u64) -> String {
        let secs = match self.estimate_remaining(bytes_remaining) {
            Some(eta) => eta.as_secs(),
            None => return "calculating...".to_string(),
        };

        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}
