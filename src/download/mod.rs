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


//! Episode downloads
//!
//! # Layers
//! - [`state`]: pure per-episode state machine
//! - [`transfer`]: resumable HTTP transfer into a single file
//! - [`index`]: persisted set of completed downloads
//! - [`coordinator`]: task owning all entries and running transfers
//! - [`progress`]: progress snapshots and speed estimation

pub mod coordinator;
pub mod index;
pub mod progress;
pub mod state;
pub mod transfer;

// Re-export commonly used types
pub use coordinator::{DownloadCommand, DownloadCoordinator, DownloadUpdate};
pub use index::{DownloadedSet, DriftReport};
pub use progress::{SpeedTracker, TransferProgress};
pub use state::{progress_fraction, DownloadEntry, DownloadEvent, DownloadStatus};
pub use transfer::{ResumableTransfer, TransferOutcome};
