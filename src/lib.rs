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


//! OnePace core: catalog, offline downloads and playback progress
//!
//! Shared by the React Native app on both platforms. Native code talks to it
//! through the JSON bridge ([`bridge`]), either via the C FFI (iOS) or JNI
//! (Android). The small pure helpers below are also exported through uniffi.

uniffi::setup_scaffolding!();

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod logging;
pub mod media;
pub mod playback;
pub mod settings;
pub mod storage;

// C FFI bridge for iOS
pub mod ios_bridge;

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

pub use error::{PaceError, Result};

/// Run one JSON bridge request and return the response envelope
#[uniffi::export]
pub fn dispatch(request_json: String) -> String {
    bridge::dispatch_json(&request_json)
}

/// Streaming URL for an episode, or None if the base URL is unusable
#[uniffi::export]
pub fn episode_stream_url(media_base_url: String, episode_id: String) -> Option<String> {
    media::stream_url(&media_base_url, &episode_id)
        .ok()
        .map(|url| url.to_string())
}

/// Where to seek when resuming at `percentage` of `duration_ms`
#[uniffi::export]
pub fn seek_offset_millis(percentage: f64, duration_ms: u64) -> Option<u64> {
    playback::ProgressTracker::to_seek_offset(percentage, duration_ms)
}

#[uniffi::export]
pub fn download_progress_fraction(bytes_written: u64, total_bytes: Option<u64>) -> f64 {
    download::progress_fraction(bytes_written, total_bytes)
}

#[uniffi::export]
pub fn core_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
