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


//! C FFI bridge for iOS - Exposes the core to React Native
//!
//! Swift (the Expo module) calls these C functions, which in turn forward to
//! the shared JSON dispatcher in [`crate::bridge`].
//!
//! # Architecture
//! JavaScript (React Native) → Swift (ExpoOnePaceModule) → C FFI → Rust
//!
//! # Design Patterns
//! 1. **JSON Communication**: Complex arguments and results cross as JSON
//! 2. **No Panics**: Panics are caught and returned as error envelopes
//! 3. **Memory Safety**: Returned strings must be freed with `rust_free_string()`
//!
//! # Response Format
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "Error message" }
//! ```
//!
//! # Memory Management
//! **CRITICAL**: All string pointers returned from Rust functions MUST be freed
//! by the caller using `rust_free_string()`.
//!
//! ```swift
//! let resultPtr = rust_get_progress(episodeId)
//! defer { rust_free_string(resultPtr) }
//! let jsonString = String(cString: resultPtr)
//! ```

use crate::bridge::{self, error_response, success_response, BridgeRequest};
use crate::error::PaceError;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Safely convert C string pointer to Rust String
///
/// # Safety
/// Caller must ensure ptr is a valid null-terminated C string
fn c_str_to_string(ptr: *const c_char) -> crate::Result<String> {
    if ptr.is_null() {
        return Err(PaceError::InvalidInput("Null pointer received".to_string()));
    }
    unsafe {
        CStr::from_ptr(ptr)
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| PaceError::InvalidInput(format!("Invalid UTF-8: {}", e)))
    }
}

/// Convert Rust string to C string pointer
///
/// # Safety
/// Caller MUST free the returned pointer using `rust_free_string()`
fn string_to_c_str(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => {
            // Strip NULs so the fallback envelope always converts
            let error_json = error_response("String contains null bytes").replace('\0', "");
            CString::new(error_json).unwrap_or_default().into_raw()
        }
    }
}

/// Wrap a function call with panic catching
fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> crate::Result<String> + panic::UnwindSafe,
{
    match panic::catch_unwind(f) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => error_response(&e.user_message()),
        Err(panic_err) => {
            let panic_msg = if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic occurred".to_string()
            };
            error_response(&format!("Rust panic: {}", panic_msg))
        }
    }
}

/// Run a request and wrap its data in a success envelope
fn call(request: BridgeRequest) -> crate::Result<String> {
    let data = bridge::dispatch(request)?;
    Ok(success_response(data))
}

/// Episode-id-only request helper
fn call_with_episode<F>(episode_id: *const c_char, build: F) -> *mut c_char
where
    F: FnOnce(String) -> BridgeRequest + panic::UnwindSafe,
{
    let response = catch_panic(|| {
        let episode_id = c_str_to_string(episode_id)?;
        call(build(episode_id))
    });

    string_to_c_str(response)
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Open storage and start the download coordinator
///
/// # Arguments
/// * `config_json` - Serialized app config; at least `documentsRoot` is required
///
/// # Returns
/// ```json
/// { "success": true, "data": { "documentsRoot": "/var/mobile/.../Documents" } }
/// ```
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_init(config_json: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let config_json = c_str_to_string(config_json)?;
        let config = serde_json::from_str(&config_json)?;
        call(BridgeRequest::Init { config })
    });

    string_to_c_str(response)
}

/// Generic entry point taking a full `{"method": ..., "params": ...}` request
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_dispatch(request_json: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let request_json = c_str_to_string(request_json)?;
        Ok(bridge::dispatch_json(&request_json))
    });

    string_to_c_str(response)
}

// ============================================================================
// CATALOG
// ============================================================================

/// Load the episode catalog (remote first, cached copy on failure)
///
/// # Returns
/// ```json
/// { "success": true, "data": { "state": "loaded", "origin": "remote", "catalog": { ... } } }
/// ```
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_load_catalog() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::LoadCatalog));
    string_to_c_str(response)
}

/// Streaming URL for an episode
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_stream_url(episode_id: *const c_char) -> *mut c_char {
    call_with_episode(episode_id, |episode_id| BridgeRequest::StreamUrl { episode_id })
}

// ============================================================================
// DOWNLOADS
// ============================================================================

/// Send a download command
///
/// # Arguments
/// * `command_json` - e.g. `{"type": "start", "episodeId": "abc123"}`
///
/// # Returns
/// The episode's entry after the command was applied:
/// ```json
/// { "success": true, "data": { "episodeId": "abc123", "status": "downloading", "progressFraction": 0.0 } }
/// ```
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_download_command(command_json: *const c_char) -> *mut c_char {
    let response = catch_panic(|| {
        let command_json = c_str_to_string(command_json)?;
        let command = serde_json::from_str(&command_json)?;
        call(BridgeRequest::Download { command })
    });

    string_to_c_str(response)
}

/// Every known download entry
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_download_entries() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::DownloadEntries));
    string_to_c_str(response)
}

/// Download updates published since the previous poll
///
/// Swift polls this on a timer while any download is in flight and forwards
/// each update as an event to JavaScript.
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_poll_download_updates() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::DownloadUpdates));
    string_to_c_str(response)
}

/// Reconcile the downloaded set with the files on disk
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_reconcile_downloads() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::Reconcile));
    string_to_c_str(response)
}

/// Delete every downloaded episode file
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_clear_downloads() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::ClearDownloads));
    string_to_c_str(response)
}

// ============================================================================
// PROGRESS
// ============================================================================

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_get_progress(episode_id: *const c_char) -> *mut c_char {
    call_with_episode(episode_id, |episode_id| BridgeRequest::GetProgress { episode_id })
}

/// Store watch progress as a percentage in [0, 100]
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_set_progress(episode_id: *const c_char, percentage: f64) -> *mut c_char {
    call_with_episode(episode_id, move |episode_id| BridgeRequest::SetProgress {
        episode_id,
        percentage,
    })
}

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_mark_finished(episode_id: *const c_char) -> *mut c_char {
    call_with_episode(episode_id, |episode_id| BridgeRequest::MarkFinished { episode_id })
}

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_clear_progress(episode_id: *const c_char) -> *mut c_char {
    call_with_episode(episode_id, |episode_id| BridgeRequest::ClearProgress { episode_id })
}

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_all_progress() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::AllProgress));
    string_to_c_str(response)
}

// ============================================================================
// PLAYBACK
// ============================================================================

/// Open a playback session and pick the local file or the stream
///
/// # Returns
/// ```json
/// { "success": true, "data": { "uri": "file:///...", "playsInSilentMode": true, ... } }
/// ```
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_open_playback(episode_id: *const c_char) -> *mut c_char {
    call_with_episode(episode_id, |episode_id| BridgeRequest::OpenPlayback { episode_id })
}

/// The player finished loading
///
/// # Arguments
/// * `duration_ms` - Media duration, or a negative value when unknown
///
/// # Returns
/// `{"seekToMs": 123456}` or `{"seekToMs": null}` when playback starts at zero
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_playback_loaded(episode_id: *const c_char, duration_ms: i64) -> *mut c_char {
    let duration_ms = u64::try_from(duration_ms).ok();
    call_with_episode(episode_id, move |episode_id| BridgeRequest::PlaybackLoaded {
        episode_id,
        duration_ms,
    })
}

/// Periodic player status; progress writes are throttled on the Rust side
///
/// # Arguments
/// * `status_json` - `{"positionMs": 1000, "durationMs": 1440000, "isLoaded": true}`
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_playback_status(
    episode_id: *const c_char,
    status_json: *const c_char,
) -> *mut c_char {
    let response = catch_panic(|| {
        let episode_id = c_str_to_string(episode_id)?;
        let status_json = c_str_to_string(status_json)?;
        let status = serde_json::from_str(&status_json)?;
        call(BridgeRequest::PlaybackStatus { episode_id, status })
    });

    string_to_c_str(response)
}

/// The player reported an error; the session is closed
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_playback_error(
    episode_id: *const c_char,
    message: *const c_char,
) -> *mut c_char {
    let response = catch_panic(|| {
        let episode_id = c_str_to_string(episode_id)?;
        let message = c_str_to_string(message)?;
        call(BridgeRequest::PlaybackError {
            episode_id,
            message,
        })
    });

    string_to_c_str(response)
}

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_close_playback(episode_id: *const c_char) -> *mut c_char {
    call_with_episode(episode_id, |episode_id| BridgeRequest::ClosePlayback { episode_id })
}

// ============================================================================
// SETTINGS
// ============================================================================

/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_get_settings() -> *mut c_char {
    let response = catch_panic(|| call(BridgeRequest::GetSettings));
    string_to_c_str(response)
}

/// Flip one settings switch
///
/// # Safety
/// Caller must free the returned string with `rust_free_string()`
#[no_mangle]
pub extern "C" fn rust_set_setting(name: *const c_char, enabled: bool) -> *mut c_char {
    let response = catch_panic(|| {
        let name = c_str_to_string(name)?;
        call(BridgeRequest::SetSetting { name, enabled })
    });

    string_to_c_str(response)
}

// ============================================================================
// MEMORY MANAGEMENT
// ============================================================================

/// Free a string previously returned by Rust
///
/// # Safety
/// This function MUST be called exactly once for each string returned by
/// any other Rust function. Calling it twice on the same pointer is a
/// double free.
#[no_mangle]
pub extern "C" fn rust_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            // Take ownership and drop the CString
            let _ = CString::from_raw(ptr);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
