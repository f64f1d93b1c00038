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


//! JNI bridge for Android - Exposes the core to React Native
//!
//! Every function takes the bridge `params` object as a JSON string (or
//! nothing, for parameterless calls) and forwards it to the shared dispatcher
//! in [`crate::bridge`].
//!
//! # Architecture
//! JavaScript (React Native) → Kotlin (ExpoOnePaceModule) → JNI → Rust
//!
//! # Response Format
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "Error message" }
//! ```

use crate::bridge::{dispatch_json, error_response};
use crate::error::PaceError;
use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert JString to Rust String
fn jstring_to_string(env: &mut JNIEnv, jstr: JString) -> crate::Result<String> {
    env.get_string(&jstr)
        .map(|s| s.into())
        .map_err(|e| PaceError::JniError(format!("JNI string conversion failed: {}", e)))
}

/// Hand a response back to Java; null if the JVM refuses the allocation
fn to_jstring(env: &mut JNIEnv, response: String) -> jstring {
    match env.new_string(response) {
        Ok(output) => output.into_raw(),
        Err(e) => {
            error!("Failed to create Java string: {}", e);
            std::ptr::null_mut()
        }
    }
}

/// Wrap a function call with panic catching
fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
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

/// Build `{"method": .., "params": ..}` and dispatch it
fn bridge_call(method: &str, params_json: Option<&str>) -> String {
    let params = match params_json.map(serde_json::from_str::<serde_json::Value>) {
        None => None,
        Some(Ok(params)) => Some(params),
        Some(Err(e)) => {
            return error_response(&PaceError::InvalidInput(format!("Invalid JSON: {}", e)).user_message())
        }
    };

    let request = match params {
        Some(params) => serde_json::json!({ "method": method, "params": params }),
        None => serde_json::json!({ "method": method }),
    };
    dispatch_json(&request.to_string())
}

/// JNI entry taking a params JSON string
fn call_with_params(env: &mut JNIEnv, method: &str, params_json: JString) -> jstring {
    // Convert before entering the closure to keep the env borrow out of it
    let params_str = match jstring_to_string(env, params_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(env, error_response(&e.user_message())),
    };

    let response = catch_panic(move || bridge_call(method, Some(&params_str)));
    to_jstring(env, response)
}

/// JNI entry without parameters
fn call_without_params(env: &mut JNIEnv, method: &str) -> jstring {
    let response = catch_panic(move || bridge_call(method, None));
    to_jstring(env, response)
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Open storage and start the download coordinator
///
/// # Arguments (JSON string)
/// ```json
/// { "config": { "documentsRoot": "/data/user/0/.../files" } }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeInit(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "init", params_json)
}

/// Full `{"method": .., "params": ..}` request
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeDispatch(
    mut env: JNIEnv,
    _class: JClass,
    request_json: JString,
) -> jstring {
    let request = match jstring_to_string(&mut env, request_json) {
        Ok(s) => s,
        Err(e) => return to_jstring(&mut env, error_response(&e.user_message())),
    };

    let response = catch_panic(move || dispatch_json(&request));
    to_jstring(&mut env, response)
}

// ============================================================================
// CATALOG
// ============================================================================

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeLoadCatalog(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "loadCatalog")
}

/// # Arguments (JSON string)
/// ```json
/// { "episodeId": "abc123" }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeStreamUrl(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "streamUrl", params_json)
}

// ============================================================================
// DOWNLOADS
// ============================================================================

/// Send a download command
///
/// # Arguments (JSON string)
/// ```json
/// { "command": { "type": "pause", "episodeId": "abc123" } }
/// ```
///
/// # Returns (JSON)
/// ```json
/// {
///   "success": true,
///   "data": { "episodeId": "abc123", "status": "paused", "progressFraction": 0.42 }
/// }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeDownloadCommand(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "download", params_json)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeDownloadEntries(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "downloadEntries")
}

/// Updates published since the previous poll; Kotlin emits each as an event
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativePollDownloadUpdates(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "downloadUpdates")
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeReconcileDownloads(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "reconcile")
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeClearDownloads(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "clearDownloads")
}

// ============================================================================
// PROGRESS
// ============================================================================

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeGetProgress(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "getProgress", params_json)
}

/// # Arguments (JSON string)
/// ```json
/// { "episodeId": "abc123", "percentage": 42.5 }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeSetProgress(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "setProgress", params_json)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeMarkFinished(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "markFinished", params_json)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeClearProgress(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "clearProgress", params_json)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeAllProgress(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "allProgress")
}

// ============================================================================
// PLAYBACK
// ============================================================================

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeOpenPlayback(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "openPlayback", params_json)
}

/// # Arguments (JSON string)
/// ```json
/// { "episodeId": "abc123", "durationMs": 1440000 }
/// ```
///
/// # Returns (JSON)
/// ```json
/// { "success": true, "data": { "seekToMs": 604800 } }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativePlaybackLoaded(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "playbackLoaded", params_json)
}

/// # Arguments (JSON string)
/// ```json
/// {
///   "episodeId": "abc123",
///   "status": { "positionMs": 1000, "durationMs": 1440000, "isLoaded": true }
/// }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativePlaybackStatus(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "playbackStatus", params_json)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativePlaybackError(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "playbackError", params_json)
}

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeClosePlayback(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "closePlayback", params_json)
}

// ============================================================================
// SETTINGS
// ============================================================================

#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeGetSettings(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    call_without_params(&mut env, "getSettings")
}

/// # Arguments (JSON string)
/// ```json
/// { "name": "silentmode", "enabled": true }
/// ```
#[no_mangle]
pub extern "C" fn Java_expo_modules_onepace_ExpoOnePaceModule_nativeSetSetting(
    mut env: JNIEnv,
    _class: JClass,
    params_json: JString,
) -> jstring {
    call_with_params(&mut env, "setSetting", params_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_panic_normal() {
        let result = catch_panic(|| "normal result".to_string());
        assert_eq!(result, "normal result");
    }

    #[test]
    fn test_catch_panic_with_panic() {
        let result = catch_panic(|| {
            panic!("test panic");
        });
        assert!(result.contains("\"success\":false"));
        assert!(result.contains("test panic"));
    }

    #[test]
    fn test_bridge_call_rejects_bad_params() {
        let response = bridge_call("getProgress", Some("{not json"));
        assert!(response.contains("\"success\":false"));
    }
}
