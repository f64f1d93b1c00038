//! Playback settings
//!
//! The settings screen stores its switches as one JSON object under
//! [`keys::SWITCH_STATES`]. The player reads them once when a session opens
//! and keeps that snapshot for the lifetime of the session.

use crate::error::Result;
use crate::storage::{keys, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Switch names understood by the player
pub mod switches {
    /// Keep audio playing when the device is muted
    pub const SILENT_MODE: &str = "silentmode";
    /// Suppress notification banners during playback
    pub const HIDE_NOTIFICATION: &str = "hidenotification";
    /// Suppress notification sounds during playback
    pub const SILENCE_NOTIFICATION: &str = "silencenotification";
    /// Vibrate on notifications during playback
    pub const VIBRATE_NOTIFICATION: &str = "vibratenotification";
}

/// How notifications behave while a video is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPolicy {
    pub show_alert: bool,
    pub play_sound: bool,
    pub vibrate: bool,
}

/// Immutable snapshot of the switch states
///
/// Unknown keys (and non-boolean values) are carried through untouched so
/// saving a snapshot never drops switches this crate doesn't know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybackSettings {
    values: Map<String, Value>,
}

impl PlaybackSettings {
    /// Read the stored switches, all-off when missing or unreadable
    pub async fn load(store: &KeyValueStore) -> Self {
        match store.get_json::<Map<String, Value>>(keys::SWITCH_STATES).await {
            Ok(Some(values)) => Self { values },
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("Failed to read playback settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, store: &KeyValueStore) -> Result<()> {
        store.set_json(keys::SWITCH_STATES, &self.values).await
    }

    /// Value of a switch, `false` when unset or not a boolean
    pub fn get(&self, name: &str) -> bool {
        self.values.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Snapshot with one switch set
    pub fn with(&self, name: &str, enabled: bool) -> Self {
        let mut values = self.values.clone();
        values.insert(name.to_string(), Value::Bool(enabled));
        Self { values }
    }

    /// Snapshot with one switch flipped
    pub fn toggled(&self, name: &str) -> Self {
        self.with(name, !self.get(name))
    }

    pub fn plays_in_silent_mode(&self) -> bool {
        self.get(switches::SILENT_MODE)
    }

    /// Read by switch name, so "hide" and "silence" switch the alert and sound off
    pub fn notification_policy(&self) -> NotificationPolicy {
        NotificationPolicy {
            show_alert: !self.get(switches::HIDE_NOTIFICATION),
            play_sound: !self.get(switches::SILENCE_NOTIFICATION),
            vibrate: self.get(switches::VIBRATE_NOTIFICATION),
        }
    }
}
