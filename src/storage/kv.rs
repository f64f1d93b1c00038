//! Persistent key-value store
//!
//! Durable string-keyed storage in the shape the mobile app already uses:
//! every value is a JSON document stored under a flat key. There are no
//! transactions and no multi-key atomic operations; callers that need
//! read-modify-write do it themselves (see `download::index`).

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Well-known keys
pub mod keys {
    /// JSON array of downloaded episode ids
    pub const DOWNLOADED_EPISODES: &str = "downloaded_episodes";

    /// JSON map of named boolean settings
    pub const SWITCH_STATES: &str = "switchStates";

    /// Prefix of per-episode playback progress records
    pub const PROGRESS_PREFIX: &str = "progress_";

    /// Prefix of the older raw-millisecond position records
    pub const LEGACY_POSITION_PREFIX: &str = "video_position_";

    pub fn progress(episode_id: &str) -> String {
        format!("{}{}", PROGRESS_PREFIX, episode_id)
    }

    pub fn legacy_position(episode_id: &str) -> String {
        format!("{}{}", LEGACY_POSITION_PREFIX, episode_id)
    }
}

/// Key-value store backed by the `KeyValue` table
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    pool: SqlitePool,
}

impl KeyValueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Raw value for a key
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM KeyValue WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Insert or overwrite a raw value
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO KeyValue (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a key, returns whether it existed
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM KeyValue WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deserialize the JSON stored under a key
    ///
    /// Absent keys are `Ok(None)`; malformed JSON is an error so callers can
    /// log it before substituting their default.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize a value to JSON and store it
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }

    /// All keys starting with `prefix`, sorted
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM KeyValue WHERE substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Key/value pairs for every key starting with `prefix`
    pub async fn entries_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT key, value FROM KeyValue WHERE substr(key, 1, ?) = ? ORDER BY key",
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(String, String)> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }

    /// Remove every key, returns the number removed
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM KeyValue")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
