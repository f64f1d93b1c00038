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


//! Persistent key-value storage
//!
//! This module handles the durable store the rest of the crate reads and
//! writes through. The mobile app kept everything in AsyncStorage as
//! `key -> JSON string`; we keep the same shape on top of SQLite with sqlx.
//!
//! # Usage Example
//! ```no_run
//! use onepace_core::storage::{Database, KeyValueStore, keys};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./onepace.db").await?;
//! let kv = KeyValueStore::new(db.pool().clone());
//!
//! kv.set_json(keys::DOWNLOADED_EPISODES, &vec!["7m6KDEuw"]).await?;
//! let ids: Option<Vec<String>> = kv.get_json(keys::DOWNLOADED_EPISODES).await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod kv;
pub mod migrations;

// Re-export commonly used types
pub use database::Database;
pub use kv::{keys, KeyValueStore};
