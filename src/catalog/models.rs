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


//! Catalog tree
//!
//! The published JSON nests sagas, arcs and episodes as objects keyed by
//! display name:
//!
//! ```json
//! {
//!   "Romance Dawn": {
//!     "Romance Dawn": {
//!       "status": "complete",
//!       "nepisodes": 4,
//!       "dub": ["en"], "sub": ["en", "it"], "resolution": ["480p", "720p"],
//!       "episodes": { "Episode 1": { "id": "7m6KDEuw" } }
//!     }
//!   }
//! }
//! ```
//!
//! Key order is meaningful (it is the story order), so the tree is read from a
//! `serde_json::Value` parsed with `preserve_order` rather than into maps.

use crate::error::{PaceError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Release status of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArcStatus {
    Complete,
    ToBeRedone,
    WorkInProgress,
    Unknown,
}

impl ArcStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "complete" => ArcStatus::Complete,
            "to be redone" => ArcStatus::ToBeRedone,
            "work in progress" => ArcStatus::WorkInProgress,
            _ => ArcStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArcStatus::Complete => "complete",
            ArcStatus::ToBeRedone => "to be redone",
            ArcStatus::WorkInProgress => "work in progress",
            ArcStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub name: String,
    pub id: String,
}

impl Episode {
    /// Number in the display name, e.g. 3 for "Episode 3"
    pub fn number(&self) -> Option<u32> {
        let digits: String = self
            .name
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryArc {
    pub name: String,
    pub status: ArcStatus,
    /// Announced episode count, may differ from `episodes.len()` while in progress
    pub episode_count: Option<u32>,
    pub dub: Vec<String>,
    pub sub: Vec<String>,
    pub resolution: Vec<String>,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Saga {
    pub name: String,
    pub arcs: Vec<StoryArc>,
}

/// Whole catalog, in published order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub sagas: Vec<Saga>,
}

/// Location of an episode in the tree
#[derive(Debug, Clone, Copy)]
pub struct EpisodeRef<'a> {
    pub saga: &'a Saga,
    pub arc: &'a StoryArc,
    pub episode: &'a Episode,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Build the tree from parsed JSON
    ///
    /// The top level and each saga must be objects. Arcs or episodes that
    /// don't have the expected shape are skipped with a warning.
    pub fn from_value(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| PaceError::InvalidData("Catalog root must be an object".to_string()))?;

        let mut sagas = Vec::with_capacity(root.len());
        for (saga_name, saga_value) in root {
            let arcs_obj = saga_value.as_object().ok_or_else(|| {
                PaceError::InvalidData(format!("Saga '{}' must be an object", saga_name))
            })?;

            let arcs = arcs_obj
                .iter()
                .filter_map(|(arc_name, arc_value)| match arc_value.as_object() {
                    Some(arc) => Some(parse_arc(arc_name, arc)),
                    None => {
                        warn!(saga = %saga_name, arc = %arc_name, "Skipping malformed arc");
                        None
                    }
                })
                .collect();

            sagas.push(Saga {
                name: saga_name.clone(),
                arcs,
            });
        }

        Ok(Self { sagas })
    }

    pub fn find_episode(&self, episode_id: &str) -> Option<EpisodeRef<'_>> {
        self.sagas.iter().find_map(|saga| {
            saga.arcs.iter().find_map(|arc| {
                arc.episodes
                    .iter()
                    .find(|e| e.id == episode_id)
                    .map(|episode| EpisodeRef { saga, arc, episode })
            })
        })
    }

    /// Every episode id, in catalog order
    pub fn episode_ids(&self) -> Vec<&str> {
        self.sagas
            .iter()
            .flat_map(|s| s.arcs.iter())
            .flat_map(|a| a.episodes.iter())
            .map(|e| e.id.as_str())
            .collect()
    }

    pub fn episode_count(&self) -> usize {
        self.sagas
            .iter()
            .flat_map(|s| s.arcs.iter())
            .map(|a| a.episodes.len())
            .sum()
    }
}

fn parse_arc(name: &str, arc: &Map<String, Value>) -> StoryArc {
    let strings = |key: &str| -> Vec<String> {
        arc.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let episodes = arc
        .get("episodes")
        .and_then(Value::as_object)
        .map(|episodes| {
            episodes
                .iter()
                .filter_map(|(episode_name, episode)| {
                    let id = episode.get("id").and_then(Value::as_str);
                    if id.is_none() {
                        warn!(arc = %name, episode = %episode_name, "Skipping episode without id");
                    }
                    id.map(|id| Episode {
                        name: episode_name.clone(),
                        id: id.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    StoryArc {
        name: name.to_string(),
        status: arc
            .get("status")
            .and_then(Value::as_str)
            .map(ArcStatus::parse)
            .unwrap_or(ArcStatus::Unknown),
        episode_count: arc
            .get("nepisodes")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        dub: strings("dub"),
        sub: strings("sub"),
        resolution: strings("resolution"),
        episodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Romance Dawn": {
            "Romance Dawn": {
                "status": "complete",
                "nepisodes": 2,
                "dub": [],
                "sub": ["en"],
                "resolution": ["720p"],
                "episodes": {
                    "Episode 2": { "id": "bbb" },
                    "Episode 1": { "id": "aaa" }
                }
            },
            "Orange Town": {
                "status": "to be redone",
                "episodes": { "Episode 1": { "id": "ccc" }, "Broken": {} }
            }
        },
        "East Blue": {
            "Loguetown": { "status": "Work In Progress", "episodes": {} },
            "Weird": 42
        }
    }"#;

    #[test]
    fn test_order_is_preserved() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();

        let sagas: Vec<&str> = catalog.sagas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(sagas, vec!["Romance Dawn", "East Blue"]);
        assert_eq!(catalog.episode_ids(), vec!["bbb", "aaa", "ccc"]);
        assert_eq!(catalog.episode_count(), 3);
    }

    #[test]
    fn test_arc_fields() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let first = &catalog.sagas[0].arcs[0];

        assert_eq!(first.status, ArcStatus::Complete);
        assert_eq!(first.episode_count, Some(2));
        assert_eq!(first.sub, vec!["en"]);
        assert_eq!(first.episodes[0].number(), Some(2));

        assert_eq!(catalog.sagas[0].arcs[1].status, ArcStatus::ToBeRedone);
        assert_eq!(catalog.sagas[1].arcs[0].status, ArcStatus::WorkInProgress);
        assert_eq!(catalog.sagas[1].arcs.len(), 1);
        assert_eq!(ArcStatus::parse("on hold"), ArcStatus::Unknown);
    }

    #[test]
    fn test_find_episode() {
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        let found = catalog.find_episode("ccc").unwrap();

        assert_eq!(found.saga.name, "Romance Dawn");
        assert_eq!(found.arc.name, "Orange Town");
        assert!(catalog.find_episode("zzz").is_none());
    }

    #[test]
    fn test_non_object_root_is_invalid() {
        assert!(matches!(
            Catalog::from_json("[1, 2]"),
            Err(PaceError::InvalidData(_))
        ));
        assert!(Catalog::from_json("{not json").is_err());
    }
}
