//! Episode catalog
//!
//! Read-only saga → arc → episode tree published as a JSON file, plus the
//! client that fetches it and keeps a cached copy for offline starts.

pub mod models;
pub mod source;

pub use models::{ArcStatus, Catalog, Episode, EpisodeRef, Saga, StoryArc};
pub use source::{CatalogClient, CatalogOrigin, CatalogState};
