//! File store for downloaded episodes
//!
//! Path generation lives in [`paths`], disk operations in [`manager`].

pub mod manager;
pub mod paths;

// Re-export commonly used types
pub use manager::{DownloadedFile, EpisodeFiles};
pub use paths::{partial_path, validate_episode_id, EpisodePaths};
