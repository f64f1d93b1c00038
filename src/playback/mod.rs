//! Playback progress and sessions

pub mod session;
pub mod tracker;

pub use session::{PlaybackAction, PlaybackSession, PlaybackSource, PlaybackStatus};
pub use tracker::{percentage_of, ProgressDisplay, ProgressRecord, ProgressTracker};
