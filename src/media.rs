//! Media source URLs
//!
//! The file host serves the same asset two ways: `{base}/{id}` is a playable
//! stream, `{base}/{id}?download` is the attachment used for offline copies.
//! No auth headers are needed for either.

use crate::error::Result;
use crate::file::paths::validate_episode_id;
use url::Url;

fn file_url(media_base_url: &str, episode_id: &str) -> Result<Url> {
    validate_episode_id(episode_id)?;
    let raw = format!(
        "{}/{}",
        media_base_url.trim_end_matches('/'),
        urlencoding::encode(episode_id)
    );
    Ok(Url::parse(&raw)?)
}

/// Direct playable stream URL for an episode
pub fn stream_url(media_base_url: &str, episode_id: &str) -> Result<Url> {
    file_url(media_base_url, episode_id)
}

/// Download URL used as the resumable transfer source
pub fn download_url(media_base_url: &str, episode_id: &str) -> Result<Url> {
    let mut url = file_url(media_base_url, episode_id)?;
    url.set_query(Some("download"));
    Ok(url)
}
