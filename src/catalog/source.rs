//! Catalog loading with an on-disk fallback
//!
//! # Flow
//! 1. GET the catalog URL
//! 2. On success, parse it and overwrite the cached copy
//! 3. On any failure, parse the cached copy instead
//! 4. If that fails too the state is [`CatalogState::Error`]; the app keeps
//!    running and shows the message

use crate::catalog::models::Catalog;
use crate::config::AppConfig;
use crate::error::{PaceError, Result};
use crate::file::EpisodeFiles;
use reqwest::Client;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where a loaded catalog came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogOrigin {
    Remote,
    Cache,
}

/// Outcome of a catalog load
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CatalogState {
    Loaded {
        catalog: Catalog,
        origin: CatalogOrigin,
    },
    Error {
        message: String,
    },
}

impl CatalogState {
    pub fn catalog(&self) -> Option<&Catalog> {
        match self {
            CatalogState::Loaded { catalog, .. } => Some(catalog),
            CatalogState::Error { .. } => None,
        }
    }
}

/// Fetches the published catalog
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    url: String,
    cache_path: PathBuf,
}

impl CatalogClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            url: config.catalog_url.clone(),
            cache_path: config.paths().catalog_cache(),
        })
    }

    pub fn cache_path(&self) -> &PathBuf {
        &self.cache_path
    }

    /// Remote catalog, falling back to the cached copy
    pub async fn load(&self) -> CatalogState {
        match self.fetch_remote().await {
            Ok(catalog) => {
                return CatalogState::Loaded {
                    catalog,
                    origin: CatalogOrigin::Remote,
                }
            }
            Err(e) => warn!(url = %self.url, "Catalog fetch failed, trying cache: {}", e),
        }

        match self.load_cached().await {
            Ok(catalog) => {
                info!(path = %self.cache_path.display(), "Loaded catalog from cache");
                CatalogState::Loaded {
                    catalog,
                    origin: CatalogOrigin::Cache,
                }
            }
            Err(e) => {
                warn!(path = %self.cache_path.display(), "Cached catalog unavailable: {}", e);
                CatalogState::Error {
                    message: PaceError::CatalogUnavailable(e.to_string()).user_message(),
                }
            }
        }
    }

    /// Download, validate and cache the catalog
    pub async fn fetch_remote(&self) -> Result<Catalog> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaceError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().await?;
        let catalog = Catalog::from_json(&body)?;

        // A stale cache is still better than none
        if let Err(e) = EpisodeFiles::atomic_write(&self.cache_path, body.as_bytes()).await {
            warn!(path = %self.cache_path.display(), "Failed to cache catalog: {}", e);
        }

        info!(episodes = catalog.episode_count(), "Fetched catalog");
        Ok(catalog)
    }

    /// Parse the cached copy
    pub async fn load_cached(&self) -> Result<Catalog> {
        if !EpisodeFiles::file_exists(&self.cache_path).await {
            return Err(PaceError::FileNotFound(self.cache_path.display().to_string()));
        }

        let raw = tokio::fs::read_to_string(&self.cache_path).await?;
        Catalog::from_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"Saga": {"Arc": {"status": "complete", "episodes": {"Episode 1": {"id": "abc"}}}}}"#;

    fn client(server_url: &str, dir: &std::path::Path) -> CatalogClient {
        let mut config = AppConfig::with_documents_root(dir);
        config.catalog_url = format!("{}/episodes.json", server_url);
        CatalogClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_remote_success_writes_cache() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/episodes.json")
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&server.url(), dir.path());

        let state = client.load().await;
        assert!(matches!(
            state,
            CatalogState::Loaded {
                origin: CatalogOrigin::Remote,
                ..
            }
        ));
        assert_eq!(
            tokio::fs::read_to_string(client.cache_path()).await.unwrap(),
            BODY
        );
    }

    #[tokio::test]
    async fn test_invalid_remote_body_does_not_replace_cache() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/episodes.json")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&server.url(), dir.path());
        tokio::fs::write(client.cache_path(), BODY).await.unwrap();

        let state = client.load().await;
        assert!(matches!(
            state,
            CatalogState::Loaded {
                origin: CatalogOrigin::Cache,
                ..
            }
        ));
        assert_eq!(
            tokio::fs::read_to_string(client.cache_path()).await.unwrap(),
            BODY
        );
    }

    #[tokio::test]
    async fn test_no_remote_no_cache_is_error_state() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/episodes.json")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = client(&server.url(), dir.path()).load().await;

        assert_eq!(
            state,
            CatalogState::Error {
                message: "Error loading data.".to_string()
            }
        );
        assert!(state.catalog().is_none());
    }
}
