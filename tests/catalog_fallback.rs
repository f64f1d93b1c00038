//! Catalog loading across an online launch followed by offline launches

use onepace_core::catalog::{CatalogClient, CatalogOrigin, CatalogState};
use onepace_core::config::AppConfig;

const CATALOG: &str = r#"{
    "East Blue": {
        "Romance Dawn": {
            "status": "complete",
            "nepisodes": 4,
            "dub": ["en"],
            "sub": ["en", "it"],
            "resolution": ["480p", "720p", "1080p"],
            "episodes": {
                "Romance Dawn 01": {"id": "RD01"},
                "Romance Dawn 02": {"id": "RD02"}
            }
        },
        "Orange Town": {
            "status": "to be redone",
            "episodes": {"Orange Town 01": {"id": "OT01"}}
        }
    }
}"#;

fn client_for(server_url: &str, dir: &std::path::Path) -> CatalogClient {
    let mut config = AppConfig::with_documents_root(dir);
    config.catalog_url = format!("{}/episodes.json", server_url);
    CatalogClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_offline_launch_uses_last_good_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = mockito::Server::new_async().await;

    // Online launch
    let online = server
        .mock("GET", "/episodes.json")
        .with_status(200)
        .with_body(CATALOG)
        .create_async()
        .await;

    let client = client_for(&server.url(), dir.path());
    let first = match client.load().await {
        CatalogState::Loaded { catalog, origin } => {
            assert_eq!(origin, CatalogOrigin::Remote);
            catalog
        }
        CatalogState::Error { message } => panic!("unexpected error: {}", message),
    };
    assert_eq!(first.episode_count(), 3);
    online.assert_async().await;
    online.remove_async().await;

    // Host down on the next launch
    let _down = server
        .mock("GET", "/episodes.json")
        .with_status(503)
        .create_async()
        .await;

    match client.load().await {
        CatalogState::Loaded { catalog, origin } => {
            assert_eq!(origin, CatalogOrigin::Cache);
            assert_eq!(catalog, first);
            assert!(catalog.find_episode("OT01").is_some());
        }
        CatalogState::Error { message } => panic!("unexpected error: {}", message),
    }
}

#[tokio::test]
async fn test_first_launch_offline_is_error_state() {
    let dir = tempfile::tempdir().unwrap();
    // Nothing listens on the discard port
    let client = client_for("http://127.0.0.1:9", dir.path());

    let state = client.load().await;
    assert!(state.catalog().is_none());
    match state {
        CatalogState::Error { message } => assert_eq!(message, "Error loading data."),
        CatalogState::Loaded { .. } => panic!("expected error state"),
    }
}

#[tokio::test]
async fn test_corrupt_cache_is_error_state() {
    let dir = tempfile::tempdir().unwrap();
    let client = client_for("http://127.0.0.1:9", dir.path());
    tokio::fs::write(client.cache_path(), b"{ truncated").await.unwrap();

    assert!(matches!(client.load().await, CatalogState::Error { .. }));
}
