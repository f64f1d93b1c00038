//! End-to-end download flows against a local mock file host
//!
//! Run with: cargo test --test download_flow

use mockito::Matcher;
use onepace_core::config::AppConfig;
use onepace_core::download::{DownloadCoordinator, DownloadStatus, DownloadUpdate, DownloadedSet};
use onepace_core::file::EpisodeFiles;
use onepace_core::storage::{Database, KeyValueStore};
use std::io::Write;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    _dir: tempfile::TempDir,
    config: AppConfig,
    store: KeyValueStore,
    files: EpisodeFiles,
}

impl Harness {
    async fn new(server_url: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_documents_root(dir.path());
        config.media_base_url = format!("{}/api/file", server_url);

        let db = Database::new(config.database_path()).await.unwrap();
        let store = KeyValueStore::new(db.pool().clone());
        let files = EpisodeFiles::new(config.paths());

        Self {
            _dir: dir,
            config,
            store,
            files,
        }
    }

    async fn coordinator(&self) -> DownloadCoordinator {
        DownloadCoordinator::start(&self.config, self.store.clone(), self.files.clone())
            .await
            .unwrap()
    }

    fn downloaded(&self) -> DownloadedSet {
        DownloadedSet::new(self.store.clone())
    }
}

/// Wait for the first update on `episode_id` matching `predicate`
async fn wait_for<F>(
    updates: &mut broadcast::Receiver<DownloadUpdate>,
    episode_id: &str,
    predicate: F,
) -> DownloadUpdate
where
    F: Fn(&DownloadUpdate) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match updates.recv().await {
                Ok(update) if update.episode_id == episode_id && predicate(&update) => {
                    return update
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("coordinator closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for download update")
}

/// Body trickled out in small chunks so a transfer stays in flight
fn slow_body(w: &mut dyn Write) -> std::io::Result<()> {
    for _ in 0..200 {
        w.write_all(&[b'x'; 1024])?;
        w.flush()?;
        std::thread::sleep(Duration::from_millis(25));
    }
    Ok(())
}

#[tokio::test]
async fn test_full_download_lands_in_downloaded_set() {
    let mut server = mockito::Server::new_async().await;
    let body = vec![7u8; 64 * 1024];
    let _m = server
        .mock("GET", "/api/file/E1")
        .match_query(Matcher::Exact("download".into()))
        .with_status(200)
        .with_body(body.clone())
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    let entry = coordinator.start_download("E1").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Downloading);

    let done = wait_for(&mut updates, "E1", |u| u.status == DownloadStatus::Downloaded).await;
    assert_eq!(done.progress_fraction, 1.0);

    let path = harness.files.episode_file("E1").unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), body);
    assert!(harness.downloaded().contains("E1").await);

    let listed = harness.files.list_downloaded().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].episode_id, "E1");

    // Starting again is a no-op
    let entry = coordinator.start_download("E1").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Downloaded);
}

#[tokio::test]
async fn test_missing_link_returns_to_idle_with_message() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/api/file/GONE")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    coordinator.start_download("GONE").await.unwrap();
    let failed = wait_for(&mut updates, "GONE", |u| u.error.is_some()).await;

    assert_eq!(failed.status, DownloadStatus::Idle);
    assert_eq!(failed.error.as_deref(), Some("Error link not found"));
    assert!(!harness.files.episode_exists("GONE").await.unwrap());
    assert!(!harness.downloaded().contains("GONE").await);
}

#[tokio::test]
async fn test_pause_keeps_partial_and_resume_completes() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/api/file/E2")
        .match_query(Matcher::Any)
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;
    // The host ignores the range and sends everything again
    let _full = server
        .mock("GET", "/api/file/E2")
        .match_query(Matcher::Any)
        .match_header("range", Matcher::Regex("^bytes=\\d+-$".into()))
        .with_status(200)
        .with_body(vec![b'y'; 4096])
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    coordinator.start_download("E2").await.unwrap();
    wait_for(&mut updates, "E2", |u| u.bytes_written.unwrap_or(0) > 0).await;

    let entry = coordinator.pause("E2").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Paused);

    let path = harness.files.episode_file("E2").unwrap();
    let partial = harness.files.partial_file("E2").unwrap();
    assert!(tokio::fs::metadata(&partial).await.unwrap().len() > 0);
    assert!(!harness.files.episode_exists("E2").await.unwrap());

    let entry = coordinator.resume("E2").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Downloading);

    wait_for(&mut updates, "E2", |u| u.status == DownloadStatus::Downloaded).await;
    assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![b'y'; 4096]);
    assert!(!partial.exists());
    assert!(harness.downloaded().contains("E2").await);
}

#[tokio::test]
async fn test_failed_resume_stays_paused() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/api/file/E3")
        .match_query(Matcher::Any)
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;
    let _gone = server
        .mock("GET", "/api/file/E3")
        .match_query(Matcher::Any)
        .match_header("range", Matcher::Regex("^bytes=\\d+-$".into()))
        .with_status(403)
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    coordinator.start_download("E3").await.unwrap();
    wait_for(&mut updates, "E3", |u| u.bytes_written.unwrap_or(0) > 0).await;
    coordinator.pause("E3").await.unwrap();

    coordinator.resume("E3").await.unwrap();
    let failed = wait_for(&mut updates, "E3", |u| u.error.is_some()).await;

    assert_eq!(failed.status, DownloadStatus::Paused);
    assert!(harness.files.partial_file("E3").unwrap().exists());
    assert!(!harness.files.episode_exists("E3").await.unwrap());
    assert!(!harness.downloaded().contains("E3").await);
}

#[tokio::test]
async fn test_stop_discards_partial_file() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/api/file/E4")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    coordinator.start_download("E4").await.unwrap();
    wait_for(&mut updates, "E4", |u| u.bytes_written.unwrap_or(0) > 0).await;

    let entry = coordinator.stop("E4").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Idle);
    assert_eq!(entry.progress_fraction, 0.0);
    assert!(!harness.files.episode_exists("E4").await.unwrap());
    assert!(!harness.files.partial_file("E4").unwrap().exists());
    assert!(!harness.downloaded().contains("E4").await);
}

#[tokio::test]
async fn test_paused_download_is_not_downloaded_after_restart() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/api/file/E8")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    coordinator.start_download("E8").await.unwrap();
    wait_for(&mut updates, "E8", |u| u.bytes_written.unwrap_or(0) > 0).await;
    coordinator.pause("E8").await.unwrap();
    coordinator.shutdown().await.unwrap();

    // Startup reconcile sees only the partial file
    let coordinator = harness.coordinator().await;
    let entry = coordinator.entry("E8").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Idle);
    assert_eq!(entry.progress_fraction, 0.0);
    assert!(!harness.downloaded().contains("E8").await);
    assert!(harness.files.list_downloaded().await.unwrap().is_empty());

    let report = coordinator.reconcile().await.unwrap();
    assert!(report.added.is_empty());
}

#[tokio::test]
async fn test_shutdown_mid_transfer_is_not_downloaded_after_restart() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("GET", "/api/file/E9")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_chunked_body(slow_body)
        .create_async()
        .await;

    let harness = Harness::new(&server.url()).await;
    let coordinator = harness.coordinator().await;
    let mut updates = coordinator.subscribe();

    coordinator.start_download("E9").await.unwrap();
    wait_for(&mut updates, "E9", |u| u.bytes_written.unwrap_or(0) > 0).await;
    coordinator.shutdown().await.unwrap();

    let coordinator = harness.coordinator().await;
    let entry = coordinator.entry("E9").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Idle);
    assert!(!harness.downloaded().contains("E9").await);
}

#[tokio::test]
async fn test_entries_rebuilt_from_index_without_reconcile() {
    let server = mockito::Server::new_async().await;
    let mut harness = Harness::new(&server.url()).await;
    harness.config.reconcile_on_startup = false;

    // Recorded as downloaded, but the file is gone
    harness.downloaded().add("E5").await.unwrap();

    let coordinator = harness.coordinator().await;
    let entry = coordinator.entry("E5").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Downloaded);
    assert_eq!(entry.progress_fraction, 1.0);
    coordinator.shutdown().await.unwrap();

    // With reconciliation the stale record is dropped
    harness.config.reconcile_on_startup = true;
    let coordinator = harness.coordinator().await;
    let entry = coordinator.entry("E5").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Idle);
    assert!(!harness.downloaded().contains("E5").await);
}

#[tokio::test]
async fn test_delete_with_file_already_missing() {
    let server = mockito::Server::new_async().await;
    let mut harness = Harness::new(&server.url()).await;
    harness.config.reconcile_on_startup = false;
    harness.downloaded().add("E6").await.unwrap();

    let coordinator = harness.coordinator().await;
    let entry = coordinator.delete("E6").await.unwrap();

    assert_eq!(entry.status, DownloadStatus::Idle);
    assert!(!harness.downloaded().contains("E6").await);
}

#[tokio::test]
async fn test_reconcile_picks_up_untracked_file() {
    let server = mockito::Server::new_async().await;
    let harness = Harness::new(&server.url()).await;

    let coordinator = harness.coordinator().await;
    harness.files.ensure_downloads_dir().await.unwrap();
    let path = harness.files.episode_file("E7").unwrap();
    tokio::fs::write(&path, b"episode").await.unwrap();

    let report = coordinator.reconcile().await.unwrap();
    assert_eq!(report.added, vec!["E7".to_string()]);

    let entry = coordinator.entry("E7").await.unwrap();
    assert_eq!(entry.status, DownloadStatus::Downloaded);
}
