//! JSON request dispatcher shared by the native bridges
//!
//! Both the C FFI (iOS) and JNI (Android) bridges are thin: they turn their
//! arguments into a [`BridgeRequest`], hand it to [`dispatch_json`] and return
//! the resulting envelope string.
//!
//! # Response Format
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "Error message" }
//! ```
//!
//! The app context (database, coordinator, catalog client) is created once by
//! [`BridgeRequest::Init`] and lives for the rest of the process.

use crate::catalog::CatalogClient;
use crate::config::AppConfig;
use crate::download::{DownloadCommand, DownloadCoordinator, DownloadUpdate, DownloadedSet};
use crate::error::{PaceError, Result};
use crate::file::EpisodeFiles;
use crate::media;
use crate::playback::{PlaybackSession, PlaybackStatus, ProgressTracker};
use crate::settings::PlaybackSettings;
use crate::storage::{Database, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

lazy_static::lazy_static! {
    pub(crate) static ref RUNTIME: tokio::runtime::Runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("onepace-core")
        .build()
        .expect("Failed to create Tokio runtime");

    static ref CONTEXT: RwLock<Option<Arc<AppContext>>> = RwLock::new(None);
}

/// Everything the bridges need, wired from one config
pub struct AppContext {
    pub config: AppConfig,
    pub database: Database,
    pub store: KeyValueStore,
    pub files: EpisodeFiles,
    pub downloaded: DownloadedSet,
    pub coordinator: DownloadCoordinator,
    pub tracker: ProgressTracker,
    pub catalog: CatalogClient,
    updates: Mutex<broadcast::Receiver<DownloadUpdate>>,
    sessions: Mutex<HashMap<String, PlaybackSession>>,
}

impl AppContext {
    /// Open storage and start the download coordinator
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let database = Database::new(config.database_path()).await?;
        let store = KeyValueStore::new(database.pool().clone());
        let files = EpisodeFiles::new(config.paths());
        files.ensure_downloads_dir().await?;

        let coordinator = DownloadCoordinator::start(&config, store.clone(), files.clone()).await?;
        let updates = Mutex::new(coordinator.subscribe());

        Ok(Self {
            downloaded: DownloadedSet::new(store.clone()),
            tracker: ProgressTracker::new(store.clone()),
            catalog: CatalogClient::new(&config)?,
            config,
            database,
            store,
            files,
            coordinator,
            updates,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Updates published since the last call
    pub async fn drain_updates(&self) -> Vec<DownloadUpdate> {
        let mut receiver = self.updates.lock().await;
        let mut drained = Vec::new();

        loop {
            match receiver.try_recv() {
                Ok(update) => drained.push(update),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Download update consumer lagged");
                }
                Err(_) => break,
            }
        }
        drained
    }

    /// Delete every downloaded file and empty the downloaded set
    pub async fn clear_downloads(&self) -> Result<usize> {
        let busy = self
            .coordinator
            .entries()
            .await?
            .iter()
            .any(|e| e.status.is_in_flight());
        if busy {
            return Err(PaceError::InvalidState(
                "Stop running downloads before clearing storage".to_string(),
            ));
        }

        let removed = self.files.clear_downloads().await?;
        self.coordinator.reconcile().await?;
        info!(removed, "Cleared download directory");
        Ok(removed)
    }

    async fn open_session(&self, episode_id: &str) -> Result<Value> {
        let settings = PlaybackSettings::load(&self.store).await;
        let session = PlaybackSession::open(
            episode_id,
            &self.downloaded,
            &self.files,
            &self.config.media_base_url,
            self.tracker.clone(),
            settings.clone(),
            self.config.progress_write_interval(),
        )
        .await?;

        let response = json!({
            "uri": session.source().uri(),
            "source": session.source(),
            "playsInSilentMode": settings.plays_in_silent_mode(),
            "notifications": settings.notification_policy(),
        });

        let previous = self
            .sessions
            .lock()
            .await
            .insert(episode_id.to_string(), session);
        if let Some(previous) = previous {
            previous.close().await?;
        }

        Ok(response)
    }
}

/// One bridge call
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum BridgeRequest {
    Init {
        config: AppConfig,
    },
    LoadCatalog,
    Download {
        command: DownloadCommand,
    },
    #[serde(rename_all = "camelCase")]
    DownloadEntry {
        episode_id: String,
    },
    DownloadEntries,
    DownloadUpdates,
    Reconcile,
    ListDownloads,
    ClearDownloads,
    #[serde(rename_all = "camelCase")]
    GetProgress {
        episode_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SetProgress {
        episode_id: String,
        percentage: f64,
    },
    #[serde(rename_all = "camelCase")]
    ClearProgress {
        episode_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MarkFinished {
        episode_id: String,
    },
    AllProgress,
    #[serde(rename_all = "camelCase")]
    OpenPlayback {
        episode_id: String,
    },
    #[serde(rename_all = "camelCase")]
    PlaybackLoaded {
        episode_id: String,
        duration_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    PlaybackStatus {
        episode_id: String,
        status: PlaybackStatus,
    },
    #[serde(rename_all = "camelCase")]
    PlaybackError {
        episode_id: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ClosePlayback {
        episode_id: String,
    },
    GetSettings,
    SetSetting {
        name: String,
        enabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    StreamUrl {
        episode_id: String,
    },
}

/// The initialised context
pub fn context() -> Result<Arc<AppContext>> {
    CONTEXT
        .read()
        .map_err(|_| PaceError::internal("Bridge context lock poisoned"))?
        .clone()
        .ok_or_else(|| PaceError::NotInitialized("Call init before any other bridge function".to_string()))
}

/// Run a request on the bridge runtime
pub fn dispatch(request: BridgeRequest) -> Result<Value> {
    RUNTIME.block_on(handle(request))
}

/// Parse, run and wrap a request in the JSON envelope
pub fn dispatch_json(request_json: &str) -> String {
    let result = serde_json::from_str::<BridgeRequest>(request_json)
        .map_err(PaceError::from)
        .and_then(dispatch);
    result_to_json(result)
}

async fn handle(request: BridgeRequest) -> Result<Value> {
    match request {
        BridgeRequest::Init { config } => init(config).await,
        request => handle_call(context()?, request).await,
    }
}

async fn init(config: AppConfig) -> Result<Value> {
    crate::logging::init_logging(None);

    if let Ok(existing) = context() {
        // A reloaded JS bundle calls init again; keep the running context.
        info!("Bridge already initialised");
        return Ok(json!({ "documentsRoot": existing.config.documents_root }));
    }

    let ctx = AppContext::initialize(config).await?;
    let documents_root = ctx.config.documents_root.clone();
    *CONTEXT
        .write()
        .map_err(|_| PaceError::internal("Bridge context lock poisoned"))? = Some(Arc::new(ctx));

    info!(documents_root = %documents_root.display(), "Bridge initialised");
    Ok(json!({ "documentsRoot": documents_root }))
}

fn no_session(episode_id: &str) -> PaceError {
    PaceError::InvalidState(format!("No playback session for {}", episode_id))
}

async fn handle_call(ctx: Arc<AppContext>, request: BridgeRequest) -> Result<Value> {
    let value = match request {
        BridgeRequest::Init { .. } => return Err(PaceError::InvalidState("Already initialised".to_string())),
        BridgeRequest::LoadCatalog => to_value(ctx.catalog.load().await)?,
        BridgeRequest::Download { command } => to_value(ctx.coordinator.execute(command).await?)?,
        BridgeRequest::DownloadEntry { episode_id } => {
            to_value(ctx.coordinator.entry(&episode_id).await?)?
        }
        BridgeRequest::DownloadEntries => to_value(ctx.coordinator.entries().await?)?,
        BridgeRequest::DownloadUpdates => to_value(ctx.drain_updates().await)?,
        BridgeRequest::Reconcile => to_value(ctx.coordinator.reconcile().await?)?,
        BridgeRequest::ListDownloads => to_value(ctx.files.list_downloaded().await?)?,
        BridgeRequest::ClearDownloads => json!({ "removed": ctx.clear_downloads().await? }),
        BridgeRequest::GetProgress { episode_id } => to_value(ctx.tracker.record(&episode_id).await?)?,
        BridgeRequest::SetProgress {
            episode_id,
            percentage,
        } => {
            ctx.tracker.set_progress(&episode_id, percentage).await?;
            to_value(ctx.tracker.record(&episode_id).await?)?
        }
        BridgeRequest::ClearProgress { episode_id } => {
            json!({ "cleared": ctx.tracker.clear(&episode_id).await? })
        }
        BridgeRequest::MarkFinished { episode_id } => {
            ctx.tracker.mark_finished(&episode_id).await?;
            to_value(ctx.tracker.record(&episode_id).await?)?
        }
        BridgeRequest::AllProgress => to_value(ctx.tracker.load_all().await?)?,
        BridgeRequest::OpenPlayback { episode_id } => ctx.open_session(&episode_id).await?,
        BridgeRequest::PlaybackLoaded {
            episode_id,
            duration_ms,
        } => {
            let mut sessions = ctx.sessions.lock().await;
            let session = sessions
                .get_mut(&episode_id)
                .ok_or_else(|| no_session(&episode_id))?;
            json!({ "seekToMs": session.on_loaded(duration_ms).await })
        }
        BridgeRequest::PlaybackStatus { episode_id, status } => {
            let mut sessions = ctx.sessions.lock().await;
            let session = sessions
                .get_mut(&episode_id)
                .ok_or_else(|| no_session(&episode_id))?;
            session.on_status(status).await?;
            Value::Null
        }
        BridgeRequest::PlaybackError {
            episode_id,
            message,
        } => {
            let session = ctx.sessions.lock().await.remove(&episode_id);
            match session {
                Some(session) => {
                    let action = session.on_error(&message);
                    session.close().await?;
                    to_value(action)?
                }
                None => return Err(no_session(&episode_id)),
            }
        }
        BridgeRequest::ClosePlayback { episode_id } => {
            let session = ctx.sessions.lock().await.remove(&episode_id);
            if let Some(session) = session {
                session.close().await?;
            }
            Value::Null
        }
        BridgeRequest::GetSettings => to_value(PlaybackSettings::load(&ctx.store).await)?,
        BridgeRequest::SetSetting { name, enabled } => {
            let settings = PlaybackSettings::load(&ctx.store).await.with(&name, enabled);
            settings.save(&ctx.store).await?;
            to_value(settings)?
        }
        BridgeRequest::StreamUrl { episode_id } => {
            json!({ "url": media::stream_url(&ctx.config.media_base_url, &episode_id)?.to_string() })
        }
    };

    Ok(value)
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Convert a result to the JSON envelope
pub fn result_to_json<T: Serialize>(result: Result<T>) -> String {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_response(&e.user_message()),
    }
}

pub fn success_response<T: Serialize>(data: T) -> String {
    json!({
        "success": true,
        "data": data
    })
    .to_string()
}

pub fn error_response(error: &str) -> String {
    json!({
        "success": false,
        "error": error
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelopes() {
        let ok: Value = serde_json::from_str(&success_response(json!({ "a": 1 }))).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["data"]["a"], 1);

        let err: Value =
            serde_json::from_str(&result_to_json::<()>(Err(PaceError::CatalogUnavailable("x".into()))))
                .unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "Error loading data.");
    }

    #[test]
    fn test_request_parsing() {
        let request: BridgeRequest = serde_json::from_str(
            r#"{"method":"download","params":{"command":{"type":"stop","episodeId":"E1"}}}"#,
        )
        .unwrap();
        assert!(matches!(
            request,
            BridgeRequest::Download {
                command: DownloadCommand::Stop { .. }
            }
        ));

        let request: BridgeRequest =
            serde_json::from_str(r#"{"method":"setProgress","params":{"episodeId":"E7","percentage":42.5}}"#)
                .unwrap();
        assert!(matches!(request, BridgeRequest::SetProgress { percentage, .. } if percentage == 42.5));

        let request: BridgeRequest = serde_json::from_str(r#"{"method":"loadCatalog"}"#).unwrap();
        assert!(matches!(request, BridgeRequest::LoadCatalog));
    }

    #[test]
    fn test_unknown_method_is_error_envelope() {
        let response: Value = serde_json::from_str(&dispatch_json(r#"{"method":"selfDestruct"}"#)).unwrap();
        assert_eq!(response["success"], false);
    }
}
