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


//! Download coordinator
//!
//! One task owns every [`DownloadEntry`] of the session and the handles of the
//! running transfers. Front-ends talk to it through the cloneable
//! [`DownloadCoordinator`] handle; transfer tasks talk to it through the same
//! channel, tagging every message with the generation of the run that sent
//! it. When a run is paused, stopped or replaced its generation is retired,
//! so progress or completion arriving late from that run is dropped instead
//! of overwriting newer state.
//!
//! # Commands
//! - `start`: idle → downloading, fresh file
//! - `pause`: downloading → paused, partial file kept
//! - `resume`: paused → downloading, continues from the partial file
//! - `stop`: downloading/paused → idle, partial file deleted
//! - `delete`: downloaded → idle, file deleted and removed from the set
//!
//! Commands that don't apply to the current status are no-ops and return the
//! unchanged entry.

use crate::config::AppConfig;
use crate::download::index::{DownloadedSet, DriftReport};
use crate::download::progress::TransferProgress;
use crate::download::state::{DownloadEntry, DownloadEvent, DownloadStatus};
use crate::download::transfer::{ResumableTransfer, TransferOutcome};
use crate::error::{PaceError, Result};
use crate::file::{validate_episode_id, EpisodeFiles};
use crate::media;
use crate::storage::KeyValueStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the update broadcast; slow subscribers see `Lagged`
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// User command, as sent over the bridge
///
/// `{"type": "start", "episodeId": "abc123"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownloadCommand {
    Start {
        #[serde(rename = "episodeId")]
        episode_id: String,
    },
    Pause {
        #[serde(rename = "episodeId")]
        episode_id: String,
    },
    Resume {
        #[serde(rename = "episodeId")]
        episode_id: String,
    },
    Stop {
        #[serde(rename = "episodeId")]
        episode_id: String,
    },
    Delete {
        #[serde(rename = "episodeId")]
        episode_id: String,
    },
}

impl DownloadCommand {
    pub fn episode_id(&self) -> &str {
        match self {
            DownloadCommand::Start { episode_id }
            | DownloadCommand::Pause { episode_id }
            | DownloadCommand::Resume { episode_id }
            | DownloadCommand::Stop { episode_id }
            | DownloadCommand::Delete { episode_id } => episode_id,
        }
    }
}

/// Change notification for one episode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUpdate {
    pub episode_id: String,
    pub status: DownloadStatus,
    pub progress_fraction: f64,
    /// Bytes on disk, only set for progress updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    /// Display message when the update was caused by a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum Message {
    Command {
        command: DownloadCommand,
        respond_to: oneshot::Sender<Result<DownloadEntry>>,
    },
    Entry {
        episode_id: String,
        respond_to: oneshot::Sender<DownloadEntry>,
    },
    Entries {
        respond_to: oneshot::Sender<Vec<DownloadEntry>>,
    },
    Reconcile {
        respond_to: oneshot::Sender<Result<DriftReport>>,
    },
    Progress {
        episode_id: String,
        generation: u64,
        progress: TransferProgress,
    },
    Finished {
        episode_id: String,
        generation: u64,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to the download coordinator task
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    commands: mpsc::UnboundedSender<Message>,
    updates: broadcast::Sender<DownloadUpdate>,
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Command { command, .. } => write!(f, "Command({:?})", command),
            Message::Entry { episode_id, .. } => write!(f, "Entry({})", episode_id),
            Message::Entries { .. } => write!(f, "Entries"),
            Message::Reconcile { .. } => write!(f, "Reconcile"),
            Message::Progress { episode_id, generation, .. } => {
                write!(f, "Progress({}, gen {})", episode_id, generation)
            }
            Message::Finished { episode_id, generation } => {
                write!(f, "Finished({}, gen {})", episode_id, generation)
            }
            Message::Shutdown { .. } => write!(f, "Shutdown"),
        }
    }
}

impl DownloadCoordinator {
    /// Spawn the coordinator on the current runtime
    ///
    /// Entries start from the downloaded set. With `reconcile_on_startup` the
    /// set is first brought in line with the download directory.
    pub async fn start(config: &AppConfig, store: KeyValueStore, files: EpisodeFiles) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;

        let downloaded = DownloadedSet::new(store);
        if config.reconcile_on_startup {
            match downloaded.reconcile(&files).await {
                Ok(report) if !report.is_empty() => {
                    info!(added = ?report.added, removed = ?report.removed, "Downloaded set corrected at startup");
                }
                Ok(_) => {}
                Err(e) => warn!("Startup reconcile failed, keeping stored set: {}", e),
            }
        }

        let entries = downloaded
            .load()
            .await
            .into_iter()
            .map(|id| (id.clone(), DownloadEntry::from_index(id, true)))
            .collect();

        let (commands, receiver) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        let actor = CoordinatorActor {
            client,
            media_base_url: config.media_base_url.clone(),
            files,
            downloaded,
            grace: config.stop_grace_period(),
            entries,
            active: HashMap::new(),
            next_generation: 0,
            sender: commands.downgrade(),
            receiver,
            updates: updates.clone(),
        };
        tokio::spawn(actor.run());

        Ok(Self { commands, updates })
    }

    /// Apply a user command
    pub async fn execute(&self, command: DownloadCommand) -> Result<DownloadEntry> {
        validate_episode_id(command.episode_id())?;
        self.request(|respond_to| Message::Command {
            command,
            respond_to,
        })
        .await?
    }

    pub async fn start_download(&self, episode_id: &str) -> Result<DownloadEntry> {
        self.execute(DownloadCommand::Start {
            episode_id: episode_id.to_string(),
        })
        .await
    }

    pub async fn pause(&self, episode_id: &str) -> Result<DownloadEntry> {
        self.execute(DownloadCommand::Pause {
            episode_id: episode_id.to_string(),
        })
        .await
    }

    pub async fn resume(&self, episode_id: &str) -> Result<DownloadEntry> {
        self.execute(DownloadCommand::Resume {
            episode_id: episode_id.to_string(),
        })
        .await
    }

    pub async fn stop(&self, episode_id: &str) -> Result<DownloadEntry> {
        self.execute(DownloadCommand::Stop {
            episode_id: episode_id.to_string(),
        })
        .await
    }

    pub async fn delete(&self, episode_id: &str) -> Result<DownloadEntry> {
        self.execute(DownloadCommand::Delete {
            episode_id: episode_id.to_string(),
        })
        .await
    }

    /// Current entry, idle for episodes never touched this session
    pub async fn entry(&self, episode_id: &str) -> Result<DownloadEntry> {
        validate_episode_id(episode_id)?;
        let episode_id = episode_id.to_string();
        self.request(|respond_to| Message::Entry {
            episode_id,
            respond_to,
        })
        .await
    }

    /// Every entry known this session, sorted by id
    pub async fn entries(&self) -> Result<Vec<DownloadEntry>> {
        self.request(|respond_to| Message::Entries { respond_to }).await
    }

    /// Re-sync the downloaded set with the download directory
    ///
    /// Refused while any transfer is in flight.
    pub async fn reconcile(&self) -> Result<DriftReport> {
        self.request(|respond_to| Message::Reconcile { respond_to })
            .await?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadUpdate> {
        self.updates.subscribe()
    }

    /// Pause every running transfer and stop the coordinator task
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|respond_to| Message::Shutdown { respond_to }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Message) -> Result<T> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(make(respond_to))
            .map_err(|_| PaceError::InvalidState("Download coordinator has shut down".to_string()))?;

        response
            .await
            .map_err(|_| PaceError::internal("Download coordinator dropped the request"))
    }
}

struct ActiveTransfer {
    generation: u64,
    resumed: bool,
    pause_tx: oneshot::Sender<()>,
    handle: JoinHandle<Result<TransferOutcome>>,
}

struct CoordinatorActor {
    client: Client,
    media_base_url: String,
    files: EpisodeFiles,
    downloaded: DownloadedSet,
    grace: Duration,
    entries: HashMap<String, DownloadEntry>,
    active: HashMap<String, ActiveTransfer>,
    next_generation: u64,
    sender: mpsc::WeakUnboundedSender<Message>,
    receiver: mpsc::UnboundedReceiver<Message>,
    updates: broadcast::Sender<DownloadUpdate>,
}

impl CoordinatorActor {
    async fn run(mut self) {
        debug!("Download coordinator started");

        while let Some(message) = self.receiver.recv().await {
            match message {
                Message::Command {
                    command,
                    respond_to,
                } => {
                    let result = self.handle_command(command).await;
                    let _ = respond_to.send(result);
                }
                Message::Entry {
                    episode_id,
                    respond_to,
                } => {
                    let entry = self.entry_mut(&episode_id).clone();
                    let _ = respond_to.send(entry);
                }
                Message::Entries { respond_to } => {
                    let mut entries: Vec<DownloadEntry> = self.entries.values().cloned().collect();
                    entries.sort_by(|a, b| a.episode_id.cmp(&b.episode_id));
                    let _ = respond_to.send(entries);
                }
                Message::Reconcile { respond_to } => {
                    let result = self.reconcile().await;
                    let _ = respond_to.send(result);
                }
                Message::Progress {
                    episode_id,
                    generation,
                    progress,
                } => self.on_progress(&episode_id, generation, progress),
                Message::Finished {
                    episode_id,
                    generation,
                } => self.on_finished(&episode_id, generation).await,
                Message::Shutdown { respond_to } => {
                    self.pause_all().await;
                    let _ = respond_to.send(());
                    break;
                }
            }
        }

        // All handles dropped without a shutdown
        self.pause_all().await;
        debug!("Download coordinator stopped");
    }

    async fn handle_command(&mut self, command: DownloadCommand) -> Result<DownloadEntry> {
        debug!(?command, "Download command");
        match command {
            DownloadCommand::Start { episode_id } => self.start(&episode_id).await,
            DownloadCommand::Pause { episode_id } => self.pause(&episode_id).await,
            DownloadCommand::Resume { episode_id } => self.resume(&episode_id).await,
            DownloadCommand::Stop { episode_id } => self.stop(&episode_id).await,
            DownloadCommand::Delete { episode_id } => self.delete(&episode_id).await,
        }
    }

    async fn start(&mut self, episode_id: &str) -> Result<DownloadEntry> {
        if self.entry_mut(episode_id).status != DownloadStatus::Idle {
            return Ok(self.entry_mut(episode_id).clone());
        }

        let path = self.files.episode_file(episode_id)?;
        let url = media::download_url(&self.media_base_url, episode_id)?;
        if let Err(e) = self.files.ensure_downloads_dir().await {
            warn!(episode_id, "Cannot prepare download directory: {}", e);
            return Err(e);
        }
        // Leftover from a transfer that never finished before a restart
        if let Err(e) = self.files.delete_partial(episode_id).await {
            warn!(episode_id, "Cannot discard stale partial download: {}", e);
            return Err(e);
        }

        let transfer = ResumableTransfer::new(self.client.clone(), url.as_str(), path);
        let entry = self.apply(episode_id, &DownloadEvent::Start, None, None);
        self.spawn_transfer(episode_id, transfer, false);

        info!(episode_id, "Download started");
        Ok(entry)
    }

    async fn pause(&mut self, episode_id: &str) -> Result<DownloadEntry> {
        if self.entry_mut(episode_id).status != DownloadStatus::Downloading {
            return Ok(self.entry_mut(episode_id).clone());
        }

        let outcome = match self.active.remove(episode_id) {
            Some(active) => self.interrupt(episode_id, active).await,
            None => None,
        };

        match outcome {
            Some(Ok(TransferOutcome::Completed(_))) => {
                info!(episode_id, "Download finished before pause took effect");
                Ok(self.complete(episode_id).await)
            }
            Some(Err(e)) => {
                warn!(episode_id, "Transfer failed while pausing: {}", e);
                Ok(self.apply(episode_id, &DownloadEvent::Pause, None, None))
            }
            Some(Ok(TransferOutcome::Paused(progress))) => {
                info!(episode_id, written = progress.bytes_written, "Download paused");
                Ok(self.apply(episode_id, &DownloadEvent::Pause, None, None))
            }
            None => Ok(self.apply(episode_id, &DownloadEvent::Pause, None, None)),
        }
    }

    async fn resume(&mut self, episode_id: &str) -> Result<DownloadEntry> {
        if self.entry_mut(episode_id).status != DownloadStatus::Paused {
            return Ok(self.entry_mut(episode_id).clone());
        }

        let path = self.files.episode_file(episode_id)?;
        let url = media::download_url(&self.media_base_url, episode_id)?;
        let transfer = ResumableTransfer::from_partial(self.client.clone(), url.as_str(), path).await?;

        let entry = self.apply(episode_id, &DownloadEvent::Resume, None, None);
        self.spawn_transfer(episode_id, transfer, true);

        info!(episode_id, "Download resumed");
        Ok(entry)
    }

    async fn stop(&mut self, episode_id: &str) -> Result<DownloadEntry> {
        if !self.entry_mut(episode_id).status.is_in_flight() {
            return Ok(self.entry_mut(episode_id).clone());
        }

        if let Some(active) = self.active.remove(episode_id) {
            let _ = self.interrupt(episode_id, active).await;
        }

        // The transfer may have renamed its file into place while stopping
        let removed = match self.files.delete_partial(episode_id).await {
            Ok(_) => self.files.delete_episode(episode_id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!(episode_id, "Failed to remove partial download: {}", e);
        }

        info!(episode_id, "Download stopped");
        Ok(self.apply(episode_id, &DownloadEvent::Stop, None, None))
    }

    async fn delete(&mut self, episode_id: &str) -> Result<DownloadEntry> {
        if self.entry_mut(episode_id).status != DownloadStatus::Downloaded {
            return Ok(self.entry_mut(episode_id).clone());
        }

        self.files.delete_episode(episode_id).await?;
        self.downloaded.remove(episode_id).await?;

        info!(episode_id, "Download deleted");
        Ok(self.apply(episode_id, &DownloadEvent::Delete, None, None))
    }

    async fn reconcile(&mut self) -> Result<DriftReport> {
        let in_flight = self.entries.values().any(|e| e.status.is_in_flight());
        if in_flight || !self.active.is_empty() {
            return Err(PaceError::InvalidState(
                "Cannot reconcile while downloads are in progress".to_string(),
            ));
        }

        let report = self.downloaded.reconcile(&self.files).await?;

        for id in &report.added {
            let entry = DownloadEntry::from_index(id.clone(), true);
            self.publish(&entry, None, None);
            self.entries.insert(id.clone(), entry);
        }
        for id in &report.removed {
            let entry = DownloadEntry::from_index(id.clone(), false);
            self.publish(&entry, None, None);
            self.entries.insert(id.clone(), entry);
        }

        Ok(report)
    }

    fn on_progress(&mut self, episode_id: &str, generation: u64, progress: TransferProgress) {
        if !self.is_current(episode_id, generation) {
            return;
        }

        let event = DownloadEvent::Progress {
            bytes_written: progress.bytes_written,
            total_bytes: progress.total_bytes,
        };
        let entry = self.entry_mut(episode_id);
        entry.apply(&event);
        let entry = entry.clone();

        self.publish(&entry, Some(progress.bytes_written), None);
    }

    async fn on_finished(&mut self, episode_id: &str, generation: u64) {
        if !self.is_current(episode_id, generation) {
            debug!(episode_id, generation, "Ignoring completion of a retired transfer");
            return;
        }

        let active = match self.active.remove(episode_id) {
            Some(active) => active,
            None => return,
        };

        let outcome = match active.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(PaceError::internal(format!("Transfer task failed: {}", e))),
        };

        match outcome {
            Ok(TransferOutcome::Completed(_)) => {
                self.complete(episode_id).await;
            }
            Ok(TransferOutcome::Paused(_)) => {
                self.apply(episode_id, &DownloadEvent::Pause, None, None);
            }
            Err(e) if active.resumed => {
                warn!(episode_id, "Resumed download failed, keeping partial file: {}", e);
                self.apply(
                    episode_id,
                    &DownloadEvent::ResumeFailed,
                    None,
                    Some(e.user_message()),
                );
            }
            Err(e) => {
                error!(episode_id, "Download failed: {}", e);
                if let Err(e) = self.files.delete_partial(episode_id).await {
                    warn!(episode_id, "Failed to remove partial download: {}", e);
                }
                self.apply(episode_id, &DownloadEvent::Failed, None, Some(e.user_message()));
            }
        }
    }

    /// Record a finished file, the entry is downloaded afterwards
    async fn complete(&mut self, episode_id: &str) -> DownloadEntry {
        // The file is on disk either way; a later reconcile repairs the set.
        if let Err(e) = self.downloaded.add(episode_id).await {
            error!(episode_id, "Failed to record downloaded episode: {}", e);
        }

        info!(episode_id, "Download complete");
        self.apply(episode_id, &DownloadEvent::Completed, None, None)
    }

    fn spawn_transfer(&mut self, episode_id: &str, mut transfer: ResumableTransfer, resumed: bool) {
        self.next_generation += 1;
        let generation = self.next_generation;

        let (pause_tx, pause_rx) = oneshot::channel();
        let sender = self.sender.clone();
        let progress_sender = self.sender.clone();
        let id = episode_id.to_string();
        let progress_id = episode_id.to_string();

        let handle = tokio::spawn(async move {
            let outcome = transfer
                .run(pause_rx, move |progress| {
                    if let Some(tx) = progress_sender.upgrade() {
                        let _ = tx.send(Message::Progress {
                            episode_id: progress_id.clone(),
                            generation,
                            progress,
                        });
                    }
                })
                .await;

            if let Some(tx) = sender.upgrade() {
                let _ = tx.send(Message::Finished {
                    episode_id: id,
                    generation,
                });
            }

            outcome
        });

        self.active.insert(
            episode_id.to_string(),
            ActiveTransfer {
                generation,
                resumed,
                pause_tx,
                handle,
            },
        );
    }

    /// Signal a transfer to pause and wait for it to wind down
    ///
    /// Returns `None` when the task had to be aborted.
    async fn interrupt(
        &self,
        episode_id: &str,
        active: ActiveTransfer,
    ) -> Option<Result<TransferOutcome>> {
        let ActiveTransfer {
            pause_tx,
            mut handle,
            ..
        } = active;
        let _ = pause_tx.send(());

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                warn!(episode_id, "Transfer task ended abnormally: {}", e);
                None
            }
            Err(_) => {
                warn!(episode_id, "Transfer did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
                None
            }
        }
    }

    async fn pause_all(&mut self) {
        let ids: Vec<String> = self.active.keys().cloned().collect();
        for id in ids {
            if let Some(active) = self.active.remove(&id) {
                let _ = self.interrupt(&id, active).await;
                self.apply(&id, &DownloadEvent::Pause, None, None);
            }
        }
    }

    fn is_current(&self, episode_id: &str, generation: u64) -> bool {
        self.active
            .get(episode_id)
            .map(|active| active.generation == generation)
            .unwrap_or(false)
    }

    fn entry_mut(&mut self, episode_id: &str) -> &mut DownloadEntry {
        self.entries
            .entry(episode_id.to_string())
            .or_insert_with(|| DownloadEntry::from_index(episode_id, false))
    }

    /// Feed an event to the entry and publish the result if it changed
    fn apply(
        &mut self,
        episode_id: &str,
        event: &DownloadEvent,
        bytes_written: Option<u64>,
        error: Option<String>,
    ) -> DownloadEntry {
        let entry = self.entry_mut(episode_id);
        let changed = entry.apply(event);
        let entry = entry.clone();

        if changed {
            self.publish(&entry, bytes_written, error);
        }
        entry
    }

    fn publish(&self, entry: &DownloadEntry, bytes_written: Option<u64>, error: Option<String>) {
        // No subscribers is fine
        let _ = self.updates.send(DownloadUpdate {
            episode_id: entry.episode_id.clone(),
            status: entry.status,
            progress_fraction: entry.progress_fraction,
            bytes_written,
            error,
        });
    }
}
