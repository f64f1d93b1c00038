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


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use onepace_core::catalog::{CatalogClient, CatalogState};
use onepace_core::config::AppConfig;
use onepace_core::download::{DownloadCoordinator, DownloadStatus, SpeedTracker, TransferProgress};
use onepace_core::file::EpisodeFiles;
use onepace_core::logging::init_logging;
use onepace_core::playback::ProgressTracker;
use onepace_core::storage::{Database, KeyValueStore};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "onepace-cli")]
#[command(about = "OnePace CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Documents directory standing in for the app sandbox
    #[arg(short, long, default_value = "./onepace-data")]
    root: PathBuf,

    /// JSON config file; `--root` still overrides its documents root
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "onepace_core=debug"
    #[arg(long)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the catalog and print its sagas and arcs
    Catalog,
    /// Download an episode, printing progress until it finishes
    Download {
        /// Episode ID
        episode_id: String,
    },
    /// Delete a downloaded episode
    Delete {
        /// Episode ID
        episode_id: String,
    },
    /// Read or change watch progress
    Progress {
        #[command(subcommand)]
        action: ProgressAction,
    },
    /// List episode files in the download directory
    ListDownloads,
    /// Resynchronise the downloaded set with the download directory
    Reconcile,
    /// Delete every downloaded episode
    ClearStorage,
}

#[derive(Subcommand)]
enum ProgressAction {
    Get { episode_id: String },
    Set { episode_id: String, percentage: f64 },
    Clear { episode_id: String },
    Finish { episode_id: String },
    /// Every stored record
    List,
}

struct Core {
    config: AppConfig,
    store: KeyValueStore,
    files: EpisodeFiles,
}

impl Core {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading config {}", path.display()))?;
                AppConfig::from_json(&raw)?
            }
            None => AppConfig::default(),
        };
        config.documents_root = cli.root.clone();
        config.validate()?;

        let database = Database::new(config.database_path())
            .await
            .context("opening database")?;
        let store = KeyValueStore::new(database.pool().clone());
        let files = EpisodeFiles::new(config.paths());
        files.ensure_downloads_dir().await?;

        Ok(Self {
            config,
            store,
            files,
        })
    }

    async fn coordinator(&self) -> anyhow::Result<DownloadCoordinator> {
        let coordinator =
            DownloadCoordinator::start(&self.config, self.store.clone(), self.files.clone()).await?;
        Ok(coordinator)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    let core = Core::open(&cli).await?;

    match &cli.command {
        Commands::Catalog => print_catalog(&core).await?,
        Commands::Download { episode_id } => download(&core, episode_id).await?,
        Commands::Delete { episode_id } => {
            let coordinator = core.coordinator().await?;
            let entry = coordinator.delete(episode_id).await?;
            println!("{} is now {}", entry.episode_id, entry.status.as_str());
            coordinator.shutdown().await?;
        }
        Commands::Progress { action } => progress(&core, action).await?,
        Commands::ListDownloads => {
            let downloads = core.files.list_downloaded().await?;
            if downloads.is_empty() {
                println!("No downloaded episodes");
            }
            for file in downloads {
                println!(
                    "{:<16} {:>12}  {}",
                    file.episode_id,
                    TransferProgress::bytes_string(file.size_bytes),
                    file.path.display()
                );
            }
        }
        Commands::Reconcile => {
            let coordinator = core.coordinator().await?;
            let report = coordinator.reconcile().await?;
            println!("Added: {:?}", report.added);
            println!("Removed: {:?}", report.removed);
            coordinator.shutdown().await?;
        }
        Commands::ClearStorage => {
            let removed = core.files.clear_downloads().await?;
            let coordinator = core.coordinator().await?;
            coordinator.reconcile().await?;
            coordinator.shutdown().await?;
            println!("Removed {} episode file(s)", removed);
        }
    }

    Ok(())
}

async fn print_catalog(core: &Core) -> anyhow::Result<()> {
    let client = CatalogClient::new(&core.config)?;

    match client.load().await {
        CatalogState::Loaded { catalog, origin } => {
            println!("Catalog ({:?}), {} episodes", origin, catalog.episode_count());
            for saga in &catalog.sagas {
                println!("{}", saga.name);
                for arc in &saga.arcs {
                    println!(
                        "  {:<40} {:<16} {} episode(s)",
                        arc.name,
                        arc.status.as_str(),
                        arc.episodes.len()
                    );
                }
            }
            Ok(())
        }
        CatalogState::Error { message } => bail!(message),
    }
}

async fn download(core: &Core, episode_id: &str) -> anyhow::Result<()> {
    let coordinator = core.coordinator().await?;
    let mut updates = coordinator.subscribe();
    let mut speed = SpeedTracker::new();

    let entry = coordinator.start_download(episode_id).await?;
    if entry.status == DownloadStatus::Downloaded {
        println!("{} is already downloaded", episode_id);
        return Ok(coordinator.shutdown().await?);
    }

    let outcome = loop {
        tokio::select! {
            update = updates.recv() => {
                let update = match update {
                    Ok(update) => update,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(e) => return Err(e).context("coordinator closed"),
                };
                if update.episode_id != episode_id {
                    continue;
                }

                if let Some(bytes) = update.bytes_written {
                    speed.add_position(bytes);
                    print!(
                        "\r{:>6.1}%  {:>10}  {:>12}",
                        update.progress_fraction * 100.0,
                        TransferProgress::bytes_string(bytes),
                        speed.speed_string()
                    );
                    std::io::stdout().flush().ok();
                }

                match (update.status, update.error) {
                    (DownloadStatus::Downloaded, _) => break Ok(()),
                    (_, Some(error)) => break Err(anyhow::anyhow!(error)),
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                coordinator.pause(episode_id).await?;
                println!("\nDownload paused");
                break Ok(());
            }
        }
    };

    println!();
    coordinator.shutdown().await?;
    outcome
}

async fn progress(core: &Core, action: &ProgressAction) -> anyhow::Result<()> {
    let tracker = ProgressTracker::new(core.store.clone());

    let record = match action {
        ProgressAction::Get { episode_id } => tracker.record(episode_id).await?,
        ProgressAction::Set {
            episode_id,
            percentage,
        } => {
            tracker.set_progress(episode_id, *percentage).await?;
            tracker.record(episode_id).await?
        }
        ProgressAction::Clear { episode_id } => {
            let cleared = tracker.clear(episode_id).await?;
            println!("{}", if cleared { "Cleared" } else { "Nothing stored" });
            return Ok(());
        }
        ProgressAction::Finish { episode_id } => {
            tracker.mark_finished(episode_id).await?;
            tracker.record(episode_id).await?
        }
        ProgressAction::List => {
            for record in tracker.load_all().await? {
                println!("{:<16} {:?}", record.episode_id, record.display());
            }
            return Ok(());
        }
    };

    println!("{:<16} {:?}", record.episode_id, record.display());
    Ok(())
}
