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


//! Resumable HTTP transfer of one episode file
//!
//! # Resume mechanism
//! 1. Bytes land in `{file}.part` next to the destination; the write
//!    position is the size of that partial file
//! 2. A non-zero position is sent as `Range: bytes={position}-`
//! 3. `206 Partial Content` appends; the total comes from `Content-Range`
//! 4. `200 OK` means the server ignored the range, the file is restarted
//! 5. `416` with `Content-Range: bytes */{total}` equal to the position
//!    means there was nothing left to fetch
//!
//! Only a verified, complete file is renamed onto the destination, so a file
//! at the destination path is always a finished download.
//!
//! A transfer is driven by [`ResumableTransfer::run`] until it completes,
//! fails, or the pause signal fires. Pausing flushes what was received and
//! hands the transfer back so the caller can run it again later.

use crate::download::progress::TransferProgress;
use crate::error::{PaceError, Result};
use crate::file::{partial_path, EpisodeFiles};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Write buffer size
const DOWNLOAD_BUFF_SZ: usize = 64 * 1024;

/// Reconnect attempts for transient failures within one run
const MAX_RETRIES: u32 = 2;

/// How a run ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// File is complete on disk
    Completed(TransferProgress),
    /// Pause signal received, `.part` file kept
    Paused(TransferProgress),
}

/// Download of a single URL into a single file
#[derive(Debug)]
pub struct ResumableTransfer {
    client: Client,
    url: String,
    path: PathBuf,
    partial: PathBuf,
    content_length: Option<u64>,
    write_position: u64,
}

impl ResumableTransfer {
    /// Transfer into `path` with nothing known about the remote file yet
    ///
    /// `run` still continues from a `.part` file left at the partial path;
    /// delete it first for a clean start.
    pub fn new(client: Client, url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            client,
            url: url.into(),
            partial: partial_path(&path),
            path,
            content_length: None,
            write_position: 0,
        }
    }

    /// Transfer that continues from the `.part` file of `path`
    pub async fn from_partial(
        client: Client,
        url: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut transfer = Self::new(client, url, path);
        transfer.sync_write_position().await?;
        Ok(transfer)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where received bytes are written until the transfer completes
    pub fn partial_path(&self) -> &Path {
        &self.partial
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress::new(self.write_position, self.content_length)
    }

    /// Run until completion, failure or pause
    ///
    /// `on_progress` is called after every chunk written. Dropping the pause
    /// sender counts as a pause.
    pub async fn run<F>(
        &mut self,
        mut pause: oneshot::Receiver<()>,
        mut on_progress: F,
    ) -> Result<TransferOutcome>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let mut retries = 0;

        loop {
            // Bytes that were buffered when a previous attempt failed never
            // reached the disk; the file size is the truth.
            self.sync_write_position().await?;

            let attempt = self.run_once(&mut pause, &mut on_progress).await;
            match attempt {
                Err(e) if e.is_retryable() && retries < MAX_RETRIES => {
                    retries += 1;
                    let backoff = Duration::from_secs(u64::from(retries));
                    warn!(url = %self.url, retries, "Transfer interrupted, reconnecting: {}", e);

                    tokio::select! {
                        _ = &mut pause => return Ok(TransferOutcome::Paused(self.progress())),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                other => return other,
            }
        }
    }

    async fn run_once<F>(
        &mut self,
        pause: &mut oneshot::Receiver<()>,
        on_progress: &mut F,
    ) -> Result<TransferOutcome>
    where
        F: FnMut(TransferProgress) + Send,
    {
        let response = tokio::select! {
            _ = &mut *pause => return Ok(TransferOutcome::Paused(self.progress())),
            response = self.request_next_byte_range() => response?,
        };

        let response = match response {
            Some(response) => response,
            None => return self.finish().await,
        };

        let mut options = OpenOptions::new();
        options.create(true);
        if self.write_position == 0 {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(&self.partial).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFF_SZ, file);
        let mut stream = response.bytes_stream();

        loop {
            tokio::select! {
                biased;
                _ = &mut *pause => {
                    writer.flush().await?;
                    debug!(path = %self.partial.display(), written = self.write_position, "Transfer paused");
                    return Ok(TransferOutcome::Paused(self.progress()));
                }
                chunk = stream.next() => match chunk {
                    Some(chunk) => {
                        let chunk = chunk?;
                        writer.write_all(&chunk).await?;
                        self.write_position += chunk.len() as u64;
                        on_progress(self.progress());
                    }
                    None => break,
                },
            }
        }

        writer.flush().await?;
        drop(writer);

        if let Some(total) = self.content_length {
            if self.write_position < total {
                return Err(PaceError::network_error(
                    format!("Connection closed at {}/{} bytes", self.write_position, total),
                    true,
                ));
            }
        }

        self.finish().await
    }

    /// Verify the partial file and move it onto the destination
    async fn finish(&mut self) -> Result<TransferOutcome> {
        let size = if EpisodeFiles::file_exists(&self.partial).await {
            EpisodeFiles::get_file_size(&self.partial).await?
        } else {
            0
        };

        if size == 0 {
            return Err(PaceError::MissingDownloadResult(self.path.display().to_string()));
        }

        if let Some(total) = self.content_length {
            if size != total {
                return Err(PaceError::FileSizeMismatch {
                    expected: total,
                    actual: size,
                });
            }
        }

        tokio::fs::rename(&self.partial, &self.path).await.map_err(|e| {
            PaceError::FileIoError(format!(
                "Failed to move {} into place: {}",
                self.partial.display(),
                e
            ))
        })?;

        self.write_position = size;
        self.content_length.get_or_insert(size);
        info!(path = %self.path.display(), bytes = size, "Transfer complete");

        Ok(TransferOutcome::Completed(self.progress()))
    }

    async fn sync_write_position(&mut self) -> Result<()> {
        self.write_position = if EpisodeFiles::file_exists(&self.partial).await {
            EpisodeFiles::get_file_size(&self.partial).await?
        } else {
            0
        };
        Ok(())
    }

    /// Request the bytes not yet on disk
    ///
    /// `Ok(None)` means the server has nothing beyond the current position.
    async fn request_next_byte_range(&mut self) -> Result<Option<Response>> {
        let mut request = self.client.get(&self.url);
        if self.write_position > 0 {
            request = request.header(RANGE, format!("bytes={}-", self.write_position));
        }

        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {
                if self.write_position > 0 {
                    warn!(url = %self.url, "Server ignored range request, restarting from zero");
                    self.write_position = 0;
                }
                self.content_length = response.content_length();
                Ok(Some(response))
            }
            StatusCode::PARTIAL_CONTENT => {
                let (start, total) = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range)
                    .ok_or_else(|| {
                        PaceError::DownloadFailed("Missing or invalid Content-Range".to_string())
                    })?;

                if start != self.write_position {
                    return Err(PaceError::FileSizeMismatch {
                        expected: self.write_position,
                        actual: start,
                    });
                }
                if let (Some(known), Some(total)) = (self.content_length, total) {
                    if known != total {
                        return Err(PaceError::FileSizeMismatch {
                            expected: known,
                            actual: total,
                        });
                    }
                }

                self.content_length = total.or(self.content_length);
                Ok(Some(response))
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let total = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("bytes */"))
                    .and_then(|v| v.trim().parse::<u64>().ok());

                match total {
                    Some(total) if total == self.write_position => {
                        self.content_length = Some(total);
                        Ok(None)
                    }
                    _ => Err(PaceError::DownloadFailed(
                        "Range not satisfiable, the remote file may have changed".to_string(),
                    )),
                }
            }
            status => Err(PaceError::UnexpectedStatusCode {
                status_code: status.as_u16(),
                url: self.url.clone(),
            }),
        }
    }
}

/// Parse `bytes {start}-{end}/{total}`, the total may be `*`
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;

    let start = start.trim().parse::<u64>().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };

    Some((start, total))
}
