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


//! Error types for the OnePace core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by the collaborator they come from (network, file store,
//! key-value store, state machine) so callers at a boundary can decide whether
//! to fall back to a default, retry, or surface a dialog.
//!
//! Most failures in this crate are recovered where they happen: storage reads
//! fall back to empty values, catalog fetches fall back to the cached copy and
//! download failures return the episode to a non-downloaded state. The variants
//! below are what crosses a function boundary before that recovery happens.

use thiserror::Error;

/// Result type alias using our PaceError type
pub type Result<T> = std::result::Result<T, PaceError>;

/// Main error type for the core library
#[derive(Error, Debug)]
pub enum PaceError {
    // ===== Network Errors =====

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned an unexpected status code
    #[error("Server responded with unexpected status code: {status_code}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// Invalid URL built from configuration or an episode id
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ===== Download Errors =====

    /// Generic download failure
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Transfer finished but did not leave a usable file behind
    #[error("Download produced no usable file: {0}")]
    MissingDownloadResult(String),

    /// Resumed transfer disagrees with what is already on disk
    #[error("Download file size mismatch: expected {expected} bytes, got {actual} bytes")]
    FileSizeMismatch {
        expected: u64,
        actual: u64,
    },

    // ===== Catalog Errors =====

    /// Neither the remote catalog nor the cached copy could be loaded
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    // ===== File/Storage Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== Database Errors =====

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== Validation Errors =====

    /// Invalid data format or content
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== State Errors =====

    /// Application state is invalid for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Core has not been initialised through the bridge yet
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    // ===== General Errors =====

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JNI bridge error (Android only)
    #[error("JNI error: {0}")]
    #[cfg(target_os = "android")]
    JniError(String),
}

impl From<url::ParseError> for PaceError {
    fn from(err: url::ParseError) -> Self {
        PaceError::InvalidUrl(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for PaceError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        PaceError::InternalError(format!("UTF-8 conversion error: {}", err))
    }
}

// Helper methods for creating common errors
impl PaceError {
    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        PaceError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        PaceError::InternalError(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        PaceError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if error is retryable (network errors, timeouts, etc.)
    ///
    /// Returns `true` for transient errors that might succeed on retry:
    /// - Network errors marked as transient
    /// - 5xx server responses
    /// - Low level HTTP errors that are connect or timeout failures
    pub fn is_retryable(&self) -> bool {
        match self {
            PaceError::NetworkError { is_transient, .. } => *is_transient,
            PaceError::UnexpectedStatusCode { status_code, .. } => {
                (500..=599).contains(status_code)
            }
            PaceError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            PaceError::FileNotFound(_)
                | PaceError::FileIoError(_)
                | PaceError::IoError(_)
        )
    }

    /// Check if error came from the persistent store
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            PaceError::MigrationFailed(_) | PaceError::SqlxError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    ///
    /// Technical details are dropped where the UI can't do anything with them.
    pub fn user_message(&self) -> String {
        match self {
            PaceError::NetworkError { .. } | PaceError::ReqwestError(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            PaceError::UnexpectedStatusCode { status_code: 404, .. } => {
                "Error link not found".to_string()
            }
            PaceError::CatalogUnavailable(_) => "Error loading data.".to_string(),
            PaceError::MissingDownloadResult(_) | PaceError::DownloadFailed(_) => {
                "Download failed. Please try again.".to_string()
            }
            PaceError::FileSizeMismatch { .. } => {
                "The partial download no longer matches the server copy. Please download it again."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}
