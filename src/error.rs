//! Custom error types for cartbackup
//!
//! This module defines the error hierarchy for the backup engine using
//! thiserror for ergonomic error definitions. Every failure that crosses the
//! engine boundary maps to an [`ErrorKind`] so the UI bridge can report it
//! without inspecting message text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for backup engine operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Another backup or restore held the lock for longer than the timeout
    #[error("Timed out after {waited_ms} ms waiting for lock {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    /// The primary metadata file could not be parsed
    #[error("Backup metadata is corrupt: {0}")]
    MetadataCorrupt(String),

    /// Neither the metadata file nor its `.bak` copy could be parsed
    #[error("Backup metadata is unrecoverable, index was reinitialized: {0}")]
    MetadataUnrecoverable(String),

    /// I/O failure while copying a profile into a backup directory
    #[error("Snapshot of {source_dir} failed: {cause}")]
    SnapshotFailed { source_dir: String, cause: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Failure while swapping a backup into the live profile directory
    #[error("Restore failed: {message}. The pre-restore backup {safety_backup} is available")]
    RestoreFailed {
        message: String,
        safety_backup: String,
    },

    /// Lock file errors other than a timeout
    #[error("Lock error: {0}")]
    Lock(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Validation errors for settings and ids
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Machine-readable classification of a [`BackupError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    LockTimeout,
    MetadataCorrupt,
    MetadataUnrecoverable,
    SnapshotFailed,
    NotFound,
    RestoreFailed,
    Lock,
    Config,
    Io,
    Json,
    Validation,
}

impl ErrorKind {
    /// Whether an operation failing this way may succeed if simply retried
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::LockTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl BackupError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a snapshot failure for the given source directory
    pub fn snapshot_failed(source_dir: &std::path::Path, cause: impl fmt::Display) -> Self {
        Self::SnapshotFailed {
            source_dir: source_dir.display().to_string(),
            cause: cause.to_string(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::MetadataCorrupt(_) => ErrorKind::MetadataCorrupt,
            Self::MetadataUnrecoverable(_) => ErrorKind::MetadataUnrecoverable,
            Self::SnapshotFailed { .. } => ErrorKind::SnapshotFailed,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RestoreFailed { .. } => ErrorKind::RestoreFailed,
            Self::Lock(_) => ErrorKind::Lock,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the caller may simply try again later
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for backup engine operations
pub type BackupResult<T> = Result<T, BackupError>;
