//! File I/O utilities with atomic writes
//!
//! Provides safe JSON file operations that won't corrupt data on failure.
//! Every overwrite first preserves the previous good document as `<file>.bak`,
//! and reads fall back to that copy when the primary file is damaged.

use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::{BackupError, BackupResult};

/// How a document was obtained by [`read_json_with_recovery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The primary file parsed cleanly
    Clean,
    /// Neither the primary file nor its backup exists
    Missing,
    /// The primary file was unreadable; the `.bak` copy was used
    RecoveredFromBackup,
    /// Both the primary file and the `.bak` copy are unreadable
    Unrecoverable,
}

impl Recovery {
    /// Whether the document read may be missing the most recent writes
    pub fn lost_updates(self) -> bool {
        matches!(self, Self::RecoveredFromBackup | Self::Unrecoverable)
    }
}

/// Path of the previous-version copy kept next to `path`
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// Path of the temporary file used while writing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Read JSON from a file, returning an error if the file doesn't exist
pub async fn read_json_required<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let bytes = fs::read(path).await.map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            BackupError::Io(format!("File not found: {}", path.display()))
        } else {
            BackupError::Io(format!("Failed to read {}: {}", path.display(), e))
        }
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        BackupError::MetadataCorrupt(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Read JSON from `path`, falling back to `<path>.bak` when the primary file
/// is missing or damaged
///
/// Never fails: an unreadable document is reported through [`Recovery`] and
/// the caller decides what a fresh value looks like.
pub async fn read_json_with_recovery<T, P>(path: P) -> (Option<T>, Recovery)
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let bak = backup_path(path);

    let primary_err = match read_json_required::<T, _>(path).await {
        Ok(value) => return (Some(value), Recovery::Clean),
        Err(e) => e,
    };

    let primary_exists = fs::try_exists(path).await.unwrap_or(true);
    if primary_exists {
        tracing::warn!(path = %path.display(), error = %primary_err, "Metadata file is corrupt, trying backup copy");
    }

    match read_json_required::<T, _>(&bak).await {
        Ok(value) => {
            tracing::warn!(path = %bak.display(), "Recovered metadata from backup copy");
            (Some(value), Recovery::RecoveredFromBackup)
        }
        Err(bak_err) => {
            let bak_exists = fs::try_exists(&bak).await.unwrap_or(true);
            if !primary_exists && !bak_exists {
                (None, Recovery::Missing)
            } else {
                tracing::error!(
                    path = %path.display(),
                    primary_error = %primary_err,
                    backup_error = %bak_err,
                    "Metadata and its backup copy are both unreadable"
                );
                (None, Recovery::Unrecoverable)
            }
        }
    }
}

/// Write JSON to a file atomically (write to temp, then rename)
///
/// If a valid document already exists at `path` it is first copied verbatim
/// to `<path>.bak`. The new document is then written to `<path>.tmp`, synced
/// to disk and renamed over `path`, so readers only ever see the old or the
/// new complete document.
pub async fn write_json_atomic<T, P>(path: P, data: &T) -> BackupResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            BackupError::Io(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // A damaged primary must not overwrite the last good copy
    if json_file_valid(path).await {
        fs::copy(path, backup_path(path)).await.map_err(|e| {
            BackupError::Io(format!("Failed to preserve {}: {}", path.display(), e))
        })?;
    }

    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| BackupError::Json(format!("Failed to serialize data: {}", e)))?;

    // Create temp file in same directory (important for atomic rename)
    let temp = temp_path(path);

    let mut file = File::create(&temp)
        .await
        .map_err(|e| BackupError::Io(format!("Failed to create temp file: {}", e)))?;

    let written = async {
        file.write_all(&json).await?;
        file.flush().await?;
        // Sync to disk before rename
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(e) = written {
        let _ = fs::remove_file(&temp).await;
        return Err(BackupError::Io(format!("Failed to write temp file: {}", e)));
    }

    // Atomic rename
    if let Err(e) = fs::rename(&temp, path).await {
        // Try to clean up temp file if rename fails
        let _ = fs::remove_file(&temp).await;
        return Err(BackupError::Io(format!("Failed to rename temp file: {}", e)));
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent).await;
    }

    Ok(())
}

/// Check if a JSON file exists and is valid
pub async fn json_file_valid<P: AsRef<Path>>(path: P) -> bool {
    match fs::read(path.as_ref()).await {
        Ok(bytes) => serde_json::from_slice::<serde_json::Value>(&bytes).is_ok(),
        Err(_) => false,
    }
}

/// Flush a directory entry so a completed rename survives power loss
#[cfg(unix)]
pub async fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir).await {
        if let Err(e) = handle.sync_all().await {
            tracing::debug!(path = %dir.display(), error = %e, "Directory sync failed");
        }
    }
}

#[cfg(not(unix))]
pub async fn sync_dir(_dir: &Path) {}
