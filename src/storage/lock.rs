//! Advisory lock file
//!
//! Serializes every mutating backup operation on a profile, across tasks and
//! across processes. The lock is a file created with `create_new`; its content
//! records who holds it and since when, so a holder that crashed can be
//! detected by age and its lock reclaimed.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::error::{BackupError, BackupResult};

const INITIAL_BACKOFF: Duration = Duration::from_millis(20);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Contents of the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Identifier of the holder
    pub holder: String,
    /// Acquisition time in epoch milliseconds
    pub acquired_at: i64,
    /// Process id of the holder, for diagnostics
    pub pid: u32,
}

/// Timing parameters for lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long to wait for a live holder before giving up
    pub timeout: Duration,
    /// Age after which a lock is presumed abandoned by a crashed holder
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            stale_after: Duration::from_secs(600),
        }
    }
}

enum Attempt {
    Acquired,
    Busy,
    /// The previous lock was removed; try again immediately
    Retry,
}

/// Handle to a lock file path
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Create a handle for the lock at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, retrying with backoff until `options.timeout`
    pub async fn acquire(&self, holder: &str, options: LockOptions) -> BackupResult<LockGuard> {
        let started = Instant::now();
        let deadline = started + options.timeout;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.attempt(holder, options.stale_after).await? {
                Attempt::Acquired => return Ok(self.guard(holder)),
                Attempt::Retry => continue,
                Attempt::Busy => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BackupError::LockTimeout {
                    path: self.path.display().to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }

            tracing::debug!(holder, path = %self.path.display(), "Lock busy, retrying");
            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Acquire the lock only if it is free right now
    ///
    /// A stale lock is still reclaimed. Returns `None` when a live holder
    /// owns the lock.
    pub async fn try_acquire(
        &self,
        holder: &str,
        stale_after: Duration,
    ) -> BackupResult<Option<LockGuard>> {
        // One retry covers the case where a stale lock was just reclaimed
        for _ in 0..2 {
            match self.attempt(holder, stale_after).await? {
                Attempt::Acquired => return Ok(Some(self.guard(holder))),
                Attempt::Busy => return Ok(None),
                Attempt::Retry => {}
            }
        }
        Ok(None)
    }

    /// Whether a live (non-stale) holder currently owns the lock
    pub async fn is_held(&self, stale_after: Duration) -> bool {
        match self.age().await {
            Ok(Some(age)) => age < stale_after,
            Ok(None) => false,
            Err(_) => true,
        }
    }

    /// Read the current lock record, if the lock exists and is readable
    pub async fn read_record(&self) -> Option<LockRecord> {
        let bytes = fs::read(&self.path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Remove the lock file if it is still owned by `holder`
    ///
    /// Returns whether the file was removed.
    pub async fn release(&self, holder: &str) -> BackupResult<bool> {
        match self.read_record().await {
            Some(record) if record.holder == holder => {}
            Some(record) => {
                tracing::warn!(
                    holder,
                    current_holder = %record.holder,
                    "Lock is owned by another holder, not releasing"
                );
                return Ok(false);
            }
            None => return Ok(false),
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackupError::Lock(format!(
                "Failed to remove lock {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn guard(&self, holder: &str) -> LockGuard {
        LockGuard {
            lock: self.clone(),
            holder: holder.to_string(),
            released: false,
        }
    }

    async fn attempt(&self, holder: &str, stale_after: Duration) -> BackupResult<Attempt> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(mut file) => {
                let record = LockRecord {
                    holder: holder.to_string(),
                    acquired_at: Utc::now().timestamp_millis(),
                    pid: std::process::id(),
                };
                let written = async {
                    let json = serde_json::to_vec(&record)?;
                    file.write_all(&json).await?;
                    file.sync_all().await?;
                    Ok::<_, BackupError>(())
                }
                .await;

                if let Err(e) = written {
                    drop(file);
                    let _ = fs::remove_file(&self.path).await;
                    return Err(BackupError::Lock(format!(
                        "Failed to write lock {}: {}",
                        self.path.display(),
                        e
                    )));
                }
                Ok(Attempt::Acquired)
            }
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                self.reclaim_if_stale(stale_after).await
            }
            Err(e) => Err(BackupError::Lock(format!(
                "Failed to create lock {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn reclaim_if_stale(&self, stale_after: Duration) -> BackupResult<Attempt> {
        let seen = self.read_record().await;
        let age = match self.age().await {
            Ok(Some(age)) => age,
            // Released between our create and our read
            Ok(None) => return Ok(Attempt::Retry),
            Err(e) => return Err(e),
        };

        if age < stale_after {
            return Ok(Attempt::Busy);
        }

        // Only remove the lock we judged stale, not one a faster reclaimer
        // has already replaced
        if self.read_record().await != seen {
            return Ok(Attempt::Retry);
        }

        tracing::warn!(
            path = %self.path.display(),
            stale_holder = seen.as_ref().map(|r| r.holder.as_str()).unwrap_or("unknown"),
            age_ms = age.as_millis() as u64,
            "Reclaiming stale backup lock"
        );

        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(Attempt::Retry),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Attempt::Retry),
            Err(e) => Err(BackupError::Lock(format!(
                "Failed to reclaim stale lock {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Age of the current lock, or `None` if no lock exists
    ///
    /// Uses the recorded acquisition time, falling back to the file's
    /// modification time when the record is unreadable (e.g. a holder that
    /// crashed mid-write).
    async fn age(&self) -> BackupResult<Option<Duration>> {
        if let Some(record) = self.read_record().await {
            let elapsed = Utc::now().timestamp_millis() - record.acquired_at;
            return Ok(Some(Duration::from_millis(elapsed.max(0) as u64)));
        }

        match fs::metadata(&self.path).await {
            Ok(meta) => {
                let modified = meta.modified()?;
                let age = SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or_default();
                Ok(Some(age))
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackupError::Lock(format!(
                "Failed to inspect lock {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Proof of lock ownership
///
/// Call [`LockGuard::release`] when done. A guard dropped without release
/// (e.g. on panic) still removes the lock file if it is still ours.
#[derive(Debug)]
pub struct LockGuard {
    lock: LockFile,
    holder: String,
    released: bool,
}

impl LockGuard {
    /// Identifier this guard holds the lock under
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Release the lock
    pub async fn release(mut self) -> BackupResult<()> {
        self.released = true;
        if !self.lock.release(&self.holder).await? {
            tracing::warn!(
                holder = %self.holder,
                path = %self.lock.path.display(),
                "Lock was already gone or reclaimed at release"
            );
        }
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        // Best-effort removal; ignore errors
        let owned = std::fs::read(&self.lock.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<LockRecord>(&bytes).ok())
            .is_some_and(|record| record.holder == self.holder);
        if owned {
            let _ = std::fs::remove_file(&self.lock.path);
        }
    }
}

/// Generate a holder id unique to this process and call
pub fn new_holder_id(purpose: &str) -> String {
    format!(
        "{}:{}:{}",
        purpose,
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    )
}
