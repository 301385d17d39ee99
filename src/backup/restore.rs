//! Backup restoration for cartbackup
//!
//! Restores a live profile directory from a retained backup. A fresh safety
//! backup of the live profile is always taken first, and the restored tree is
//! prepared in a staging directory beside the live one and swapped in with
//! two renames, so a crash never leaves the live directory half-written.

use std::ffi::OsString;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{BackupError, BackupResult};
use crate::models::{BackupEntry, BackupId};
use crate::storage::{file_io, new_holder_id, LockGuard};

use super::manager::{release_quietly, BackupEngine, BackupReport};
use super::snapshot::SnapshotStats;

const STAGING_SUFFIX: &str = ".restore-staging";
const ASIDE_SUFFIX: &str = ".restore-previous";

/// Result of a completed restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// The backup that now populates the live profile directory
    pub restored: BackupEntry,
    /// The backup of the live profile taken just before the swap
    pub safety_backup: BackupReport,
}

impl RestoreReport {
    /// Human-readable summary for confirmation dialogs
    pub fn summary(&self) -> String {
        format!(
            "Restored {} ({} files). Previous profile saved as {}",
            self.restored.id, self.restored.file_count, self.safety_backup.entry.id
        )
    }
}

/// Handles restoring from backups
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    engine: BackupEngine,
}

impl RestoreEngine {
    /// Create a new RestoreEngine sharing the backup engine's store and lock
    pub fn new(engine: BackupEngine) -> Self {
        Self { engine }
    }

    /// Replace the contents of `live_dir` with backup `id`
    pub async fn restore(&self, id: &BackupId, live_dir: &Path) -> BackupResult<RestoreReport> {
        let holder = new_holder_id("restore");
        let guard = self
            .engine
            .store()
            .lock()
            .acquire(&holder, self.engine.lock_options())
            .await?;

        let result = self.restore_locked(&guard, id, live_dir).await;
        release_quietly(guard).await;
        result
    }

    async fn restore_locked(
        &self,
        guard: &LockGuard,
        id: &BackupId,
        live_dir: &Path,
    ) -> BackupResult<RestoreReport> {
        let store = self.engine.store();
        let (index, _) = store.read_index().await;

        let target = index
            .find(id)
            .cloned()
            .ok_or_else(|| BackupError::backup_not_found(id.as_str()))?;
        let target_dir = store.backup_dir(id);
        if !is_dir(&target_dir).await {
            return Err(BackupError::backup_not_found(id.as_str()));
        }

        // Never overwrite live data without a safety copy; the restore target
        // itself must survive this backup's retention pass
        let safety_backup = self
            .engine
            .create_backup_locked(guard, live_dir, Some(id))
            .await?;
        let safety_id = safety_backup.entry.id.to_string();

        let staging = sibling(live_dir, STAGING_SUFFIX);
        remove_leftover(&staging).await?;

        if let Err(e) = self.stage(&target, &target_dir, &staging).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(BackupError::RestoreFailed {
                message: e,
                safety_backup: safety_id,
            });
        }

        swap_into_place(&staging, live_dir)
            .await
            .map_err(|message| BackupError::RestoreFailed {
                message,
                safety_backup: safety_id.clone(),
            })?;

        tracing::info!(
            backup_id = %id,
            safety_backup = %safety_id,
            path = %live_dir.display(),
            "Profile restored"
        );

        Ok(RestoreReport {
            restored: target,
            safety_backup,
        })
    }

    /// Copy the backup into `staging` and check it against the entry
    async fn stage(
        &self,
        target: &BackupEntry,
        target_dir: &Path,
        staging: &Path,
    ) -> Result<(), String> {
        let copied = self
            .engine
            .copier()
            .copy(target_dir, staging)
            .await
            .map_err(|e| e.to_string())?;

        let expected = SnapshotStats {
            size: target.size,
            file_count: target.file_count,
        };
        if copied != expected {
            return Err(format!(
                "backup {} is incomplete: expected {} files / {} bytes, found {} files / {} bytes",
                target.id, expected.file_count, expected.size, copied.file_count, copied.size
            ));
        }
        Ok(())
    }
}

/// Exchange `staging` with `live_dir`
///
/// The old live directory is renamed aside, the staging directory renamed
/// into place, then the aside copy deleted. If the second rename fails the
/// aside directory is renamed back.
async fn swap_into_place(staging: &Path, live_dir: &Path) -> Result<(), String> {
    let aside = sibling(live_dir, ASIDE_SUFFIX);
    remove_leftover(&aside).await.map_err(|e| e.to_string())?;

    let had_live = match fs::rename(live_dir, &aside).await {
        Ok(()) => true,
        Err(e) if e.kind() == IoErrorKind::NotFound => false,
        Err(e) => {
            let _ = fs::remove_dir_all(staging).await;
            return Err(format!(
                "could not move {} aside: {}",
                live_dir.display(),
                e
            ));
        }
    };

    if let Err(e) = fs::rename(staging, live_dir).await {
        let _ = fs::remove_dir_all(staging).await;
        if had_live {
            if let Err(rollback) = fs::rename(&aside, live_dir).await {
                tracing::error!(
                    path = %aside.display(),
                    error = %rollback,
                    "Rollback failed; previous profile left aside"
                );
                return Err(format!(
                    "could not move restored files into place ({}) and the previous profile \
                     could not be put back ({}); it remains at {}",
                    e,
                    rollback,
                    aside.display()
                ));
            }
        }
        return Err(format!(
            "could not move restored files into place: {}; profile left unchanged",
            e
        ));
    }

    if let Some(parent) = live_dir.parent() {
        file_io::sync_dir(parent).await;
    }

    if had_live {
        if let Err(e) = fs::remove_dir_all(&aside).await {
            tracing::warn!(
                path = %aside.display(),
                error = %e,
                "Failed to delete previous profile directory after restore"
            );
        }
    }

    Ok(())
}

/// `<parent>/.<name><suffix>`, next to `dir` on the same filesystem
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dir.file_name().unwrap_or_default());
    name.push(suffix);
    dir.with_file_name(name)
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Remove a staging or aside directory left by a crashed restore
async fn remove_leftover(path: &Path) -> BackupResult<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => {
            tracing::warn!(path = %path.display(), "Removed leftover directory from an interrupted restore");
            Ok(())
        }
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::Io(format!(
            "Failed to remove leftover {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupSettings;
    use crate::storage::{IndexStore, LockOptions};
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_env() -> (RestoreEngine, BackupEngine, PathBuf, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let live = temp_dir.path().join("profiles").join("studio");
        std::fs::create_dir_all(live.join("hotkeys")).unwrap();
        std::fs::write(live.join("state.json"), r#"{"version":1}"#).unwrap();
        std::fs::write(live.join("hotkeys").join("page-1.json"), "[]").unwrap();

        let store = IndexStore::new(temp_dir.path().join("backups").join("studio"), "studio");
        let options = LockOptions {
            timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
        };
        let engine = BackupEngine::new(store, options);
        (RestoreEngine::new(engine.clone()), engine, live, temp_dir)
    }

    #[test]
    fn test_sibling_paths() {
        let live = Path::new("/data/profiles/studio");
        assert_eq!(
            sibling(live, STAGING_SUFFIX),
            Path::new("/data/profiles/.studio.restore-staging")
        );
    }

    #[tokio::test]
    async fn test_restore_replaces_live_state() {
        let (restore, engine, live, _temp) = create_test_env();
        let backup = engine.create_backup(&live).await.unwrap().entry;

        std::fs::write(live.join("state.json"), r#"{"version":2}"#).unwrap();
        std::fs::write(live.join("extra.json"), "new file").unwrap();

        let report = restore.restore(&backup.id, &live).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(live.join("state.json")).unwrap(),
            r#"{"version":1}"#
        );
        assert!(!live.join("extra.json").exists());
        assert_eq!(report.restored, backup);

        let safety_dir = engine.store().backup_dir(&report.safety_backup.entry.id);
        assert_eq!(
            std::fs::read_to_string(safety_dir.join("state.json")).unwrap(),
            r#"{"version":2}"#
        );
        assert_eq!(engine.list_backups().await[0], report.safety_backup.entry);
        assert!(report.summary().contains(backup.id.as_str()));
    }

    #[tokio::test]
    async fn test_restore_leaves_no_side_directories() {
        let (restore, engine, live, temp) = create_test_env();
        let backup = engine.create_backup(&live).await.unwrap().entry;

        restore.restore(&backup.id, &live).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path().join("profiles"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["studio".to_string()]);
        assert!(!engine.store().lock().path().exists());
    }

    #[tokio::test]
    async fn test_unknown_backup_is_not_found() {
        let (restore, engine, live, _temp) = create_test_env();
        engine.create_backup(&live).await.unwrap();

        let err = restore
            .restore(&BackupId::generate(1, 99), &live)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(engine.list_backups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_found() {
        let (restore, engine, live, _temp) = create_test_env();
        let backup = engine.create_backup(&live).await.unwrap().entry;
        std::fs::remove_dir_all(engine.store().backup_dir(&backup.id)).unwrap();

        let err = restore.restore(&backup.id, &live).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(engine.list_backups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_incomplete_backup_fails_and_keeps_live() {
        let (restore, engine, live, _temp) = create_test_env();
        let backup = engine.create_backup(&live).await.unwrap().entry;
        std::fs::remove_file(engine.store().backup_dir(&backup.id).join("state.json")).unwrap();
        std::fs::write(live.join("state.json"), r#"{"version":2}"#).unwrap();

        let err = restore.restore(&backup.id, &live).await.unwrap_err();

        match err {
            BackupError::RestoreFailed { safety_backup, .. } => {
                assert_eq!(engine.list_backups().await[0].id.as_str(), safety_backup);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            std::fs::read_to_string(live.join("state.json")).unwrap(),
            r#"{"version":2}"#
        );
        assert!(!sibling(&live, STAGING_SUFFIX).exists());
    }

    #[tokio::test]
    async fn test_failed_safety_backup_aborts() {
        let (restore, engine, live, temp) = create_test_env();
        let backup = engine.create_backup(&live).await.unwrap().entry;

        let err = restore
            .restore(&backup.id, &temp.path().join("profiles").join("gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotFailed { .. }));
        assert_eq!(engine.list_backups().await, vec![backup]);
    }

    #[tokio::test]
    async fn test_safety_backup_does_not_prune_target() {
        let (restore, engine, live, _temp) = create_test_env();
        engine
            .update_settings(BackupSettings {
                max_count: 1,
                max_age_ms: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        let backup = engine.create_backup(&live).await.unwrap().entry;

        let report = restore.restore(&backup.id, &live).await.unwrap();

        assert!(report.safety_backup.pruned.is_empty());
        assert!(engine.store().backup_dir(&backup.id).exists());
        assert_eq!(engine.list_backups().await.len(), 2);
    }

    #[tokio::test]
    async fn test_leftover_staging_is_replaced() {
        let (restore, engine, live, _temp) = create_test_env();
        let backup = engine.create_backup(&live).await.unwrap().entry;
        let staging = sibling(&live, STAGING_SUFFIX);
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("junk"), "from a crash").unwrap();

        restore.restore(&backup.id, &live).await.unwrap();

        assert!(!staging.exists());
        assert!(!live.join("junk").exists());
    }

    #[tokio::test]
    async fn test_failed_swap_puts_live_back() {
        let temp_dir = TempDir::new().unwrap();
        let live = temp_dir.path().join("studio");
        std::fs::create_dir_all(&live).unwrap();
        std::fs::write(live.join("state.json"), r#"{"version":2}"#).unwrap();
        let staging = sibling(&live, STAGING_SUFFIX);

        let err = swap_into_place(&staging, &live).await.unwrap_err();

        assert!(err.contains("profile left unchanged"), "{}", err);
        assert_eq!(
            std::fs::read_to_string(live.join("state.json")).unwrap(),
            r#"{"version":2}"#
        );
        assert!(!sibling(&live, ASIDE_SUFFIX).exists());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_swap_replaces_live_and_removes_aside() {
        let temp_dir = TempDir::new().unwrap();
        let live = temp_dir.path().join("studio");
        let staging = sibling(&live, STAGING_SUFFIX);
        std::fs::create_dir_all(&live).unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(live.join("state.json"), "old").unwrap();
        std::fs::write(staging.join("state.json"), "new").unwrap();

        swap_into_place(&staging, &live).await.unwrap();

        assert_eq!(std::fs::read_to_string(live.join("state.json")).unwrap(), "new");
        assert!(!sibling(&live, ASIDE_SUFFIX).exists());
        assert!(!staging.exists());
    }
}
