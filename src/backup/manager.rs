//! Backup manager for cartbackup
//!
//! Creates snapshots of a profile directory, records them in the backup
//! index and enforces the retention policy, all while holding the profile's
//! lock.

use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use chrono::Utc;
use tokio::fs;

use crate::error::{BackupError, BackupResult};
use crate::models::{BackupEntry, BackupId, BackupIndex, BackupSettings, BACKUP_ID_PREFIX};
use crate::storage::{new_holder_id, IndexStore, LockGuard, LockOptions, Recovery};

use super::retention;
use super::snapshot::SnapshotCopier;

/// Result of a successful backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// The new entry, now the most recent in the index
    pub entry: BackupEntry,
    /// Entries pruned by the retention policy
    pub pruned: Vec<BackupId>,
    /// How the index was loaded before this backup was added
    pub recovery: Recovery,
}

/// Manages backup creation and retention for one profile
#[derive(Debug, Clone)]
pub struct BackupEngine {
    store: IndexStore,
    copier: SnapshotCopier,
    lock_options: LockOptions,
}

impl BackupEngine {
    /// Create a new BackupEngine
    pub fn new(store: IndexStore, lock_options: LockOptions) -> Self {
        Self {
            store,
            copier: SnapshotCopier::new(),
            lock_options,
        }
    }

    /// The underlying index store
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Lock timing used by this engine
    pub fn lock_options(&self) -> LockOptions {
        self.lock_options
    }

    pub(crate) fn copier(&self) -> &SnapshotCopier {
        &self.copier
    }

    /// Snapshot `source` as a new backup
    ///
    /// Waits up to the lock timeout for other operations to finish.
    pub async fn create_backup(&self, source: &Path) -> BackupResult<BackupReport> {
        let holder = new_holder_id("backup");
        let guard = self.store.lock().acquire(&holder, self.lock_options).await?;

        let result = self.create_backup_locked(&guard, source, None).await;
        release_quietly(guard).await;
        result
    }

    /// Snapshot `source` only if no other operation is in flight
    ///
    /// Returns `Ok(None)` without waiting when the lock is held.
    pub async fn try_create_backup(&self, source: &Path) -> BackupResult<Option<BackupReport>> {
        let holder = new_holder_id("scheduled");
        let Some(guard) = self
            .store
            .lock()
            .try_acquire(&holder, self.lock_options.stale_after)
            .await?
        else {
            return Ok(None);
        };

        let result = self.create_backup_locked(&guard, source, None).await;
        release_quietly(guard).await;
        result.map(Some)
    }

    /// Snapshot, record and prune while the caller holds the lock
    ///
    /// `protect` is never pruned by this call. Pruned directories are deleted
    /// only after the index is durable.
    pub(crate) async fn create_backup_locked(
        &self,
        _guard: &LockGuard,
        source: &Path,
        protect: Option<&BackupId>,
    ) -> BackupResult<BackupReport> {
        let (mut index, recovery) = self.store.read_index().await;

        if recovery.lost_updates() {
            self.resume_counter_after_loss(&mut index).await;
        }

        let now = Utc::now().timestamp_millis();
        let id = index.next_id(now);
        let dir = self.store.backup_dir(&id);

        // A failed copy leaves no directory and the index untouched
        let stats = self.copier.copy(source, &dir).await?;

        let entry = BackupEntry {
            id: id.clone(),
            timestamp: now,
            size: stats.size,
            file_count: stats.file_count,
        };
        index.push_latest(entry.clone());

        let plan = retention::plan(&index.backups, &index.settings, now, protect);
        index.backups = plan.keep.clone();

        if let Err(e) = self.store.write_index(&index).await {
            if let Err(cleanup) = fs::remove_dir_all(&dir).await {
                tracing::warn!(
                    backup_id = %id,
                    error = %cleanup,
                    "Failed to remove unrecorded backup directory"
                );
            }
            return Err(e);
        }

        for pruned in &plan.remove {
            self.remove_backup_dir(&pruned.id).await;
        }

        tracing::info!(
            backup_id = %id,
            size = entry.size,
            file_count = entry.file_count,
            pruned = plan.remove.len(),
            "Backup created"
        );

        Ok(BackupReport {
            entry,
            pruned: plan.removed_ids(),
            recovery,
        })
    }

    /// Current retained backups, most recent first
    ///
    /// Reads without the lock; the result may be slightly stale but is always
    /// a complete document.
    pub async fn list_backups(&self) -> Vec<BackupEntry> {
        self.store.read_index().await.0.backups
    }

    /// Read the full index without the lock
    pub async fn read_index(&self) -> (BackupIndex, Recovery) {
        self.store.read_index().await
    }

    /// Get a specific backup by id
    pub async fn get_backup(&self, id: &BackupId) -> Option<BackupEntry> {
        self.store.read_index().await.0.find(id).cloned()
    }

    /// Get the most recent backup
    pub async fn latest_backup(&self) -> Option<BackupEntry> {
        self.store.read_index().await.0.latest().cloned()
    }

    /// Current settings stored in the index
    pub async fn settings(&self) -> BackupSettings {
        self.store.read_index().await.0.settings
    }

    /// Validate and persist new settings under the lock
    pub async fn update_settings(&self, settings: BackupSettings) -> BackupResult<BackupSettings> {
        settings
            .validate()
            .map_err(|e| BackupError::Validation(e.to_string()))?;

        let holder = new_holder_id("settings");
        let guard = self.store.lock().acquire(&holder, self.lock_options).await?;

        let result = async {
            let (mut index, recovery) = self.store.read_index().await;
            if recovery.lost_updates() {
                self.resume_counter_after_loss(&mut index).await;
            }
            index.settings = settings.clone();
            self.store.write_index(&index).await?;
            tracing::info!(
                enabled = settings.enabled,
                interval_ms = settings.interval_ms,
                max_count = settings.max_count,
                max_age_ms = settings.max_age_ms,
                "Backup settings updated"
            );
            Ok::<_, BackupError>(settings)
        }
        .await;

        release_quietly(guard).await;
        result
    }

    /// Backup directories on disk that no index entry references
    ///
    /// These survive an unrecoverable index loss. They are reported, never
    /// deleted automatically.
    pub async fn find_orphans(&self) -> BackupResult<Vec<BackupId>> {
        let (index, _) = self.store.read_index().await;
        let mut orphans = self.backup_dirs_on_disk().await?;
        orphans.retain(|id| !index.references_dir(id.dir_name()));
        orphans.sort();
        Ok(orphans)
    }

    async fn backup_dirs_on_disk(&self) -> BackupResult<Vec<BackupId>> {
        let mut entries = match fs::read_dir(self.store.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(BACKUP_ID_PREFIX) || !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Ok(id) = BackupId::parse(&name) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Keep ids unique after the index was lost or rolled back to `.bak`
    /// by continuing the counter from the highest sequence found on disk
    async fn resume_counter_after_loss(&self, index: &mut BackupIndex) {
        match self.backup_dirs_on_disk().await {
            Ok(ids) => {
                let highest = ids.iter().filter_map(BackupId::sequence).max().unwrap_or(0);
                index.backup_count = index.backup_count.max(highest);

                let orphans = ids
                    .iter()
                    .filter(|id| !index.references_dir(id.dir_name()))
                    .count();
                if orphans > 0 {
                    tracing::warn!(
                        orphans,
                        root = %self.store.root().display(),
                        "Backup index was not current; existing backup directories are orphaned"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scan backup root for orphans");
            }
        }
    }

    async fn remove_backup_dir(&self, id: &BackupId) {
        let dir = self.store.backup_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(backup_id = %id, "Pruned backup directory"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                backup_id = %id,
                path = %dir.display(),
                error = %e,
                "Failed to delete pruned backup directory"
            ),
        }
    }
}

/// Release a lock, logging instead of failing
pub(crate) async fn release_quietly(guard: LockGuard) {
    let holder = guard.holder().to_string();
    if let Err(e) = guard.release().await {
        tracing::warn!(holder = %holder, error = %e, "Failed to release backup lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_engine() -> (BackupEngine, PathBuf, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let profile = temp_dir.path().join("profile");
        std::fs::create_dir_all(&profile).unwrap();
        std::fs::write(profile.join("state.json"), r#"{"version":1}"#).unwrap();

        let store = IndexStore::new(temp_dir.path().join("backups"), "studio");
        let options = LockOptions {
            timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
        };
        (BackupEngine::new(store, options), profile, temp_dir)
    }

    async fn set_max_count(engine: &BackupEngine, max_count: u32) {
        let settings = BackupSettings {
            max_count,
            max_age_ms: 0,
            ..Default::default()
        };
        engine.update_settings(settings).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_backup() {
        let (engine, profile, _temp) = create_test_engine();

        let report = engine.create_backup(&profile).await.unwrap();
        let dir = engine.store().backup_dir(&report.entry.id);

        assert_eq!(report.entry.file_count, 1);
        assert_eq!(report.entry.size, 13);
        assert_eq!(report.recovery, Recovery::Missing);
        assert_eq!(
            std::fs::read(dir.join("state.json")).unwrap(),
            br#"{"version":1}"#
        );
        assert!(!engine.store().lock().path().exists());
    }

    #[tokio::test]
    async fn test_list_backups_newest_first() {
        let (engine, profile, _temp) = create_test_engine();

        let first = engine.create_backup(&profile).await.unwrap().entry;
        let second = engine.create_backup(&profile).await.unwrap().entry;

        let backups = engine.list_backups().await;
        assert_eq!(backups, vec![second.clone(), first]);
        assert_eq!(engine.latest_backup().await, Some(second));
    }

    #[tokio::test]
    async fn test_retention_prunes_after_write() {
        let (engine, profile, _temp) = create_test_engine();
        set_max_count(&engine, 2).await;

        let first = engine.create_backup(&profile).await.unwrap().entry;
        engine.create_backup(&profile).await.unwrap();
        let report = engine.create_backup(&profile).await.unwrap();

        assert_eq!(report.pruned, vec![first.id.clone()]);
        assert!(!engine.store().backup_dir(&first.id).exists());

        let (index, _) = engine.read_index().await;
        assert_eq!(index.backups.len(), 2);
        assert_eq!(index.backup_count, 3);
    }

    #[tokio::test]
    async fn test_failed_snapshot_leaves_index_untouched() {
        let (engine, profile, temp) = create_test_engine();
        engine.create_backup(&profile).await.unwrap();
        let before = std::fs::read(engine.store().metadata_file()).unwrap();

        let err = engine
            .create_backup(&temp.path().join("missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotFailed { .. }));
        assert_eq!(std::fs::read(engine.store().metadata_file()).unwrap(), before);
        assert!(!engine.store().lock().path().exists());
    }

    #[tokio::test]
    async fn test_try_create_skips_when_locked() {
        let (engine, profile, _temp) = create_test_engine();
        let guard = engine
            .store()
            .lock()
            .acquire("manual", engine.lock_options())
            .await
            .unwrap();

        assert!(engine.try_create_backup(&profile).await.unwrap().is_none());
        guard.release().await.unwrap();

        assert!(engine.try_create_backup(&profile).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() {
        let (engine, _profile, _temp) = create_test_engine();
        let settings = BackupSettings {
            interval_ms: 5,
            ..Default::default()
        };

        let err = engine.update_settings(settings).await.unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
        assert_eq!(engine.settings().await, BackupSettings::default());
    }

    #[tokio::test]
    async fn test_orphans_after_metadata_loss() {
        let (engine, profile, _temp) = create_test_engine();
        let lost = engine.create_backup(&profile).await.unwrap().entry;

        std::fs::write(engine.store().metadata_file(), "not json").unwrap();
        std::fs::remove_file(engine.store().metadata_backup_file()).ok();
        std::fs::write(engine.store().metadata_backup_file(), "also not json").unwrap();

        let report = engine.create_backup(&profile).await.unwrap();
        assert_eq!(report.recovery, Recovery::Unrecoverable);
        assert_eq!(report.entry.id.sequence(), Some(2));

        assert_eq!(engine.find_orphans().await.unwrap(), vec![lost.id]);
        assert_eq!(engine.list_backups().await, vec![report.entry]);
    }
}
