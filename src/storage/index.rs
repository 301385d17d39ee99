//! Backup index persistence
//!
//! Owns the on-disk layout of one profile's backup root:
//!
//! ```text
//! <backup root>/
//!   backup-metadata.json      current index
//!   backup-metadata.json.bak  previous index
//!   backup-metadata.lock      advisory lock
//!   backup-<id>/              one directory per retained backup
//! ```

use std::path::{Path, PathBuf};

use crate::error::BackupResult;
use crate::models::{BackupId, BackupIndex};

use super::file_io::{self, Recovery};
use super::lock::LockFile;

/// Name of the index document
pub const METADATA_FILE: &str = "backup-metadata.json";

/// Name of the lock file
pub const LOCK_FILE: &str = "backup-metadata.lock";

/// Reads and writes the backup index of one profile
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
    profile_name: String,
}

impl IndexStore {
    /// Create a store for `profile_name` rooted at `root`
    pub fn new(root: impl Into<PathBuf>, profile_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            profile_name: profile_name.into(),
        }
    }

    /// The backup root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Profile this store belongs to
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// Path of `backup-metadata.json`
    pub fn metadata_file(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Path of `backup-metadata.json.bak`
    pub fn metadata_backup_file(&self) -> PathBuf {
        file_io::backup_path(&self.metadata_file())
    }

    /// The profile's lock file
    pub fn lock(&self) -> LockFile {
        LockFile::new(self.root.join(LOCK_FILE))
    }

    /// Directory holding the files of backup `id`
    pub fn backup_dir(&self, id: &BackupId) -> PathBuf {
        self.root.join(id.dir_name())
    }

    /// Read the index, recovering from `.bak` if the primary is damaged
    ///
    /// Never fails: when neither copy is readable a fresh empty index is
    /// returned together with [`Recovery::Unrecoverable`]. Backup directories
    /// already on disk are then orphans.
    pub async fn read_index(&self) -> (BackupIndex, Recovery) {
        let (index, recovery) =
            file_io::read_json_with_recovery::<BackupIndex, _>(self.metadata_file()).await;

        let index = index.unwrap_or_else(|| BackupIndex::new(&self.profile_name));

        if index.profile_name != self.profile_name {
            tracing::warn!(
                expected = %self.profile_name,
                found = %index.profile_name,
                "Backup index belongs to a different profile name"
            );
        }

        (index, recovery)
    }

    /// Atomically persist the index
    pub async fn write_index(&self, index: &BackupIndex) -> BackupResult<()> {
        file_io::write_json_atomic(self.metadata_file(), index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupEntry;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> IndexStore {
        IndexStore::new(temp.path().join("backups"), "studio")
    }

    #[tokio::test]
    async fn test_missing_index_is_fresh() {
        let temp = TempDir::new().unwrap();
        let (index, recovery) = store(&temp).read_index().await;

        assert_eq!(index, BackupIndex::new("studio"));
        assert_eq!(recovery, Recovery::Missing);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let mut index = BackupIndex::new("studio");
        index.push_latest(BackupEntry {
            id: index.next_id(1000),
            timestamp: 1000,
            size: 75,
            file_count: 2,
        });
        store.write_index(&index).await.unwrap();

        let (loaded, recovery) = store.read_index().await;
        assert_eq!(loaded, index);
        assert_eq!(recovery, Recovery::Clean);
    }

    #[tokio::test]
    async fn test_unrecoverable_index_is_reinitialized() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        std::fs::create_dir_all(store.root()).unwrap();
        std::fs::write(store.metadata_file(), "{").unwrap();
        std::fs::write(store.metadata_backup_file(), "}").unwrap();

        let (index, recovery) = store.read_index().await;
        assert_eq!(index, BackupIndex::new("studio"));
        assert_eq!(recovery, Recovery::Unrecoverable);
    }

    #[test]
    fn test_layout() {
        let store = IndexStore::new("/data/backups/studio", "studio");
        let id = BackupId::generate(1, 1);

        assert_eq!(
            store.metadata_file(),
            Path::new("/data/backups/studio/backup-metadata.json")
        );
        assert_eq!(
            store.metadata_backup_file(),
            Path::new("/data/backups/studio/backup-metadata.json.bak")
        );
        assert_eq!(
            store.lock().path(),
            Path::new("/data/backups/studio/backup-metadata.lock")
        );
        assert_eq!(
            store.backup_dir(&id),
            Path::new("/data/backups/studio/backup-0000000000001-000001")
        );
    }
}
