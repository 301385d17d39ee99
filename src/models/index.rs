//! Backup index model
//!
//! The single metadata document describing every retained backup of a
//! profile. Persisted as `backup-metadata.json` under the backup root.

use serde::{Deserialize, Serialize};

use super::entry::{BackupEntry, BackupId};
use super::settings::BackupSettings;

/// The persisted backup index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupIndex {
    /// Profile this index belongs to
    pub profile_name: String,

    /// Retained backups, most recent first
    ///
    /// List order is the authoritative recency order, not the timestamps.
    #[serde(default)]
    pub backups: Vec<BackupEntry>,

    /// Lifetime count of backups ever created; never decreases
    #[serde(default)]
    pub backup_count: u64,

    /// Retention and scheduling policy
    #[serde(default)]
    pub settings: BackupSettings,
}

impl BackupIndex {
    /// Create an empty index for a profile
    pub fn new(profile_name: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            backups: Vec::new(),
            backup_count: 0,
            settings: BackupSettings::default(),
        }
    }

    /// Id for the next backup taken at `timestamp_ms`
    pub fn next_id(&self, timestamp_ms: i64) -> BackupId {
        BackupId::generate(timestamp_ms, self.backup_count + 1)
    }

    /// Record a new backup as the most recent one
    pub fn push_latest(&mut self, entry: BackupEntry) {
        self.backups.insert(0, entry);
        self.backup_count += 1;
    }

    /// Find an entry by id
    pub fn find(&self, id: &BackupId) -> Option<&BackupEntry> {
        self.backups.iter().find(|e| &e.id == id)
    }

    /// Most recent entry, if any
    pub fn latest(&self) -> Option<&BackupEntry> {
        self.backups.first()
    }

    /// Whether a directory name belongs to a retained entry
    pub fn references_dir(&self, dir_name: &str) -> bool {
        self.backups.iter().any(|e| e.id.dir_name() == dir_name)
    }
}
