//! Backup entry model
//!
//! A backup entry records one retained snapshot of a profile directory. Its id
//! doubles as the name of the snapshot directory under the backup root.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every backup id and backup directory name
pub const BACKUP_ID_PREFIX: &str = "backup-";

/// Identifier of a backup, e.g. `backup-1700000000000-000042`
///
/// Ids sort lexicographically in creation order: the epoch milliseconds and
/// the lifetime sequence number are both zero-padded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(String);

impl BackupId {
    /// Build the id for the `seq`-th backup ever created, taken at `timestamp_ms`
    pub fn generate(timestamp_ms: i64, seq: u64) -> Self {
        Self(format!(
            "{}{:013}-{:06}",
            BACKUP_ID_PREFIX,
            timestamp_ms.max(0),
            seq
        ))
    }

    /// Parse and validate an id supplied from outside the engine
    pub fn parse(s: &str) -> Result<Self, BackupIdError> {
        let rest = s
            .strip_prefix(BACKUP_ID_PREFIX)
            .ok_or_else(|| BackupIdError::MissingPrefix(s.to_string()))?;

        if rest.is_empty() {
            return Err(BackupIdError::Empty);
        }

        // The id becomes a directory name, so it must never escape the root
        if !rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(BackupIdError::InvalidCharacters(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the directory holding this backup's files
    pub fn dir_name(&self) -> &str {
        &self.0
    }

    /// Lifetime sequence number encoded in a generated id
    pub fn sequence(&self) -> Option<u64> {
        self.0.rsplit('-').next()?.parse().ok()
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BackupId {
    type Err = BackupIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors from parsing a backup id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupIdError {
    MissingPrefix(String),
    Empty,
    InvalidCharacters(String),
}

impl fmt::Display for BackupIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrefix(s) => {
                write!(f, "Backup id '{}' must start with '{}'", s, BACKUP_ID_PREFIX)
            }
            Self::Empty => write!(f, "Backup id cannot be empty"),
            Self::InvalidCharacters(s) => {
                write!(f, "Backup id '{}' contains invalid characters", s)
            }
        }
    }
}

impl std::error::Error for BackupIdError {}

/// One recorded, retained snapshot of a profile directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    /// Unique identifier, also the backup directory name
    pub id: BackupId,

    /// Creation time in epoch milliseconds
    pub timestamp: i64,

    /// Total bytes copied into the backup directory
    pub size: u64,

    /// Total files copied into the backup directory
    pub file_count: u64,
}

impl BackupEntry {
    /// Creation time as a UTC datetime
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}
