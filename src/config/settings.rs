//! Application settings for cartbackup
//!
//! Manages process-wide preferences: which profile to operate on, lock
//! timing and the default log level. Per-profile backup policy lives in the
//! backup index instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;
use crate::error::BackupError;
use crate::storage::{file_io, LockOptions};

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Profile used when none is given on the command line
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// How long an operation waits for the profile lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Age after which a lock is presumed left by a crashed process
    #[serde(default = "default_stale_lock_ms")]
    pub stale_lock_ms: u64,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    30_000
}

fn default_stale_lock_ms() -> u64 {
    10 * 60 * 1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            default_profile: default_profile(),
            lock_timeout_ms: default_lock_timeout_ms(),
            stale_lock_ms: default_stale_lock_ms(),
            log_level: default_log_level(),
        }
    }
}

impl AppSettings {
    /// Lock timing derived from these settings
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            stale_after: Duration::from_millis(self.stale_lock_ms),
        }
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub async fn load_or_create(paths: &AppPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if tokio::fs::try_exists(&settings_path).await? {
            file_io::read_json_required(&settings_path)
                .await
                .map_err(|e| BackupError::Config(format!("Failed to load settings: {}", e)))
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Self::default())
        }
    }

    /// Save settings to disk
    pub async fn save(&self, paths: &AppPaths) -> Result<(), BackupError> {
        file_io::write_json_atomic(paths.settings_file(), self).await
    }
}
