//! Backup settings model
//!
//! Retention and scheduling policy for one profile. Stored inside the backup
//! index document.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest accepted scheduler period while backups are enabled
pub const MIN_INTERVAL_MS: u64 = 1_000;

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Backup policy for a profile
///
/// A zero `max_count` or `max_age_ms` disables that retention rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    /// Whether scheduled backups run
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Scheduler period in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Retention cap by count
    #[serde(default = "default_max_count")]
    pub max_count: u32,

    /// Retention cap by age in milliseconds
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    HOUR_MS
}

fn default_max_count() -> u32 {
    10
}

fn default_max_age_ms() -> u64 {
    30 * DAY_MS
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_ms: default_interval_ms(),
            max_count: default_max_count(),
            max_age_ms: default_max_age_ms(),
        }
    }
}

impl BackupSettings {
    /// Scheduler period, or `None` when scheduled backups are off
    pub fn interval(&self) -> Option<Duration> {
        if self.enabled && self.interval_ms > 0 {
            Some(Duration::from_millis(self.interval_ms))
        } else {
            None
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        if self.enabled && self.interval_ms < MIN_INTERVAL_MS {
            return Err(SettingsValidationError::IntervalTooShort(self.interval_ms));
        }
        Ok(())
    }
}

/// Validation errors for backup settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsValidationError {
    IntervalTooShort(u64),
}

impl std::fmt::Display for SettingsValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntervalTooShort(ms) => write!(
                f,
                "Backup interval of {} ms is shorter than the minimum of {} ms",
                ms, MIN_INTERVAL_MS
            ),
        }
    }
}

impl std::error::Error for SettingsValidationError {}
