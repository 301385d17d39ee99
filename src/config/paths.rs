//! Path management for cartbackup
//!
//! Provides XDG-compliant path resolution for profiles and their backups.
//!
//! ## Path Resolution Order
//!
//! 1. `CARTBACKUP_DATA_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/cartbackup` or `~/.config/cartbackup`
//! 3. Windows: `%APPDATA%\cartbackup`

use std::path::PathBuf;

use crate::error::BackupError;

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "CARTBACKUP_DATA_DIR";

/// Manages all paths used by cartbackup
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Base directory for all cartbackup data
    base_dir: PathBuf,
}

impl AppPaths {
    /// Create a new AppPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create AppPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.config/cartbackup/ or equivalent)
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory holding all live profiles
    pub fn profiles_dir(&self) -> PathBuf {
        self.base_dir.join("profiles")
    }

    /// Live directory of one profile
    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.profiles_dir().join(profile)
    }

    /// Backup root of one profile
    pub fn backup_root(&self, profile: &str) -> PathBuf {
        self.base_dir.join("backups").join(profile)
    }

    /// Ensure the base and backup directories exist
    pub fn ensure_directories(&self, profile: &str) -> Result<(), BackupError> {
        validate_profile_name(profile)?;

        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.backup_root(profile))
            .map_err(|e| BackupError::Io(format!("Failed to create backup directory: {}", e)))?;

        Ok(())
    }

    /// Ensure the default live directory of `profile` exists and return it
    pub fn ensure_profile_dir(&self, profile: &str) -> Result<PathBuf, BackupError> {
        validate_profile_name(profile)?;

        let dir = self.profile_dir(profile);
        std::fs::create_dir_all(&dir)
            .map_err(|e| BackupError::Io(format!("Failed to create profile directory: {}", e)))?;
        Ok(dir)
    }
}

/// Reject profile names that cannot be used as a single directory name
pub fn validate_profile_name(profile: &str) -> Result<(), BackupError> {
    let trimmed = profile.trim();
    if trimmed.is_empty() {
        return Err(BackupError::Validation("Profile name cannot be empty".into()));
    }
    if trimmed != profile
        || profile == "."
        || profile == ".."
        || profile.contains(['/', '\\'])
    {
        return Err(BackupError::Validation(format!(
            "Invalid profile name: '{}'",
            profile
        )));
    }
    Ok(())
}

/// Resolve the default data directory path based on platform
#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, BackupError> {
    // Unix (Linux/macOS): Use XDG_CONFIG_HOME if set, otherwise ~/.config
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(config_home).join("cartbackup"));
    }
    let home = std::env::var("HOME")
        .map_err(|_| BackupError::Config("HOME environment variable not set".into()))?;
    Ok(PathBuf::from(home).join(".config").join("cartbackup"))
}

/// Resolve the default data directory path based on platform
#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, BackupError> {
    // Windows: Use APPDATA
    let appdata = std::env::var("APPDATA")
        .map_err(|_| BackupError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("cartbackup"))
}
