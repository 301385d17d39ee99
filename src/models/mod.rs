//! Core data models for cartbackup
//!
//! This module contains the data structures persisted in a profile's backup
//! index: backup entries, the index document itself, and backup settings.

pub mod entry;
pub mod index;
pub mod settings;

pub use entry::{BackupEntry, BackupId, BackupIdError, BACKUP_ID_PREFIX};
pub use index::BackupIndex;
pub use settings::BackupSettings;
