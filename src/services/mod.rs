//! Service layer for cartbackup
//!
//! Bridges the backup engine to callers such as the CLI or a desktop UI.

pub mod backup;

pub use backup::{BackupService, CreatedBackup, OperationResult, RestoredBackup, UpdatedSettings};
