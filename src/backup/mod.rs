//! Backup and restore engine for cartbackup
//!
//! Takes full snapshots of a profile directory, keeps a crash-consistent
//! index of them, enforces retention and restores a profile from any retained
//! snapshot.
//!
//! # Architecture
//!
//! - `SnapshotCopier`: recursive directory copy with cleanup on failure
//! - `retention`: decides which backups to prune after a new one
//! - `BackupEngine`: lock, snapshot, record, prune
//! - `RestoreEngine`: lock, safety backup, stage, swap
//! - `BackupScheduler`: periodic driver that skips ticks while busy
//!
//! Every mutating operation holds the profile's lock file for its whole
//! critical section. Reads of the index for display do not take the lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartbackup::backup::{BackupEngine, RestoreEngine};
//! use cartbackup::storage::{IndexStore, LockOptions};
//!
//! let store = IndexStore::new(paths.backup_root("studio"), "studio");
//! let engine = BackupEngine::new(store, LockOptions::default());
//!
//! let report = engine.create_backup(&paths.profile_dir("studio")).await?;
//!
//! // Later, restore from backup
//! let restore = RestoreEngine::new(engine.clone());
//! let result = restore.restore(&report.entry.id, &paths.profile_dir("studio")).await?;
//! println!("{}", result.summary());
//! ```

pub mod events;
mod manager;
mod restore;
pub mod retention;
mod scheduler;
pub mod snapshot;

pub use events::{BackupEvent, EventSender};
pub use manager::{BackupEngine, BackupReport};
pub use restore::{RestoreEngine, RestoreReport};
pub use retention::RetentionPlan;
pub use scheduler::{BackupScheduler, TickOutcome};
pub use snapshot::{SnapshotCopier, SnapshotStats};
