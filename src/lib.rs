//! cartbackup - Profile backup and restore for cart machine playout profiles
//!
//! This library snapshots a profile's live data directory into a
//! per-profile backup area, keeps a crash-safe index of those snapshots,
//! prunes them by count and age, runs them on a schedule and restores a
//! chosen snapshot back over the live directory.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Backup entries, ids, the backup index and backup settings
//! - `storage`: Atomic JSON files, the profile lock and the index store
//! - `backup`: Snapshot copying, retention, backup/restore engines and the scheduler
//! - `services`: Typed results and notifications for a UI bridge
//! - `cli` / `display`: Command-line front end
//!
//! # Example
//!
//! ```rust,ignore
//! use cartbackup::backup::BackupEngine;
//! use cartbackup::storage::{IndexStore, LockOptions};
//!
//! let store = IndexStore::new(backup_root, "studio");
//! let engine = BackupEngine::new(store, LockOptions::default());
//! let report = engine.create_backup(&profile_dir).await?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use error::{BackupError, BackupResult, ErrorKind};
