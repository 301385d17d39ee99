//! Storage layer for cartbackup
//!
//! Provides JSON file storage with atomic writes and `.bak` recovery, the
//! advisory lock file, and the per-profile backup index store.

pub mod file_io;
pub mod index;
pub mod lock;

pub use file_io::{read_json_with_recovery, write_json_atomic, Recovery};
pub use index::IndexStore;
pub use lock::{new_holder_id, LockFile, LockGuard, LockOptions, LockRecord};
