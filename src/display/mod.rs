//! Display formatting for terminal output
//!
//! Provides utilities for formatting backup entries and settings for
//! terminal display.

pub mod backup;

pub use backup::{format_backup_details, format_backup_list, format_settings};
