//! Configuration module for cartbackup
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution
//! - Application settings persistence

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::AppSettings;
