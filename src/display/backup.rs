//! Backup display formatting
//!
//! Formats backup entries and settings for terminal output.

use chrono::{DateTime, Utc};

use crate::models::{BackupEntry, BackupSettings};

/// Format a list of backups as a table, most recent first
pub fn format_backup_list(backups: &[BackupEntry], now: DateTime<Utc>) -> String {
    if backups.is_empty() {
        return "No backups found.".to_string();
    }

    let id_width = backups
        .iter()
        .map(|b| b.id.as_str().len())
        .max()
        .unwrap_or(2)
        .max(2);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<4}  {:<id_width$}  {:<20}  {:>6}  {:>10}  {:>6}\n",
        "#",
        "ID",
        "Created",
        "Age",
        "Size",
        "Files",
        id_width = id_width,
    ));

    output.push_str(&format!(
        "{:-<4}  {:-<id_width$}  {:-<20}  {:->6}  {:->10}  {:->6}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        id_width = id_width,
    ));

    for (i, backup) in backups.iter().enumerate() {
        let created = backup.created_at();
        output.push_str(&format!(
            "{:<4}  {:<id_width$}  {:<20}  {:>6}  {:>10}  {:>6}\n",
            i + 1,
            backup.id,
            created.format("%Y-%m-%d %H:%M:%S"),
            format_duration(now.signed_duration_since(created)),
            format_size(backup.size),
            backup.file_count,
            id_width = id_width,
        ));
    }

    output.push_str(&format!("\nTotal: {} backup(s)", backups.len()));
    output
}

/// Format a single backup's details
pub fn format_backup_details(backup: &BackupEntry) -> String {
    format!(
        "Backup Details\n\
         ==============\n\
         ID:      {}\n\
         Created: {}\n\
         Size:    {}\n\
         Files:   {}",
        backup.id,
        backup.created_at().format("%Y-%m-%d %H:%M:%S UTC"),
        format_size(backup.size),
        backup.file_count,
    )
}

/// Format backup settings
pub fn format_settings(settings: &BackupSettings) -> String {
    let max_count = if settings.max_count == 0 {
        "unlimited".to_string()
    } else {
        settings.max_count.to_string()
    };
    let max_age = if settings.max_age_ms == 0 {
        "unlimited".to_string()
    } else {
        format_duration(chrono::Duration::milliseconds(settings.max_age_ms as i64))
    };

    format!(
        "Scheduled backups: {}\n\
         Interval:          {}\n\
         Keep at most:      {} backup(s)\n\
         Keep for:          {}",
        if settings.enabled { "enabled" } else { "disabled" },
        format_duration(chrono::Duration::milliseconds(settings.interval_ms as i64)),
        max_count,
        max_age,
    )
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
