//! Backup CLI commands
//!
//! Implements CLI commands for backup management.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tokio_util::sync::CancellationToken;

use crate::backup::snapshot::measure;
use crate::backup::BackupEvent;
use crate::config::{AppPaths, AppSettings};
use crate::display::backup::{
    format_backup_details, format_backup_list, format_settings, format_size,
};
use crate::error::BackupError;
use crate::models::{BackupEntry, BackupId};
use crate::services::{BackupService, OperationResult};

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Snapshot the live profile now
    Create,

    /// List retained backups, most recent first
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Replace the live profile with a backup
    Restore {
        /// Backup id (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup id (use 'latest' for most recent)
        backup: String,
    },

    /// List backup directories no longer referenced by the index
    Orphans,

    /// Show or change the backup policy
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Run scheduled backups until interrupted
    Schedule,

    /// Show current configuration and paths
    Config,
}

/// Backup policy subcommands
#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show the current backup policy
    Show,

    /// Change the backup policy
    Set {
        /// Enable or disable scheduled backups
        #[arg(long)]
        enabled: Option<bool>,

        /// Seconds between scheduled backups
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Keep at most this many backups (0 = unlimited)
        #[arg(long)]
        max_count: Option<u32>,

        /// Delete backups older than this many days (0 = never)
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

/// Handle a backup command
pub async fn handle_backup_command(
    service: &BackupService,
    paths: &AppPaths,
    settings: &AppSettings,
    cmd: BackupCommands,
) -> Result<()> {
    match cmd {
        BackupCommands::Create => {
            println!("Creating backup...");
            let created = into_cli_result(service.create_backup().await)?;
            println!(
                "Backup created: {} ({} files, {})",
                created.entry.id,
                created.entry.file_count,
                format_size(created.entry.size)
            );
            println!(
                "Location: {}",
                service.engine().store().backup_dir(&created.entry.id).display()
            );
            if !created.pruned.is_empty() {
                println!("Pruned {} old backup(s).", created.pruned.len());
            }
        }

        BackupCommands::List { verbose } => {
            let backups = service.list_backups().await;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: cartbackup create");
                return Ok(());
            }

            if verbose {
                for backup in &backups {
                    println!("{}\n", format_backup_details(backup));
                }
                println!("Total: {} backup(s)", backups.len());
            } else {
                println!("{}", format_backup_list(&backups, chrono::Utc::now()));
            }
        }

        BackupCommands::Restore { backup, force } => {
            let entry = resolve_backup(service, &backup).await?;

            println!("{}", format_backup_details(&entry));
            println!();

            if !force {
                println!("WARNING: This will overwrite ALL current profile data!");
                println!("A backup of the current data is taken first.");
                println!("To proceed, run again with --force flag:");
                println!("  cartbackup restore {} --force", backup);
                return Ok(());
            }

            println!("Restoring from backup...");
            let restored = into_cli_result(service.restore(entry.id.as_str()).await)?;

            println!("Restore complete!");
            println!(
                "Restored {} ({} files). Previous profile saved as {}",
                restored.restored.id, restored.restored.file_count, restored.safety_backup.id
            );
        }

        BackupCommands::Info { backup } => {
            let entry = resolve_backup(service, &backup).await?;
            let dir = service.engine().store().backup_dir(&entry.id);

            println!("{}", format_backup_details(&entry));
            println!("Location: {}", dir.display());

            let status = match measure(&dir).await {
                Ok(found) if found.size == entry.size && found.file_count == entry.file_count => {
                    "Complete".to_string()
                }
                Ok(found) => format!(
                    "Incomplete ({} files, {} on disk)",
                    found.file_count,
                    format_size(found.size)
                ),
                Err(e) => format!("Unreadable ({})", e),
            };
            println!("Status:  {}", status);
        }

        BackupCommands::Orphans => {
            let orphans = service.find_orphans().await?;

            if orphans.is_empty() {
                println!("No orphaned backup directories.");
                return Ok(());
            }

            println!("Orphaned backup directories");
            println!("===========================");
            for id in &orphans {
                println!(
                    "  {}",
                    service.engine().store().backup_dir(id).display()
                );
            }
            println!();
            println!(
                "{} director{} not referenced by the backup index.",
                orphans.len(),
                if orphans.len() == 1 { "y is" } else { "ies are" }
            );
        }

        BackupCommands::Settings(SettingsCommands::Show) => {
            println!("{}", format_settings(&service.get_settings().await));
        }

        BackupCommands::Settings(SettingsCommands::Set {
            enabled,
            interval_secs,
            max_count,
            max_age_days,
        }) => {
            let mut updated = service.get_settings().await;
            if let Some(enabled) = enabled {
                updated.enabled = enabled;
            }
            if let Some(secs) = interval_secs {
                updated.interval_ms = secs.saturating_mul(1000);
            }
            if let Some(count) = max_count {
                updated.max_count = count;
            }
            if let Some(days) = max_age_days {
                updated.max_age_ms = days.saturating_mul(24 * 60 * 60 * 1000);
            }

            let result = into_cli_result(service.set_settings(updated).await)?;
            println!("Backup settings updated.");
            println!("{}", format_settings(&result.settings));
        }

        BackupCommands::Schedule => {
            run_scheduler(service).await?;
        }

        BackupCommands::Config => {
            println!("cartbackup Configuration");
            println!("========================");
            println!("Base directory:    {}", paths.base_dir().display());
            println!("Settings file:     {}", paths.settings_file().display());
            println!("Profile directory: {}", service.profile_dir().display());
            println!("Backup directory:  {}", service.engine().store().root().display());
            println!();
            println!("Settings:");
            println!("  Default profile: {}", settings.default_profile);
            println!("  Lock timeout:    {}ms", settings.lock_timeout_ms);
            println!("  Stale lock age:  {}ms", settings.stale_lock_ms);
            println!("  Log level:       {}", settings.log_level);
        }
    }

    Ok(())
}

/// Run the scheduler in the foreground, reporting each event, until Ctrl-C
async fn run_scheduler(service: &BackupService) -> Result<()> {
    let settings = service.get_settings().await;
    if !settings.enabled {
        println!("Scheduled backups are disabled; waiting for them to be enabled.");
    }
    println!("{}", format_settings(&settings));
    println!();
    println!("Press Ctrl-C to stop.");

    let mut events = service.subscribe();
    let cancel = CancellationToken::new();
    let handle = service.scheduler().spawn(cancel.clone());

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped backup notifications");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    handle.await.context("Scheduler task panicked")?;
    println!("Scheduler stopped.");
    Ok(())
}

fn print_event(event: &BackupEvent) {
    match event {
        BackupEvent::BackupCreated { entry, pruned, .. } => {
            println!(
                "[{}] Backup created: {} ({} files, {}){}",
                entry.created_at().format("%Y-%m-%d %H:%M:%S"),
                entry.id,
                entry.file_count,
                format_size(entry.size),
                if pruned.is_empty() {
                    String::new()
                } else {
                    format!(", pruned {}", pruned.len())
                }
            );
        }
        BackupEvent::BackupFailed { message, .. } => {
            eprintln!("Scheduled backup failed: {}", message);
        }
        BackupEvent::Warning { message, .. } => {
            eprintln!("Warning: {}", message);
        }
        _ => {}
    }
}

/// Resolve a backup identifier to an index entry
async fn resolve_backup(service: &BackupService, backup: &str) -> Result<BackupEntry> {
    // Handle "latest" keyword
    if backup.eq_ignore_ascii_case("latest") {
        return service
            .engine()
            .latest_backup()
            .await
            .ok_or_else(|| BackupError::backup_not_found("latest").into());
    }

    let id = BackupId::parse(backup)
        .map_err(|e| BackupError::Validation(format!("'{}': {}", backup, e)))?;

    service
        .engine()
        .get_backup(&id)
        .await
        .ok_or_else(|| BackupError::backup_not_found(backup).into())
}

/// Turn a failed bridge result into a CLI error carrying its message
fn into_cli_result<T>(result: OperationResult<T>) -> Result<T> {
    match result.into_result() {
        Ok(payload) => Ok(payload),
        Err((kind, message)) => {
            tracing::debug!(error_kind = %kind, "Command failed");
            if kind.is_retryable() {
                bail!(
                    "{}\nAnother backup or restore is in progress; try again shortly.",
                    message
                )
            }
            bail!(message)
        }
    }
}
