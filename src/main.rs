use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use cartbackup::cli::{handle_backup_command, BackupCommands};
use cartbackup::config::{paths::validate_profile_name, AppPaths, AppSettings};
use cartbackup::services::BackupService;
use cartbackup::storage::IndexStore;

#[derive(Parser)]
#[command(
    name = "cartbackup",
    version,
    about = "Profile backup and restore for cart machine playout profiles",
    long_about = "cartbackup snapshots a profile's live data directory, keeps a \
                  crash-safe index of its backups, prunes them by count and age \
                  and restores a chosen backup over the live profile."
)]
struct Cli {
    /// Profile to operate on (defaults to the configured default profile)
    #[arg(short, long, global = true, env = "CARTBACKUP_PROFILE")]
    profile: Option<String>,

    /// Live profile directory (defaults to <data dir>/profiles/<profile>)
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<BackupCommands>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = AppPaths::new()?;
    let settings = AppSettings::load_or_create(&paths).await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        println!("cartbackup - Profile backup and restore");
        println!();
        println!("Run 'cartbackup --help' for usage information.");
        return Ok(());
    };

    let profile = cli
        .profile
        .unwrap_or_else(|| settings.default_profile.clone());
    validate_profile_name(&profile)?;
    paths.ensure_directories(&profile)?;
    if !paths.settings_file().exists() {
        settings.save(&paths).await?;
    }

    let profile_dir = match cli.source {
        Some(dir) => dir,
        None => paths.ensure_profile_dir(&profile)?,
    };
    let store = IndexStore::new(paths.backup_root(&profile), profile.as_str());
    let service = BackupService::open(store, settings.lock_options(), profile_dir).await;

    tracing::debug!(profile = %profile, "Backup service ready");

    handle_backup_command(&service, &paths, &settings, command).await
}
