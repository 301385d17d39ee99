//! Periodic backup driver
//!
//! Fires a backup every `interval_ms` while backups are enabled. The settings
//! persisted in the backup index are authoritative: they are re-read before
//! every timer arm and on every tick, so a change written by another process
//! takes effect without a restart. The watch channel only wakes the loop
//! early when this process changes them. Any change restarts the timer from
//! a fresh interval, and disabling parks the scheduler until re-enabled. A
//! tick that finds another operation holding the lock is skipped, never
//! queued.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::BackupSettings;

use super::events::{publish, BackupEvent, EventSender};
use super::manager::{BackupEngine, BackupReport};

/// How often persisted settings are re-checked between ticks
pub const DEFAULT_SETTINGS_POLL: Duration = Duration::from_secs(5);

/// What a single scheduler tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// A backup was created
    Created(BackupReport),
    /// Another operation held the lock
    Skipped,
    /// Backups were disabled when the tick fired
    Disabled,
    /// The backup failed
    Failed,
}

/// Periodic backup driver for one profile
pub struct BackupScheduler {
    engine: BackupEngine,
    source: PathBuf,
    settings: watch::Receiver<BackupSettings>,
    events: EventSender,
    settings_poll: Duration,
}

impl BackupScheduler {
    /// Create a scheduler backing up `source`
    pub fn new(
        engine: BackupEngine,
        source: impl Into<PathBuf>,
        settings: watch::Receiver<BackupSettings>,
        events: EventSender,
    ) -> Self {
        Self {
            engine,
            source: source.into(),
            settings,
            events,
            settings_poll: DEFAULT_SETTINGS_POLL,
        }
    }

    /// Re-check persisted settings at most `poll` apart
    pub fn with_settings_poll(mut self, poll: Duration) -> Self {
        self.settings_poll = poll;
        self
    }

    /// Run the scheduler on the current runtime until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Scheduler loop
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(source = %self.source.display(), "Backup scheduler started");

        // Settings the timer was armed with, and when it fires
        let mut armed: Option<(BackupSettings, Option<Instant>)> = None;

        loop {
            let _ = self.settings.borrow_and_update();
            let current = self.engine.settings().await;

            let changed = armed.as_ref().map_or(true, |(settings, _)| *settings != current);
            let fired = armed.as_ref().is_some_and(|(_, deadline)| deadline.is_none());
            if changed || fired {
                if changed && armed.is_some() {
                    tracing::debug!("Backup settings changed, restarting timer");
                }
                if changed && !current.enabled {
                    tracing::debug!("Scheduled backups disabled, waiting for settings change");
                }
                let deadline = current.interval().map(|interval| Instant::now() + interval);
                armed = Some((current, deadline));
            }

            let deadline = armed.as_ref().and_then(|(_, deadline)| *deadline);
            let poll = Instant::now() + self.settings_poll;
            let wake = deadline.map_or(poll, |deadline| deadline.min(poll));

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(wake) => {
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        self.tick().await;
                        if let Some((_, deadline)) = armed.as_mut() {
                            *deadline = None;
                        }
                    }
                }
            }
        }

        tracing::info!("Backup scheduler stopped");
    }

    /// Run one scheduled backup attempt
    pub async fn tick(&self) -> TickOutcome {
        // Re-read on every tick so a change racing the timer still counts
        if !self.engine.settings().await.enabled {
            tracing::debug!("Scheduled backups disabled, skipping tick");
            return TickOutcome::Disabled;
        }

        match self.engine.try_create_backup(&self.source).await {
            Ok(Some(report)) => {
                publish(
                    &self.events,
                    BackupEvent::BackupCreated {
                        entry: report.entry.clone(),
                        pruned: report.pruned.clone(),
                        scheduled: true,
                    },
                );
                TickOutcome::Created(report)
            }
            Ok(None) => {
                tracing::debug!("Backup or restore in progress, skipping scheduled backup");
                TickOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled backup failed");
                publish(&self.events, BackupEvent::backup_failed(&e, true));
                TickOutcome::Failed
            }
        }
    }
}
