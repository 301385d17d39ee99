//! Backup service
//!
//! The surface a UI or event bridge talks to. Wraps the backup and restore
//! engines for one profile, turns every outcome into a typed
//! [`OperationResult`] instead of an error crossing the boundary, publishes a
//! [`BackupEvent`] for each completed operation, and owns the settings
//! channel the scheduler observes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::backup::events::{self, publish, BackupEvent, EventSender};
use crate::backup::{BackupEngine, BackupReport, BackupScheduler, RestoreEngine};
use crate::error::{BackupError, BackupResult, ErrorKind};
use crate::models::{BackupEntry, BackupId, BackupSettings};
use crate::storage::{IndexStore, LockOptions, Recovery};

/// Outcome of a bridge operation
///
/// Serializes as `{"success": true, ...payload}` or
/// `{"success": false, "errorKind": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> OperationResult<T> {
    fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error_kind: None,
            message: None,
        }
    }

    fn failed(err: &BackupError) -> Self {
        Self {
            success: false,
            payload: None,
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
        }
    }

    /// Convert back into a `Result` for Rust callers
    pub fn into_result(self) -> Result<T, (ErrorKind, String)> {
        match (self.payload, self.error_kind) {
            (Some(payload), _) if self.success => Ok(payload),
            (_, kind) => Err((
                kind.unwrap_or(ErrorKind::Io),
                self.message.unwrap_or_default(),
            )),
        }
    }
}

/// Payload of a successful backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBackup {
    pub entry: BackupEntry,
    pub pruned: Vec<BackupId>,
}

/// Payload of a successful restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredBackup {
    pub restored: BackupEntry,
    pub safety_backup: BackupEntry,
}

/// Payload of a successful settings update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedSettings {
    pub settings: BackupSettings,
}

/// Service for backup management of one profile
pub struct BackupService {
    engine: BackupEngine,
    restore: RestoreEngine,
    profile_dir: PathBuf,
    settings: watch::Sender<BackupSettings>,
    events: EventSender,
}

impl BackupService {
    /// Open the service for the profile at `profile_dir` backed up into `store`
    pub async fn open(
        store: IndexStore,
        lock_options: LockOptions,
        profile_dir: impl Into<PathBuf>,
    ) -> Self {
        let engine = BackupEngine::new(store, lock_options);
        let (settings, _) = watch::channel(engine.settings().await);
        let (events, _) = events::channel();

        Self {
            restore: RestoreEngine::new(engine.clone()),
            engine,
            profile_dir: profile_dir.into(),
            settings,
            events,
        }
    }

    /// The underlying backup engine
    pub fn engine(&self) -> &BackupEngine {
        &self.engine
    }

    /// Live profile directory this service backs up and restores
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Subscribe to completion notifications
    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.events.subscribe()
    }

    /// Snapshot the live profile now
    pub async fn create_backup(&self) -> OperationResult<CreatedBackup> {
        match self.engine.create_backup(&self.profile_dir).await {
            Ok(report) => {
                self.warn_if_unrecoverable(&report);
                publish(
                    &self.events,
                    BackupEvent::BackupCreated {
                        entry: report.entry.clone(),
                        pruned: report.pruned.clone(),
                        scheduled: false,
                    },
                );
                OperationResult::ok(CreatedBackup {
                    entry: report.entry,
                    pruned: report.pruned,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, retryable = e.is_retryable(), "Backup failed");
                publish(&self.events, BackupEvent::backup_failed(&e, false));
                OperationResult::failed(&e)
            }
        }
    }

    /// Retained backups, most recent first
    pub async fn list_backups(&self) -> Vec<BackupEntry> {
        self.engine.list_backups().await
    }

    /// Backup directories no longer referenced by the index
    pub async fn find_orphans(&self) -> BackupResult<Vec<BackupId>> {
        self.engine.find_orphans().await
    }

    /// Restore the live profile from backup `id`
    pub async fn restore(&self, id: &str) -> OperationResult<RestoredBackup> {
        let result = match BackupId::parse(id) {
            Ok(id) => self.restore.restore(&id, &self.profile_dir).await,
            Err(e) => Err(BackupError::Validation(e.to_string())),
        };

        match result {
            Ok(report) => {
                self.warn_if_unrecoverable(&report.safety_backup);
                publish(
                    &self.events,
                    BackupEvent::RestoreCompleted {
                        restored: report.restored.id.clone(),
                        safety_backup: report.safety_backup.entry.id.clone(),
                    },
                );
                OperationResult::ok(RestoredBackup {
                    restored: report.restored,
                    safety_backup: report.safety_backup.entry,
                })
            }
            Err(e) => {
                if e.is_not_found() {
                    tracing::warn!(backup_id = id, "Restore target not found");
                } else {
                    tracing::error!(
                        backup_id = id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Restore failed"
                    );
                }
                publish(
                    &self.events,
                    BackupEvent::RestoreFailed {
                        error_kind: e.kind(),
                        message: e.to_string(),
                    },
                );
                OperationResult::failed(&e)
            }
        }
    }

    /// Current backup settings as persisted in the index
    ///
    /// Picks up changes made by other processes and forwards them to local
    /// watchers.
    pub async fn get_settings(&self) -> BackupSettings {
        let persisted = self.engine.settings().await;
        self.settings.send_if_modified(|current| {
            if *current == persisted {
                false
            } else {
                *current = persisted.clone();
                true
            }
        });
        persisted
    }

    /// Persist new settings and notify the scheduler
    pub async fn set_settings(&self, settings: BackupSettings) -> OperationResult<UpdatedSettings> {
        match self.engine.update_settings(settings).await {
            Ok(settings) => {
                self.settings.send_replace(settings.clone());
                publish(
                    &self.events,
                    BackupEvent::SettingsUpdated {
                        settings: settings.clone(),
                    },
                );
                OperationResult::ok(UpdatedSettings { settings })
            }
            Err(e) => OperationResult::failed(&e),
        }
    }

    /// Observe settings changes
    pub fn watch_settings(&self) -> watch::Receiver<BackupSettings> {
        self.settings.subscribe()
    }

    /// A scheduler for this profile wired to the service's settings and
    /// notifications
    pub fn scheduler(&self) -> BackupScheduler {
        BackupScheduler::new(
            self.engine.clone(),
            self.profile_dir.clone(),
            self.watch_settings(),
            self.events.clone(),
        )
    }

    fn warn_if_unrecoverable(&self, report: &BackupReport) {
        if report.recovery == Recovery::Unrecoverable {
            let err = BackupError::MetadataUnrecoverable(
                self.engine.store().metadata_file().display().to_string(),
            );
            publish(
                &self.events,
                BackupEvent::Warning {
                    error_kind: err.kind(),
                    message: err.to_string(),
                },
            );
        }
    }
}
