//! Completion notifications
//!
//! Every backup, restore and settings change publishes a [`BackupEvent`] so a
//! UI can show success or error dialogs without polling.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{BackupError, ErrorKind};
use crate::models::{BackupEntry, BackupId, BackupSettings};

/// Capacity of the notification channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A notification about a finished operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackupEvent {
    #[serde(rename_all = "camelCase")]
    BackupCreated {
        entry: BackupEntry,
        pruned: Vec<BackupId>,
        scheduled: bool,
    },
    #[serde(rename_all = "camelCase")]
    BackupFailed {
        error_kind: ErrorKind,
        message: String,
        scheduled: bool,
    },
    #[serde(rename_all = "camelCase")]
    RestoreCompleted {
        restored: BackupId,
        safety_backup: BackupId,
    },
    #[serde(rename_all = "camelCase")]
    RestoreFailed { error_kind: ErrorKind, message: String },
    #[serde(rename_all = "camelCase")]
    SettingsUpdated { settings: BackupSettings },
    /// Non-fatal condition the user should know about
    #[serde(rename_all = "camelCase")]
    Warning { error_kind: ErrorKind, message: String },
}

impl BackupEvent {
    /// Failure event for a backup
    pub fn backup_failed(err: &BackupError, scheduled: bool) -> Self {
        Self::BackupFailed {
            error_kind: err.kind(),
            message: err.to_string(),
            scheduled,
        }
    }

    /// Whether this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::BackupFailed { .. } | Self::RestoreFailed { .. })
    }
}

/// Sending half of the notification channel
pub type EventSender = broadcast::Sender<BackupEvent>;

/// Create a notification channel
pub fn channel() -> (EventSender, broadcast::Receiver<BackupEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Publish an event; having no subscribers is not an error
pub fn publish(sender: &EventSender, event: BackupEvent) {
    if sender.send(event).is_err() {
        tracing::trace!("No subscribers for backup event");
    }
}
