//! Retention policy
//!
//! Decides which backups to prune after a new one is recorded. The plan is
//! only reported here; the engine deletes directories after the index write
//! succeeds.

use crate::models::{BackupEntry, BackupId, BackupSettings};

/// Outcome of applying the retention policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Entries to keep, most recent first
    pub keep: Vec<BackupEntry>,
    /// Entries to remove, most recent first
    pub remove: Vec<BackupEntry>,
}

impl RetentionPlan {
    /// Ids of the entries to remove
    pub fn removed_ids(&self) -> Vec<BackupId> {
        self.remove.iter().map(|e| e.id.clone()).collect()
    }
}

/// Split `backups` (most recent first) into kept and pruned entries
///
/// An entry is pruned when it sits beyond position `max_count - 1` or is
/// older than `now_ms - max_age_ms`. The most recent entry is always kept,
/// as is `protect` if given. A zero limit disables that rule.
pub fn plan(
    backups: &[BackupEntry],
    settings: &BackupSettings,
    now_ms: i64,
    protect: Option<&BackupId>,
) -> RetentionPlan {
    let age_cutoff = if settings.max_age_ms > 0 {
        Some(now_ms.saturating_sub(settings.max_age_ms.min(i64::MAX as u64) as i64))
    } else {
        None
    };

    let mut result = RetentionPlan::default();

    for (position, entry) in backups.iter().enumerate() {
        let over_count = settings.max_count > 0 && position >= settings.max_count as usize;
        let too_old = age_cutoff.is_some_and(|cutoff| entry.timestamp < cutoff);
        let protected = position == 0 || protect == Some(&entry.id);

        if (over_count || too_old) && !protected {
            result.remove.push(entry.clone());
        } else {
            result.keep.push(entry.clone());
        }
    }

    result
}
