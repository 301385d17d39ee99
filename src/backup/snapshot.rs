//! Recursive directory snapshots
//!
//! Copies a profile directory tree into a new backup directory byte-for-byte,
//! tallying bytes and files as it goes. A failed copy never leaves a partial
//! backup directory behind.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{BackupError, BackupResult};

/// Deepest directory nesting followed below the source root
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Totals of one completed snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Bytes copied
    pub size: u64,
    /// Regular files copied
    pub file_count: u64,
}

/// Copies directory trees
#[derive(Debug, Clone, Copy)]
pub struct SnapshotCopier {
    max_depth: usize,
}

impl Default for SnapshotCopier {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SnapshotCopier {
    /// Create a copier with the default depth limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a copier that refuses trees nested deeper than `max_depth`
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Copy `source` into the new directory `dest`
    ///
    /// `dest` must not exist yet. Symbolic links are followed. On any failure
    /// everything created under `dest` is removed and
    /// [`BackupError::SnapshotFailed`] is returned.
    pub async fn copy(&self, source: &Path, dest: &Path) -> BackupResult<SnapshotStats> {
        if dest.starts_with(source) {
            return Err(BackupError::snapshot_failed(
                source,
                format!("destination {} is inside the source", dest.display()),
            ));
        }

        match fs::metadata(source).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(BackupError::snapshot_failed(source, "not a directory")),
            Err(e) => return Err(BackupError::snapshot_failed(source, e)),
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BackupError::snapshot_failed(source, e))?;
        }

        // create_dir (not create_dir_all) so an existing directory is never
        // adopted and later cleaned up by mistake
        fs::create_dir(dest).await.map_err(|e| {
            BackupError::snapshot_failed(source, format!("{}: {}", dest.display(), e))
        })?;

        match self.copy_tree(source, dest).await {
            Ok(stats) => Ok(stats),
            Err(cause) => {
                if let Err(e) = fs::remove_dir_all(dest).await {
                    tracing::warn!(
                        path = %dest.display(),
                        error = %e,
                        "Failed to clean up partial snapshot"
                    );
                }
                Err(BackupError::snapshot_failed(source, cause))
            }
        }
    }

    async fn copy_tree(&self, source: &Path, dest: &Path) -> Result<SnapshotStats, String> {
        let mut stats = SnapshotStats::default();
        let mut pending: Vec<(PathBuf, PathBuf, usize)> =
            vec![(source.to_path_buf(), dest.to_path_buf(), 0)];

        while let Some((src_dir, dst_dir, depth)) = pending.pop() {
            let mut entries = fs::read_dir(&src_dir)
                .await
                .map_err(|e| format!("{}: {}", src_dir.display(), e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| format!("{}: {}", src_dir.display(), e))?
            {
                let src_path = entry.path();
                let dst_path = dst_dir.join(entry.file_name());

                // fs::metadata follows symlinks
                let meta = fs::metadata(&src_path)
                    .await
                    .map_err(|e| format!("{}: {}", src_path.display(), e))?;

                if meta.is_dir() {
                    if depth + 1 > self.max_depth {
                        return Err(format!(
                            "{}: nested deeper than {} levels",
                            src_path.display(),
                            self.max_depth
                        ));
                    }
                    fs::create_dir(&dst_path)
                        .await
                        .map_err(|e| format!("{}: {}", dst_path.display(), e))?;
                    pending.push((src_path, dst_path, depth + 1));
                } else if meta.is_file() {
                    let bytes = fs::copy(&src_path, &dst_path)
                        .await
                        .map_err(|e| format!("{}: {}", src_path.display(), e))?;
                    stats.size += bytes;
                    stats.file_count += 1;
                } else {
                    tracing::debug!(path = %src_path.display(), "Skipping special file");
                }
            }
        }

        Ok(stats)
    }
}

/// Sum the size and count of regular files below `dir`
pub async fn measure(dir: &Path) -> BackupResult<SnapshotStats> {
    let mut stats = SnapshotStats::default();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = fs::metadata(entry.path()).await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                stats.size += meta.len();
                stats.file_count += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(temp: &TempDir) -> PathBuf {
        let dir = temp.path().join("profile");
        std::fs::create_dir_all(dir.join("hotkeys")).unwrap();
        std::fs::create_dir_all(dir.join("holding-tank").join("tab-1")).unwrap();
        std::fs::write(dir.join("state.json"), "0123456789").unwrap();
        std::fs::write(dir.join("hotkeys").join("page-1.json"), "abcde").unwrap();
        std::fs::write(
            dir.join("holding-tank").join("tab-1").join("list.json"),
            "xyz",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_copy_preserves_structure() {
        let temp = TempDir::new().unwrap();
        let source = profile(&temp);
        let dest = temp.path().join("backups").join("backup-1");

        let stats = SnapshotCopier::new().copy(&source, &dest).await.unwrap();

        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.size, 18);
        assert_eq!(
            std::fs::read(dest.join("hotkeys").join("page-1.json")).unwrap(),
            b"abcde"
        );
        assert_eq!(
            std::fs::read(dest.join("holding-tank").join("tab-1").join("list.json")).unwrap(),
            b"xyz"
        );
        assert_eq!(measure(&dest).await.unwrap(), stats);
    }

    #[tokio::test]
    async fn test_empty_source_yields_empty_dir() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("empty");
        std::fs::create_dir(&source).unwrap();
        let dest = temp.path().join("out");

        let stats = SnapshotCopier::new().copy(&source, &dest).await.unwrap();
        assert_eq!(stats, SnapshotStats::default());
        assert!(dest.is_dir());
    }

    #[tokio::test]
    async fn test_missing_source_fails_without_creating_dest() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out");

        let err = SnapshotCopier::new()
            .copy(&temp.path().join("nope"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotFailed { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_existing_dest_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let source = profile(&temp);
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep.txt"), "mine").unwrap();

        let err = SnapshotCopier::new().copy(&source, &dest).await.unwrap_err();

        assert!(matches!(err, BackupError::SnapshotFailed { .. }));
        assert_eq!(std::fs::read(dest.join("keep.txt")).unwrap(), b"mine");
    }

    #[tokio::test]
    async fn test_depth_limit_cleans_up() {
        let temp = TempDir::new().unwrap();
        let source = profile(&temp);
        let dest = temp.path().join("out");

        let err = SnapshotCopier::with_max_depth(1)
            .copy(&source, &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotFailed { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_dest_inside_source_rejected() {
        let temp = TempDir::new().unwrap();
        let source = profile(&temp);

        let err = SnapshotCopier::new()
            .copy(&source, &source.join("backups").join("backup-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::SnapshotFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_are_followed() {
        let temp = TempDir::new().unwrap();
        let source = profile(&temp);
        let outside = temp.path().join("shared.json");
        std::fs::write(&outside, "shared").unwrap();
        std::os::unix::fs::symlink(&outside, source.join("link.json")).unwrap();
        let dest = temp.path().join("out");

        let stats = SnapshotCopier::new().copy(&source, &dest).await.unwrap();

        assert_eq!(stats.file_count, 4);
        let copied = dest.join("link.json");
        assert!(!std::fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(copied).unwrap(), b"shared");
    }
}
