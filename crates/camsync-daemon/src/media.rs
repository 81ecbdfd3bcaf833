//! Local media retention
//!
//! Recordings live under `{media.path}/{device}`. Cleanup walks that tree on the
//! blocking pool and removes files whose modification time is past retention.

use async_trait::async_trait;
use camsync_core::{DeviceError, DeviceId, MediaStore};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct MediaRetention {
    root: PathBuf,
    retention: Duration,
}

impl MediaRetention {
    pub fn new(root: impl Into<PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    /// Directory holding a device's recordings
    pub fn device_dir(&self, device: &DeviceId) -> PathBuf {
        let name: String = device
            .as_str()
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        let name = name.trim_matches('.');
        self.root.join(if name.is_empty() { "_" } else { name })
    }
}

/// Outcome of one retention pass over a device directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub removed: usize,
    pub errors: usize,
}

/// Remove regular files under `dir` last modified before `cutoff`.
///
/// A missing directory counts as empty. Entries that cannot be read or removed
/// are logged and skipped so the rest of the tree is still cleaned.
pub fn purge_older_than(dir: &Path, cutoff: SystemTime) -> PurgeSummary {
    let mut summary = PurgeSummary::default();
    if !dir.exists() {
        return summary;
    }

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable media entry");
                summary.errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let expired = match entry.metadata().map(|m| m.modified()) {
            Ok(Ok(modified)) => modified < cutoff,
            Ok(Err(e)) => {
                warn!(path = %entry.path().display(), error = %e, "No modification time");
                summary.errors += 1;
                continue;
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                summary.errors += 1;
                continue;
            }
        };
        if !expired {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => summary.removed += 1,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to remove recording");
                summary.errors += 1;
            }
        }
    }
    summary
}

#[async_trait]
impl MediaStore for MediaRetention {
    async fn purge_expired(&self, device: &DeviceId) -> Result<(), DeviceError> {
        let dir = self.device_dir(device);
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let walk_dir = dir.clone();
        let summary = tokio::task::spawn_blocking(move || purge_older_than(&walk_dir, cutoff))
            .await
            .map_err(|e| DeviceError::Protocol(format!("Media cleanup task failed: {}", e)))?;

        if summary.removed > 0 {
            info!(device = %device, removed = summary.removed, "Removed expired recordings");
        } else {
            debug!(device = %device, dir = %dir.display(), "No expired recordings");
        }

        if summary.errors > 0 {
            return Err(DeviceError::Protocol(format!(
                "{} entries under {} could not be cleaned",
                summary.errors,
                dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_dir_is_sanitized() {
        let media = MediaRetention::new("/var/media", Duration::from_secs(60));
        assert_eq!(
            media.device_dir(&DeviceId::new("192.168.1.50#0")),
            PathBuf::from("/var/media/192.168.1.50_0")
        );
        assert_eq!(
            media.device_dir(&DeviceId::new("../etc")),
            PathBuf::from("/var/media/_etc")
        );
    }

    #[test]
    fn test_purge_respects_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2024-05-01");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        std::fs::write(nested.join("b.mp4"), b"b").unwrap();

        assert_eq!(purge_older_than(dir.path(), SystemTime::UNIX_EPOCH).removed, 0);

        let future = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(
            purge_older_than(dir.path(), future),
            PurgeSummary {
                removed: 2,
                errors: 0
            }
        );
        assert!(!nested.join("b.mp4").exists());
        assert!(nested.exists());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            purge_older_than(&dir.path().join("nope"), SystemTime::now()),
            PurgeSummary::default()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_bad_entry_does_not_stop_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"b").unwrap();
        std::fs::write(nested.join("c.mp4"), b"c").unwrap();
        // Dangling link: its target cannot be stat'ed
        std::os::unix::fs::symlink(dir.path().join("gone.mp4"), nested.join("broken.mp4"))
            .unwrap();

        let future = SystemTime::now() + Duration::from_secs(60);
        let summary = purge_older_than(dir.path(), future);

        assert_eq!(summary.removed, 2);
        assert_eq!(summary.errors, 1);
        assert!(!dir.path().join("b.mp4").exists());
        assert!(!nested.join("c.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_partial_cleanup_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaRetention::new(dir.path(), Duration::from_secs(3_600));
        let device = DeviceId::new("SIM-10.0.0.9");
        let device_dir = media.device_dir(&device);
        std::fs::create_dir_all(&device_dir).unwrap();
        std::fs::write(device_dir.join("old.mp4"), b"old").unwrap();
        std::fs::File::options()
            .write(true)
            .open(device_dir.join("old.mp4"))
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
            .unwrap();
        std::os::unix::fs::symlink(device_dir.join("gone"), device_dir.join("broken.mp4")).unwrap();

        let err = media.purge_expired(&device).await.unwrap_err();
        assert_eq!(err.kind(), camsync_core::ErrorKind::Protocol);
        assert!(!device_dir.join("old.mp4").exists());
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaRetention::new(dir.path(), Duration::from_secs(3_600));
        let device = DeviceId::new("SIM-10.0.0.9");
        let device_dir = media.device_dir(&device);
        std::fs::create_dir_all(&device_dir).unwrap();
        std::fs::write(device_dir.join("clip.mp4"), b"clip").unwrap();

        media.purge_expired(&device).await.unwrap();
        assert!(device_dir.join("clip.mp4").exists());
    }
}
