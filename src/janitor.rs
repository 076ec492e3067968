//! Periodic removal of working files nobody came back for.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::progress::ProgressStore;

/// Remove regular files directly inside `work_dir` that were last modified
/// more than `retention` ago. Subdirectories (the log directory) are left alone.
pub fn sweep(work_dir: &Path, retention: Duration) -> Result<usize> {
    if !work_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in WalkDir::new(work_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", work_dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
        if matches!(modified, Some(t) if t < cutoff) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale file {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => warn!("Could not remove {}: {}", entry.path().display(), e),
            }
        }
    }

    Ok(removed)
}

/// Run [`sweep`] and prune finished progress entries on a fixed interval.
pub async fn run(work_dir: std::path::PathBuf, progress: ProgressStore, retention: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let dir = work_dir.clone();
        match tokio::task::spawn_blocking(move || sweep(&dir, retention)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(n)) => info!("Janitor removed {} stale files", n),
            Ok(Err(e)) => warn!("Janitor sweep failed: {}", e),
            Err(e) => warn!("Janitor task panicked: {}", e),
        }

        let age = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::hours(1));
        let pruned = progress.prune(age).await;
        if pruned > 0 {
            info!("Janitor dropped {} finished progress entries", pruned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_sweep_missing_dir_is_noop() {
        let dir = assert_fs::TempDir::new().unwrap();
        assert_eq!(sweep(&dir.path().join("absent"), Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_sweep_keeps_fresh_files_and_log_dir() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("a.gif").write_str("gif").unwrap();
        dir.child("log/gifcut.log").write_str("log line").unwrap();

        assert_eq!(sweep(dir.path(), Duration::from_secs(3600)).unwrap(), 0);
        assert!(dir.child("a.gif").path().exists());
    }

    #[test]
    fn test_sweep_removes_expired_files() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("a.gif").write_str("gif").unwrap();
        dir.child("b.mp4.part").touch().unwrap();
        dir.child("log/gifcut.log").write_str("log line").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(sweep(dir.path(), Duration::from_millis(1)).unwrap(), 2);
        assert!(!dir.child("a.gif").path().exists());
        assert!(dir.child("log/gifcut.log").path().exists());
    }
}
