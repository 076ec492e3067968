//! Shared progress table polled by clients while a conversion runs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Share of the overall bar reserved for the download phase.
const DOWNLOAD_WEIGHT: f64 = 0.6;
const DOWNLOAD_CEILING: f64 = 60.0;
/// Reported when the downloader knows neither the size nor an estimate.
const UNKNOWN_SIZE_PERCENT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Completed,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub progress: f64,
    pub status: String,
    pub download_percent: f64,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Byte counters reported by the downloader.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
}

/// Fixed checkpoints of the conversion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preparing,
    Connecting,
    DirectFetch,
    Downloaded,
    Processing,
    Encoding,
    Finalizing,
    Done,
}

impl Stage {
    /// (overall progress, status, download percent)
    pub fn values(self) -> (f64, &'static str, f64) {
        match self {
            Stage::Preparing => (0.0, "Preparing...", 0.0),
            Stage::Connecting => (2.0, "Connecting to server...", 0.0),
            Stage::DirectFetch => (20.0, "Downloading: 20% complete", 30.0),
            Stage::Downloaded => (60.0, "Download complete (100%)", 100.0),
            Stage::Processing => (70.0, "Processing video...", 100.0),
            Stage::Encoding => (80.0, "Converting to GIF...", 100.0),
            Stage::Finalizing => (95.0, "Finalizing...", 100.0),
            Stage::Done => (100.0, "Done! GIF created", 100.0),
        }
    }
}

impl DownloadProgress {
    pub fn percent(&self) -> f64 {
        let total = self
            .total_bytes
            .or(self.total_bytes_estimate)
            .filter(|t| *t > 0);
        match total {
            Some(total) => (self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0),
            None => UNKNOWN_SIZE_PERCENT,
        }
    }
}

fn download_status(percent: f64) -> &'static str {
    if percent < 20.0 {
        "Downloading: starting..."
    } else if percent < 40.0 {
        "Downloading: 20% complete"
    } else if percent < 60.0 {
        "Downloading: 40% complete"
    } else if percent < 80.0 {
        "Downloading: 60% complete"
    } else if percent < 95.0 {
        "Downloading: 80% complete"
    } else {
        "Downloading: finishing..."
    }
}

impl ProgressEntry {
    fn running(progress: f64, status: &str, download_percent: f64) -> Self {
        Self {
            progress,
            status: status.to_string(),
            download_percent,
            state: TaskState::Running,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            progress: 0.0,
            status: "Unknown task".to_string(),
            download_percent: 0.0,
            state: TaskState::Unknown,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn from_stage(stage: Stage) -> Self {
        let (progress, status, download_percent) = stage.values();
        Self::running(progress, status, download_percent)
    }

    pub fn from_download(update: &DownloadProgress) -> Self {
        let percent = update.percent();
        let overall = (percent * DOWNLOAD_WEIGHT).min(DOWNLOAD_CEILING);
        Self::running(overall, download_status(percent), (percent * 10.0).round() / 10.0)
    }
}

/// Cheap-to-clone handle over the task table.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    entries: Arc<RwLock<HashMap<String, ProgressEntry>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, task_id: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(task_id.to_string(), ProgressEntry::from_stage(Stage::Preparing));
    }

    /// Returns false once the task is no longer tracked.
    pub async fn set_stage(&self, task_id: &str, stage: Stage) -> bool {
        self.advance(task_id, ProgressEntry::from_stage(stage)).await
    }

    pub async fn record_download(&self, task_id: &str, update: DownloadProgress) -> bool {
        self.advance(task_id, ProgressEntry::from_download(&update)).await
    }

    /// Replace a running entry unless that would move the bar backwards.
    /// Only `start` creates entries, so updates for removed tasks are dropped.
    async fn advance(&self, task_id: &str, next: ProgressEntry) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(task_id) {
            Some(current) if current.state == TaskState::Running => {
                if next.progress >= current.progress {
                    *current = next;
                } else {
                    current.updated_at = next.updated_at;
                }
            }
            Some(_) => {
                debug!("Ignoring progress update for finished task {}", task_id);
            }
            None => {
                debug!("Ignoring progress update for untracked task {}", task_id);
                return false;
            }
        }
        true
    }

    pub async fn complete(&self, task_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(task_id) {
            Some(entry) => {
                let mut done = ProgressEntry::from_stage(Stage::Done);
                done.state = TaskState::Completed;
                *entry = done;
                true
            }
            None => false,
        }
    }

    pub async fn fail(&self, task_id: &str, message: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(task_id) {
            Some(entry) => {
                entry.state = TaskState::Failed;
                entry.status = "Failed".to_string();
                entry.error = Some(message.to_string());
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, task_id: &str) -> Option<ProgressEntry> {
        self.entries.write().await.remove(task_id)
    }

    pub async fn get(&self, task_id: &str) -> Option<ProgressEntry> {
        self.entries.read().await.get(task_id).cloned()
    }

    /// Current entry, or the placeholder reported for ids we do not know.
    pub async fn snapshot(&self, task_id: &str) -> ProgressEntry {
        self.get(task_id).await.unwrap_or_else(ProgressEntry::unknown)
    }

    /// Drop finished entries nobody has collected. Running tasks are kept.
    pub async fn prune(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.state == TaskState::Running || e.updated_at >= cutoff);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_percent_prefers_exact_total() {
        let p = DownloadProgress { downloaded_bytes: 25, total_bytes: Some(100), total_bytes_estimate: Some(50) };
        assert_eq!(p.percent(), 25.0);

        let est = DownloadProgress { downloaded_bytes: 25, total_bytes: None, total_bytes_estimate: Some(50) };
        assert_eq!(est.percent(), 50.0);

        let unknown = DownloadProgress { downloaded_bytes: 25, ..Default::default() };
        assert_eq!(unknown.percent(), 50.0);
    }

    #[test]
    fn test_download_entry_is_scaled_into_first_sixty_percent() {
        let done = ProgressEntry::from_download(&DownloadProgress {
            downloaded_bytes: 100,
            total_bytes: Some(100),
            total_bytes_estimate: None,
        });
        assert_eq!(done.progress, 60.0);
        assert_eq!(done.status, "Downloading: finishing...");

        let third = ProgressEntry::from_download(&DownloadProgress {
            downloaded_bytes: 1,
            total_bytes: Some(3),
            total_bytes_estimate: None,
        });
        assert_eq!(third.download_percent, 33.3);
        assert_eq!(third.status, "Downloading: 20% complete");
    }

    #[tokio::test]
    async fn test_unknown_task_snapshot() {
        let store = ProgressStore::new();
        let snap = store.snapshot("nope").await;
        assert_eq!(snap.state, TaskState::Unknown);
        assert_eq!(snap.status, "Unknown task");
        assert_eq!(snap.progress, 0.0);
    }

    #[tokio::test]
    async fn test_progress_never_moves_backwards() {
        let store = ProgressStore::new();
        store.start("t").await;
        store.set_stage("t", Stage::Downloaded).await;
        store
            .record_download("t", DownloadProgress { downloaded_bytes: 1, total_bytes: Some(10), total_bytes_estimate: None })
            .await;
        assert_eq!(store.snapshot("t").await.progress, 60.0);

        store.set_stage("t", Stage::Encoding).await;
        assert_eq!(store.snapshot("t").await.status, "Converting to GIF...");
    }

    #[tokio::test]
    async fn test_fail_keeps_error_and_freezes_entry() {
        let store = ProgressStore::new();
        store.start("t").await;
        store.fail("t", "ffmpeg exploded").await;
        store.set_stage("t", Stage::Encoding).await;

        let snap = store.snapshot("t").await;
        assert_eq!(snap.state, TaskState::Failed);
        assert_eq!(snap.error.as_deref(), Some("ffmpeg exploded"));
        assert_eq!(snap.progress, 0.0);
    }

    #[tokio::test]
    async fn test_prune_only_drops_finished_entries() {
        let store = ProgressStore::new();
        for id in ["running", "done", "failed"] {
            store.start(id).await;
        }
        store.complete("done").await;
        store.fail("failed", "boom").await;

        let removed = store.prune(Duration::zero() - Duration::seconds(1)).await;
        assert_eq!(removed, 2);
        assert!(store.get("running").await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_removed_task_is_not_resurrected() {
        let store = ProgressStore::new();
        store.start("t").await;
        store.remove("t").await;

        assert!(!store.set_stage("t", Stage::Encoding).await);
        assert!(
            !store
                .record_download("t", DownloadProgress { downloaded_bytes: 5, total_bytes: Some(10), total_bytes_estimate: None })
                .await
        );
        assert!(!store.complete("t").await);
        assert!(!store.fail("t", "late").await);
        assert!(store.get("t").await.is_none());
    }
}
