use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::download::{DownloaderFactory, DownloaderTrait};
use crate::error::{GifcutError, Result};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::progress::{DownloadProgress, ProgressStore, Stage};
use crate::request::ClipSpec;
use crate::source::{validate_url, SourceKind};

pub struct Workflow {
    config: Config,
    media: Arc<dyn MediaProcessorTrait>,
    downloader: Arc<dyn DownloaderTrait>,
    progress: ProgressStore,
}

/// Task ids double as file names, so only well-formed UUIDs are accepted.
pub fn validate_task_id(task_id: &str) -> Result<()> {
    Uuid::parse_str(task_id)
        .map(|_| ())
        .map_err(|_| GifcutError::TaskNotFound(task_id.to_string()))
}

impl Workflow {
    pub fn new(config: Config) -> Result<Self> {
        let media: Arc<dyn MediaProcessorTrait> =
            Arc::from(MediaProcessorFactory::create_processor(config.media.clone()));
        let downloader: Arc<dyn DownloaderTrait> =
            Arc::from(DownloaderFactory::create_downloader(config.downloader.clone()));
        Self::with_components(config, media, downloader, ProgressStore::new())
    }

    pub fn with_components(
        config: Config,
        media: Arc<dyn MediaProcessorTrait>,
        downloader: Arc<dyn DownloaderTrait>,
        progress: ProgressStore,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.server.work_dir)?;

        Ok(Self {
            config,
            media,
            downloader,
            progress,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.server.work_dir
    }

    /// Verify both external tools respond before serving requests
    pub async fn check_dependencies(&self) -> Result<(String, String)> {
        let media_version = self.media.get_version_info().await?;
        let downloader_version = self.downloader.get_version_info().await?;
        Ok((media_version, downloader_version))
    }

    pub fn gif_path(&self, task_id: &str) -> Result<PathBuf> {
        validate_task_id(task_id)?;
        Ok(self.work_dir().join(format!("{}.gif", task_id)))
    }

    /// Register a new task and run it in the background. Returns the task id.
    pub async fn submit(self: &Arc<Self>, spec: ClipSpec) -> String {
        let task_id = Uuid::new_v4().to_string();
        self.progress.start(&task_id).await;

        let workflow = Arc::clone(self);
        let id = task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = workflow.convert(&id, &spec).await {
                debug!("Background task {} ended with: {}", id, e);
            }
        });

        task_id
    }

    /// Run a task to completion in the caller's context.
    ///
    /// Unlike [`Workflow::submit`], a failed task leaves no progress entry
    /// behind: the error goes straight back to the caller.
    pub async fn run_to_completion(&self, spec: &ClipSpec) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        self.progress.start(&task_id).await;

        match self.convert(&task_id, spec).await {
            Ok(_) => Ok(task_id),
            Err(e) => {
                self.progress.remove(&task_id).await;
                Err(e)
            }
        }
    }

    /// Fetch, trim and encode one clip. On failure every working file of the
    /// task is removed and the progress entry is marked failed.
    ///
    /// A task whose progress entry disappears mid-run (cleanup, download) is
    /// abandoned at the next stage and its files are removed.
    pub async fn convert(&self, task_id: &str, spec: &ClipSpec) -> Result<PathBuf> {
        let e = match self.run_pipeline(task_id, spec).await {
            Ok(gif_path) => {
                if self.progress.complete(task_id).await {
                    info!("Task {} finished: {}", task_id, gif_path.display());
                    return Ok(gif_path);
                }
                GifcutError::Cancelled(task_id.to_string())
            }
            Err(e) => e,
        };

        match &e {
            GifcutError::Cancelled(_) => info!("Task {} was cancelled, discarding its files", task_id),
            _ => error!("Task {} failed: {}", task_id, e),
        }
        if let Err(cleanup_err) = self.remove_task_files(task_id).await {
            warn!("Could not clean up files of task {}: {}", task_id, cleanup_err);
        }
        self.progress.fail(task_id, &e.to_string()).await;
        Err(e)
    }

    async fn enter_stage(&self, task_id: &str, stage: Stage) -> Result<()> {
        if self.progress.set_stage(task_id, stage).await {
            Ok(())
        } else {
            Err(GifcutError::Cancelled(task_id.to_string()))
        }
    }

    async fn run_pipeline(&self, task_id: &str, spec: &ClipSpec) -> Result<PathBuf> {
        validate_task_id(task_id)?;
        validate_url(&spec.url)?;
        fs::create_dir_all(self.work_dir()).await?;

        self.enter_stage(task_id, Stage::Preparing).await?;
        let window = spec.window(&self.config.clip);

        let video_path = match SourceKind::classify(&spec.url) {
            SourceKind::Direct => {
                info!("Direct video link detected: {}", spec.url);
                let video_path = self.work_dir().join(format!("{}.mp4", task_id));
                self.enter_stage(task_id, Stage::DirectFetch).await?;
                self.media.trim_remote(&spec.url, &window, &video_path).await?;
                self.enter_stage(task_id, Stage::Downloaded).await?;
                video_path
            }
            SourceKind::Page => {
                self.enter_stage(task_id, Stage::Connecting).await?;
                let video_path = self.download_with_progress(task_id, &spec.url).await?;
                self.enter_stage(task_id, Stage::Downloaded).await?;

                info!("Using video: {}", video_path.display());
                self.enter_stage(task_id, Stage::Processing).await?;
                self.media.trim_local_in_place(&video_path, &window).await?;
                video_path
            }
        };

        self.enter_stage(task_id, Stage::Processing).await?;

        let gif_path = self.gif_path(task_id)?;
        self.enter_stage(task_id, Stage::Encoding).await?;
        self.media
            .render_gif(&video_path, window.gif_seek, window.duration, &gif_path)
            .await?;

        self.enter_stage(task_id, Stage::Finalizing).await?;
        match fs::remove_file(&video_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", video_path.display(), e),
        }

        Ok(gif_path)
    }

    async fn download_with_progress(&self, task_id: &str, url: &str) -> Result<PathBuf> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DownloadProgress>();

        let progress = self.progress.clone();
        let id = task_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                progress.record_download(&id, update).await;
            }
        });

        let result = self.downloader.download(url, self.work_dir(), task_id, tx).await;
        // The sender is gone once download returns, so the forwarder drains and exits.
        let _ = forwarder.await;
        result
    }

    /// Delete every working file of a task. Returns how many were removed.
    pub async fn remove_task_files(&self, task_id: &str) -> Result<usize> {
        validate_task_id(task_id)?;

        let matches: Vec<PathBuf> = WalkDir::new(self.work_dir())
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name().to_string_lossy().starts_with(task_id))
            .map(|e| e.into_path())
            .collect();

        let mut removed = 0;
        for path in matches {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    /// Forget a task: its files and its progress entry.
    pub async fn cleanup(&self, task_id: &str) -> Result<usize> {
        let removed = self.remove_task_files(task_id).await?;
        self.progress.remove(task_id).await;
        info!("Cleaned up task {} ({} files)", task_id, removed);
        Ok(removed)
    }
}
