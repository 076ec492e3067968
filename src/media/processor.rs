use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{info, debug};

use crate::config::MediaConfig;
use crate::error::{Result, GifcutError};
use crate::request::ClipWindow;
use super::{MediaProcessorTrait, MediaCommandBuilder, GifSettings};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
    settings: GifSettings,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);
        let settings = GifSettings::from(&config);

        Self {
            config,
            command_builder,
            settings,
        }
    }
}

/// `clip.mp4` -> `clip.mp4.trimmed.mp4`, next to the source so the rename stays on one filesystem.
fn trimmed_path(video_path: &Path) -> PathBuf {
    let mut name: OsString = video_path.as_os_str().to_owned();
    name.push(".trimmed.mp4");
    PathBuf::from(name)
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn trim_remote(&self, url: &str, window: &ClipWindow, output_path: &Path) -> Result<()> {
        info!("Trimming {}s..{}s from {} -> {}",
              window.buffer_start, window.window_end, url, output_path.display());

        let command = self.command_builder.trim_remote(url, window, output_path);
        command.execute().await?;

        info!("Remote trim completed");
        Ok(())
    }

    async fn trim_local_in_place(&self, video_path: &Path, window: &ClipWindow) -> Result<()> {
        let trimmed = trimmed_path(video_path);
        info!("Trimming {}s..{}s of {}",
              window.buffer_start, window.window_end, video_path.display());

        let command = self.command_builder.trim_local(video_path, window, trimmed.as_path());
        if let Err(e) = command.execute().await {
            let _ = fs::remove_file(&trimmed).await;
            return Err(e);
        }

        fs::rename(&trimmed, video_path).await?;
        debug!("Replaced {} with trimmed copy", video_path.display());
        Ok(())
    }

    async fn render_gif(
        &self,
        video_path: &Path,
        seek: u64,
        duration: u64,
        output_path: &Path,
    ) -> Result<()> {
        info!("Rendering GIF from {} ({}s at +{}s) -> {}",
              video_path.display(), duration, seek, output_path.display());

        let command = self.command_builder.render_gif(video_path, seek, duration, &self.settings, output_path);
        command.execute().await?;

        info!("GIF rendering completed");
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| GifcutError::Media(format!("Media processor not available: {}", e)))?;

        info!("Media processor is available");
        Ok(())
    }

    async fn get_version_info(&self) -> Result<String> {
        debug!("Getting media processor version information");

        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| GifcutError::Media(format!("Failed to execute media processor: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            // The first line carries the version
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(GifcutError::Media(format!("Media processor version check failed: {}", stderr)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_path_sits_next_to_source() {
        let path = Path::new("/work/abc.mp4");
        assert_eq!(trimmed_path(path), PathBuf::from("/work/abc.mp4.trimmed.mp4"));
    }

    #[tokio::test]
    async fn test_failed_local_trim_leaves_source_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"not really a video").unwrap();

        let mut config = crate::config::Config::default().media;
        config.binary_path = "/nonexistent/ffmpeg-binary".to_string();
        let processor = MediaProcessorImpl::new(config);

        let window = ClipWindow { buffer_start: 0, window_end: 5, gif_seek: 0, duration: 3 };
        let result = processor.trim_local_in_place(&source, &window).await;

        assert!(matches!(result, Err(GifcutError::Media(_))));
        assert_eq!(std::fs::read(&source).unwrap(), b"not really a video");
        assert!(!trimmed_path(&source).exists());
    }
}
