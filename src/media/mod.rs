// Modular media processing architecture
//
// - Processor: ffmpeg-backed implementation of the trait below
// - Commands: command builders and GIF encoder settings

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::request::ClipWindow;

/// Main trait for media processing operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Fetch only the buffered window of a remote media URL
    async fn trim_remote(&self, url: &str, window: &ClipWindow, output_path: &Path) -> Result<()>;

    /// Replace a local file with its buffered window
    async fn trim_local_in_place(&self, video_path: &Path, window: &ClipWindow) -> Result<()>;

    /// Encode `duration` seconds starting at `seek` into an animated GIF
    async fn render_gif(
        &self,
        video_path: &Path,
        seek: u64,
        duration: u64,
        output_path: &Path,
    ) -> Result<()>;

    /// Check if media processor is available
    async fn check_availability(&self) -> Result<()>;

    /// Get media processor version information
    async fn get_version_info(&self) -> Result<String>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config))
    }
}
