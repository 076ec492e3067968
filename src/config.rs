use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, GifcutError};

fn default_retention_minutes() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub clip: ClipConfig,
    pub media: MediaConfig,
    pub downloader: DownloaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Directory holding intermediate videos, finished GIFs and logs
    pub work_dir: PathBuf,
    /// Working files older than this are removed by the janitor
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,
    /// How often the janitor runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    /// Start offset used when the request omits one
    pub default_start_secs: u64,
    /// Duration used when the request omits one
    pub default_duration_secs: u64,
    /// Requested durations are clamped into [min, max]
    pub min_duration_secs: u64,
    pub max_duration_secs: u64,
    /// Extra seconds fetched before the clip so seeking lands on a keyframe
    pub buffer_before_secs: u64,
    /// Extra seconds fetched after the clip
    pub buffer_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Output frame rate of the GIF
    pub fps: u32,
    /// Output width in pixels; height keeps the aspect ratio
    pub width: u32,
    /// GIF loop count, 0 loops forever
    pub loop_count: i32,
    /// Generate an optimised palette instead of the default one
    pub palette: bool,
    /// Additional options appended before the GIF output path
    pub extra_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Path to yt-dlp binary
    pub binary_path: String,
    /// Format selector passed with -f
    pub format: String,
    /// Container to recode downloads into, if any
    pub recode_format: Option<String>,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    /// Bypass geographic restriction via faking X-Forwarded-For
    pub geo_bypass: bool,
    /// Verify TLS certificates of the source site
    pub check_certificates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5500,
                work_dir: PathBuf::from("temp"),
                retention_minutes: default_retention_minutes(),
                sweep_interval_secs: default_sweep_interval_secs(),
            },
            clip: ClipConfig {
                default_start_secs: 10,
                default_duration_secs: 3,
                min_duration_secs: 1,
                max_duration_secs: 10,
                buffer_before_secs: 2,
                buffer_after_secs: 2,
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                fps: 15,
                width: 480,
                loop_count: 0,
                palette: false,
                extra_options: vec![],
            },
            downloader: DownloaderConfig {
                binary_path: "yt-dlp".to_string(),
                format: "best[ext=mp4]/best".to_string(),
                recode_format: Some("mp4".to_string()),
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
                accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
                accept_language: "en-US,en;q=0.9".to_string(),
                geo_bypass: true,
                check_certificates: false,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GifcutError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| GifcutError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GifcutError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| GifcutError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let clip = &self.clip;
        if clip.min_duration_secs == 0 {
            return Err(GifcutError::Config("clip.min_duration_secs must be at least 1".to_string()));
        }
        if clip.min_duration_secs > clip.max_duration_secs {
            return Err(GifcutError::Config(format!(
                "clip.min_duration_secs ({}) exceeds clip.max_duration_secs ({})",
                clip.min_duration_secs, clip.max_duration_secs
            )));
        }
        if self.media.fps == 0 {
            return Err(GifcutError::Config("media.fps must be positive".to_string()));
        }
        if self.media.width == 0 {
            return Err(GifcutError::Config("media.width must be positive".to_string()));
        }
        Ok(())
    }
}
