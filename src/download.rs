//! Page downloads through yt-dlp, with streamed progress.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::DownloaderConfig;
use crate::error::{GifcutError, Result};
use crate::media::commands::stderr_tail;
use crate::progress::DownloadProgress;
use crate::source::locate_download;

/// Prefix of the progress lines we ask yt-dlp to print.
const PROGRESS_PREFIX: &str = "gifcut-progress:";

/// Receives byte counters while a download runs.
pub type ProgressSink = UnboundedSender<DownloadProgress>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloaderTrait: Send + Sync {
    /// Download `url` into `dir` as `<task_id>.<ext>` and return the file path
    async fn download(
        &self,
        url: &str,
        dir: &Path,
        task_id: &str,
        progress: ProgressSink,
    ) -> Result<PathBuf>;

    /// Check if the downloader is available
    async fn check_availability(&self) -> Result<()>;

    /// Get downloader version information
    async fn get_version_info(&self) -> Result<String>;
}

pub struct DownloaderFactory;

impl DownloaderFactory {
    pub fn create_downloader(config: DownloaderConfig) -> Box<dyn DownloaderTrait> {
        Box::new(YtDlpDownloader::new(config))
    }
}

pub struct YtDlpDownloader {
    config: DownloaderConfig,
}

fn parse_counter(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field.eq_ignore_ascii_case("na") || field.eq_ignore_ascii_case("none") {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64)
}

/// Parse one `gifcut-progress:<downloaded>/<total>/<estimate>` line.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split('/');
    let downloaded_bytes = parse_counter(fields.next()?)?;
    let total_bytes = fields.next().and_then(parse_counter);
    let total_bytes_estimate = fields.next().and_then(parse_counter);
    Some(DownloadProgress {
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
    })
}

impl YtDlpDownloader {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn build_args(&self, url: &str, dir: &Path, task_id: &str) -> Vec<String> {
        let template = dir.join(format!("{}.%(ext)s", task_id));
        let mut args = vec![
            "-f".to_string(),
            self.config.format.clone(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{}%(progress.downloaded_bytes)s/%(progress.total_bytes)s/%(progress.total_bytes_estimate)s",
                PROGRESS_PREFIX
            ),
        ];

        if let Some(format) = &self.config.recode_format {
            args.push("--recode-video".to_string());
            args.push(format.clone());
        }

        for (name, value) in [
            ("User-Agent", &self.config.user_agent),
            ("Accept", &self.config.accept),
            ("Accept-Language", &self.config.accept_language),
        ] {
            if !value.is_empty() {
                args.push("--add-header".to_string());
                args.push(format!("{}:{}", name, value));
            }
        }

        if self.config.geo_bypass {
            args.push("--geo-bypass".to_string());
        }
        if !self.config.check_certificates {
            args.push("--no-check-certificates".to_string());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl DownloaderTrait for YtDlpDownloader {
    async fn download(
        &self,
        url: &str,
        dir: &Path,
        task_id: &str,
        progress: ProgressSink,
    ) -> Result<PathBuf> {
        info!("Downloading video: {}", url);
        let args = self.build_args(url, dir, task_id);
        debug!("Executing downloader: {} {:?}", self.config.binary_path, args);

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GifcutError::Download(format!("Failed to execute downloader: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GifcutError::Download("downloader stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| GifcutError::Download("downloader stderr unavailable".to_string()))?;

        // Drain stderr concurrently so a chatty downloader cannot block on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_progress_line(&line) {
                Some(update) => {
                    // The receiver going away just means nobody is watching.
                    let _ = progress.send(update);
                }
                None => debug!("yt-dlp: {}", line),
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!("Downloader exited with {}", status);
            return Err(GifcutError::Download(format!(
                "could not download video: {}",
                stderr_tail(&stderr)
            )));
        }

        let path = locate_download(dir, task_id)
            .ok_or_else(|| GifcutError::FileNotFound(format!("no downloaded file for task {}", task_id)))?;

        info!("Video downloaded: {}", path.display());
        Ok(path)
    }

    async fn check_availability(&self) -> Result<()> {
        self.get_version_info().await.map(|version| {
            info!("Downloader is available ({})", version);
        })
    }

    async fn get_version_info(&self) -> Result<String> {
        let output = Command::new(&self.config.binary_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| GifcutError::Download(format!("Downloader not found: {}", e)))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(stdout.lines().next().unwrap_or("Unknown version").trim().to_string())
        } else {
            Err(GifcutError::Download("Downloader version check failed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_parse_progress_line() {
        let p = parse_progress_line("gifcut-progress:1024/4096/NA").unwrap();
        assert_eq!(p.downloaded_bytes, 1024);
        assert_eq!(p.total_bytes, Some(4096));
        assert_eq!(p.total_bytes_estimate, None);

        let est = parse_progress_line("  gifcut-progress:10/NA/2048.5 ").unwrap();
        assert_eq!(est.total_bytes, None);
        assert_eq!(est.total_bytes_estimate, Some(2048));
    }

    #[test]
    fn test_parse_progress_line_rejects_other_output() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("gifcut-progress:NA/NA/NA").is_none());
    }

    #[test]
    fn test_build_args_includes_headers_and_ends_with_url() {
        let downloader = YtDlpDownloader::new(Config::default().downloader);
        let args = downloader.build_args("https://example.com/watch?v=1", Path::new("/work"), "task");

        assert_eq!(&args[..4], &["-f", "best[ext=mp4]/best", "-o", "/work/task.%(ext)s"]);
        assert!(args.iter().any(|a| a.starts_with("User-Agent:Mozilla")));
        assert!(args.contains(&"--recode-video".to_string()));
        assert!(args.contains(&"--geo-bypass".to_string()));
        assert!(args.contains(&"--no-check-certificates".to_string()));
        assert_eq!(&args[args.len() - 2..], &["--", "https://example.com/watch?v=1"]);
    }

    #[test]
    fn test_build_args_respects_toggles() {
        let mut config = Config::default().downloader;
        config.recode_format = None;
        config.geo_bypass = false;
        config.check_certificates = true;
        config.accept_language = String::new();
        let args = YtDlpDownloader::new(config).build_args("https://e/x", Path::new("/w"), "t");

        assert!(!args.contains(&"--recode-video".to_string()));
        assert!(!args.contains(&"--geo-bypass".to_string()));
        assert!(!args.contains(&"--no-check-certificates".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("Accept-Language:")));
    }

    #[tokio::test]
    async fn test_missing_binary_is_download_error() {
        let mut config = Config::default().downloader;
        config.binary_path = "/nonexistent/yt-dlp-binary".to_string();
        let downloader = YtDlpDownloader::new(config);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let dir = tempfile::tempdir().unwrap();

        let result = downloader.download("https://e/x", dir.path(), "t", tx).await;
        assert!(matches!(result, Err(GifcutError::Download(_))));
        assert!(downloader.check_availability().await.is_err());
    }
}
