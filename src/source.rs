use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{GifcutError, Result};

/// Markers that identify a link straight to a media file or stream manifest.
const DIRECT_MARKERS: &[&str] = &[".mp4", ".webm", ".mkv", ".avi", ".mov", ".flv", ".m3u8"];

/// Extensions a finished download can carry.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "avi", "mov", "flv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// ffmpeg can read the URL itself and trim it remotely
    Direct,
    /// A page that needs the downloader to resolve the media
    Page,
}

impl SourceKind {
    pub fn classify(url: &str) -> Self {
        let lower = url.to_lowercase();
        if DIRECT_MARKERS.iter().any(|ext| lower.ends_with(ext) || lower.contains(ext)) {
            SourceKind::Direct
        } else {
            SourceKind::Page
        }
    }
}

/// Only plain web URLs are passed on to the external tools.
pub fn validate_url(url: &str) -> Result<()> {
    let lower = url.to_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        warn!("Rejected URL with unsupported scheme: {}", url);
        return Err(GifcutError::UnsupportedSource(format!(
            "only http and https URLs are supported: {}",
            url
        )));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(GifcutError::UnsupportedSource(format!("URL contains whitespace: {}", url)));
    }
    Ok(())
}

/// Find the media file the downloader produced for `task_id`, skipping
/// partial downloads and sidecar files.
pub fn locate_download(dir: &Path, task_id: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let stem_matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s == task_id)
                .unwrap_or(false);
            let ext_matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            stem_matches && ext_matches
        })
        .collect();

    candidates.sort();
    debug!("Download candidates for {}: {:?}", task_id, candidates);
    candidates.into_iter().next()
}
