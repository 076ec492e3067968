//! Incoming clip requests and the time window derived from them.

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ClipConfig;
use crate::error::{GifcutError, Result};
use crate::source::validate_url;

/// Body of a `POST /convert` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipRequest {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub start_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub duration: Option<i64>,
    /// Block until the GIF is ready instead of returning a task id right away
    #[serde(default)]
    pub wait: bool,
}

/// A validated request with every field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSpec {
    pub url: String,
    pub start_secs: u64,
    pub duration_secs: u64,
}

/// Seconds of source video to fetch and where the GIF sits inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    /// Offset in the source where the trimmed file begins
    pub buffer_start: u64,
    /// Offset in the source where the trimmed file ends
    pub window_end: u64,
    /// Offset of the clip inside the trimmed file
    pub gif_seek: u64,
    pub duration: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<IntOrString> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(IntOrString::Int(n)) => Ok(Some(n)),
        Some(IntOrString::Float(f)) => Ok(Some(f.trunc() as i64)),
        Some(IntOrString::Str(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<i64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{}'", s)))
        }
    }
}

impl ClipRequest {
    pub fn new<S: Into<String>>(url: S, start_time: i64, duration: i64) -> Self {
        Self {
            video_url: Some(url.into()),
            start_time: Some(start_time),
            duration: Some(duration),
            wait: false,
        }
    }

    /// Apply defaults and bounds from the clip configuration.
    pub fn normalize(&self, clip: &ClipConfig) -> Result<ClipSpec> {
        let url = self
            .video_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GifcutError::Request("video URL is missing".to_string()))?;

        validate_url(url)?;

        let start_secs = match self.start_time {
            Some(start) if start < 0 => {
                return Err(GifcutError::Request(format!("start time must not be negative, got {}", start)));
            }
            Some(start) => start as u64,
            None => clip.default_start_secs,
        };

        // Zero and negative durations fall to the configured minimum
        let duration_secs = self
            .duration
            .map(|d| d.max(0) as u64)
            .unwrap_or(clip.default_duration_secs)
            .max(clip.min_duration_secs)
            .min(clip.max_duration_secs);

        Ok(ClipSpec {
            url: url.to_string(),
            start_secs,
            duration_secs,
        })
    }
}

impl ClipSpec {
    pub fn window(&self, clip: &ClipConfig) -> ClipWindow {
        let buffer_start = self.start_secs.saturating_sub(clip.buffer_before_secs);
        let window_len = self.duration_secs + clip.buffer_before_secs + clip.buffer_after_secs;
        ClipWindow {
            buffer_start,
            window_end: buffer_start + window_len,
            gif_seek: self.start_secs - buffer_start,
            duration: self.duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn clip() -> ClipConfig {
        Config::default().clip
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let req = ClipRequest {
            video_url: Some("https://example.com/watch?v=1".to_string()),
            ..Default::default()
        };
        let spec = req.normalize(&clip()).unwrap();
        assert_eq!(spec.start_secs, 10);
        assert_eq!(spec.duration_secs, 3);
    }

    #[test]
    fn test_duration_is_clamped() {
        let long = ClipRequest::new("https://a/b.mp4", 0, 60).normalize(&clip()).unwrap();
        assert_eq!(long.duration_secs, 10);

        let short = ClipRequest::new("https://a/b.mp4", 0, 0).normalize(&clip()).unwrap();
        assert_eq!(short.duration_secs, 1);
    }

    #[test]
    fn test_missing_or_blank_url_is_rejected() {
        let blank = ClipRequest::new("   ", 5, 3);
        assert!(matches!(blank.normalize(&clip()), Err(GifcutError::Request(_))));
        assert!(matches!(ClipRequest::default().normalize(&clip()), Err(GifcutError::Request(_))));
    }

    #[test]
    fn test_unsupported_scheme_is_rejected() {
        let req = ClipRequest::new("ftp://example.com/a.mp4", 5, 3);
        assert!(matches!(req.normalize(&clip()), Err(GifcutError::UnsupportedSource(_))));
    }

    #[test]
    fn test_huge_duration_bounds_do_not_overflow() {
        let mut clip = clip();
        clip.max_duration_secs = u64::MAX;
        let spec = ClipRequest::new("https://a/b.mp4", 0, 60).normalize(&clip).unwrap();
        assert_eq!(spec.duration_secs, 60);

        let negative = ClipRequest::new("https://a/b.mp4", 0, -5).normalize(&clip).unwrap();
        assert_eq!(negative.duration_secs, clip.min_duration_secs);
    }

    #[test]
    fn test_negative_start_is_rejected() {
        let req = ClipRequest::new("https://a/b.mp4", -1, 3);
        assert!(req.normalize(&clip()).is_err());
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let req: ClipRequest = serde_json::from_str(
            r#"{"video_url": "https://a/b.mp4", "start_time": "15", "duration": 4.0}"#,
        )
        .unwrap();
        assert_eq!(req.start_time, Some(15));
        assert_eq!(req.duration, Some(4));
        assert!(!req.wait);

        let bad = serde_json::from_str::<ClipRequest>(r#"{"start_time": "soon"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_window_keeps_buffer_around_clip() {
        let spec = ClipSpec { url: "u".into(), start_secs: 10, duration_secs: 3 };
        let w = spec.window(&clip());
        assert_eq!(w, ClipWindow { buffer_start: 8, window_end: 15, gif_seek: 2, duration: 3 });
    }

    #[test]
    fn test_window_near_start_of_video() {
        let spec = ClipSpec { url: "u".into(), start_secs: 1, duration_secs: 5 };
        let w = spec.window(&clip());
        assert_eq!(w.buffer_start, 0);
        assert_eq!(w.gif_seek, 1);
        assert!(w.window_end >= w.gif_seek + w.duration);
    }
}
