use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::MediaConfig;
use crate::error::{Result, GifcutError};
use crate::request::ClipWindow;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

/// Encoder settings applied when rendering a GIF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifSettings {
    pub fps: u32,
    pub width: u32,
    pub loop_count: i32,
    pub palette: bool,
    pub extra_options: Vec<String>,
}

impl From<&MediaConfig> for GifSettings {
    fn from(config: &MediaConfig) -> Self {
        Self {
            fps: config.fps,
            width: config.width,
            loop_count: config.loop_count,
            palette: config.palette,
            extra_options: config.extra_options.clone(),
        }
    }
}

impl GifSettings {
    fn scale_chain(&self) -> String {
        format!("fps={},scale={}:-1:flags=lanczos", self.fps, self.width)
    }

    /// Plain filter used with -vf
    pub fn simple_filter(&self) -> String {
        self.scale_chain()
    }

    /// Two-pass palette graph used with -filter_complex
    pub fn palette_filter(&self) -> String {
        format!(
            "[0:v]{},split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
            self.scale_chain()
        )
    }
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file or URL
    pub fn input<S: AsRef<str>>(self, source: S) -> Self {
        self.arg("-i").arg(source.as_ref())
    }

    /// Add input file
    pub fn input_path<P: AsRef<Path>>(self, path: P) -> Self {
        self.input(path.as_ref().to_string_lossy())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Seek to a position in seconds
    pub fn seek(self, seconds: u64) -> Self {
        self.arg("-ss").arg(seconds.to_string())
    }

    /// Stop reading at a position in seconds
    pub fn until(self, seconds: u64) -> Self {
        self.arg("-to").arg(seconds.to_string())
    }

    /// Limit the duration in seconds
    pub fn duration(self, seconds: u64) -> Self {
        self.arg("-t").arg(seconds.to_string())
    }

    /// Copy every stream without re-encoding
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add a filter graph
    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Set the GIF loop count
    pub fn loop_count(self, count: i32) -> Self {
        self.arg("-loop").arg(count.to_string())
    }

    /// Execute the command
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GifcutError::Media(format!("Failed to execute media processor: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GifcutError::Media(format!(
                "{} failed: {}",
                self.description,
                stderr_tail(&stderr)
            )));
        }

        Ok(())
    }
}

/// ffmpeg prints its banner first; the useful error is at the end.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

/// Builder for common media processing operations
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Cut the buffered window straight out of a remote media URL
    pub fn trim_remote<P: AsRef<Path>>(&self, url: &str, window: &ClipWindow, output_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Remote trim")
            .overwrite()
            .seek(window.buffer_start)
            .until(window.window_end)
            .input(url)
            .copy_streams()
            .output(output_path)
    }

    /// Cut the buffered window out of a downloaded file
    pub fn trim_local<P: AsRef<Path>>(&self, input_path: P, window: &ClipWindow, output_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Local trim")
            .overwrite()
            .seek(window.buffer_start)
            .until(window.window_end)
            .input_path(input_path)
            .copy_streams()
            .output(output_path)
    }

    /// Build GIF rendering command
    pub fn render_gif<P: AsRef<Path>>(
        &self,
        input_path: P,
        seek: u64,
        duration: u64,
        settings: &GifSettings,
        output_path: P,
    ) -> MediaCommand {
        let cmd = MediaCommand::new(&self.binary_path, "GIF rendering")
            .overwrite()
            .seek(seek)
            .duration(duration)
            .input_path(input_path);

        let cmd = if settings.palette {
            cmd.filter_complex(settings.palette_filter())
        } else {
            cmd.video_filter(settings.simple_filter())
        };

        cmd.loop_count(settings.loop_count)
            .args(settings.extra_options.iter().cloned())
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check")
            .arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn window() -> ClipWindow {
        ClipWindow { buffer_start: 8, window_end: 15, gif_seek: 2, duration: 3 }
    }

    #[test]
    fn test_trim_remote_puts_seek_before_input() {
        let cmd = MediaCommandBuilder::new("ffmpeg").trim_remote("https://cdn/x.mp4", &window(), Path::new("out.mp4"));
        assert_eq!(
            cmd.args,
            vec!["-y", "-ss", "8", "-to", "15", "-i", "https://cdn/x.mp4", "-c", "copy", "out.mp4"]
        );
    }

    #[test]
    fn test_render_gif_default_filter() {
        let settings = GifSettings::from(&Config::default().media);
        let cmd = MediaCommandBuilder::new("ffmpeg").render_gif(Path::new("in.mp4"), 2, 3, &settings, Path::new("out.gif"));
        assert_eq!(
            cmd.args,
            vec![
                "-y", "-ss", "2", "-t", "3", "-i", "in.mp4",
                "-vf", "fps=15,scale=480:-1:flags=lanczos",
                "-loop", "0", "out.gif",
            ]
        );
    }

    #[test]
    fn test_render_gif_palette_and_extra_options() {
        let mut settings = GifSettings::from(&Config::default().media);
        settings.palette = true;
        settings.extra_options = vec!["-threads".into(), "2".into()];
        let cmd = MediaCommandBuilder::new("ffmpeg").render_gif(Path::new("in.mp4"), 0, 5, &settings, Path::new("out.gif"));

        let graph_at = cmd.args.iter().position(|a| a == "-filter_complex").unwrap();
        assert!(cmd.args[graph_at + 1].contains("palettegen"));
        assert!(!cmd.args.contains(&"-vf".to_string()));
        assert_eq!(cmd.args[cmd.args.len() - 3..], ["-threads", "2", "out.gif"]);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = "banner\n\nline1\nline2\nline3\nline4\nline5\nline6\n";
        assert_eq!(stderr_tail(stderr), "line2\nline3\nline4\nline5\nline6");
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let cmd = MediaCommand::new("/nonexistent/ffmpeg-binary", "Probe");
        assert!(matches!(cmd.execute().await, Err(GifcutError::Media(_))));
    }
}
