//! gifcut - Video URL to animated GIF
//!
//! Fetches a short window of a video with yt-dlp or ffmpeg, encodes it into a
//! GIF with ffmpeg, and reports progress to polling clients over HTTP.

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod janitor;
pub mod media;
pub mod progress;
pub mod request;
pub mod server;
pub mod source;
pub mod workflow;
