//! gifcut - Video URL to animated GIF
//!
//! Entry point for the HTTP service and the one-shot command line tools.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gifcut::cli::{Args, Commands};
use gifcut::config::Config;
use gifcut::janitor;
use gifcut::progress::TaskState;
use gifcut::request::ClipRequest;
use gifcut::server;
use gifcut::workflow::Workflow;

const DEFAULT_CONFIG_FILE: &str = "gifcut.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    apply_overrides(&mut config, &args.command);

    // Keep the guard alive so buffered log lines are flushed on exit
    let _guard = setup_logging(&config.server.work_dir, args.verbose)?;

    match args.command {
        Commands::Serve { .. } => {
            let workflow = Workflow::new(config)?;
            if let Err(e) = workflow.check_dependencies().await {
                tracing::warn!("Dependency check failed, conversions may not work: {}", e);
            }
            server::start_server(workflow).await?;
        }
        Commands::Convert { url, start, duration, output, .. } => {
            let request = ClipRequest {
                video_url: Some(url),
                start_time: start,
                duration,
                wait: false,
            };
            let spec = request.normalize(&config.clip)?;
            let workflow = Arc::new(Workflow::new(config)?);
            convert_with_progress_bar(&workflow, spec, &output).await?;
        }
        Commands::Check => {
            let workflow = Workflow::new(config)?;
            let (media_version, downloader_version) = workflow.check_dependencies().await?;
            println!("ffmpeg: {}", media_version);
            println!("yt-dlp: {}", downloader_version);
        }
        Commands::Clean { older_than_minutes, .. } => {
            let minutes = older_than_minutes.unwrap_or(config.server.retention_minutes);
            let removed = janitor::sweep(&config.server.work_dir, Duration::from_secs(minutes * 60))?;
            println!("Removed {} working files older than {} minutes", removed, minutes);
        }
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            println!("Wrote configuration to {}", output.display());
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, command: &Commands) {
    match command {
        Commands::Serve { host, port, work_dir } => {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(dir) = work_dir {
                config.server.work_dir = dir.clone();
            }
        }
        Commands::Convert { work_dir: Some(dir), .. } | Commands::Clean { work_dir: Some(dir), .. } => {
            config.server.work_dir = dir.clone();
        }
        _ => {}
    }
}

/// Run one conversion in-process and mirror its progress on the terminal
async fn convert_with_progress_bar(
    workflow: &Arc<Workflow>,
    spec: gifcut::request::ClipSpec,
    output: &Path,
) -> Result<()> {
    info!("Converting {} ({}s from {}s)", spec.url, spec.duration_secs, spec.start_secs);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );

    let task_id = workflow.submit(spec).await;
    let entry = loop {
        let entry = workflow.progress().snapshot(&task_id).await;
        bar.set_position(entry.progress as u64);
        bar.set_message(entry.status.clone());
        if entry.state != TaskState::Running {
            break entry;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    if entry.state != TaskState::Completed {
        bar.abandon_with_message("Conversion failed");
        workflow.cleanup(&task_id).await?;
        let message = entry.error.unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("Conversion failed: {}", message);
    }

    let gif_path = workflow.gif_path(&task_id)?;
    tokio::fs::copy(&gif_path, output).await?;
    workflow.cleanup(&task_id).await?;
    bar.finish_with_message(format!("Saved {}", output.display()));

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(work_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    let log_dir = work_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "gifcut.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("gifcut.log").display());

    Ok(guard)
}
