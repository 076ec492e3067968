use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for intermediate videos and finished GIFs
        #[arg(short, long)]
        work_dir: Option<PathBuf>,
    },

    /// Convert a single clip without starting the server
    Convert {
        /// Video page or direct media URL
        #[arg(short, long)]
        url: String,

        /// Start offset in seconds
        #[arg(short, long)]
        start: Option<i64>,

        /// Clip length in seconds
        #[arg(short, long)]
        duration: Option<i64>,

        /// Where to write the GIF
        #[arg(short, long)]
        output: PathBuf,

        /// Directory for intermediate files
        #[arg(short, long)]
        work_dir: Option<PathBuf>,
    },

    /// Check that ffmpeg and yt-dlp are installed
    Check,

    /// Delete stale working files
    Clean {
        /// Age in minutes (defaults to the configured retention)
        #[arg(short, long)]
        older_than_minutes: Option<u64>,

        /// Directory to clean
        #[arg(short, long)]
        work_dir: Option<PathBuf>,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "gifcut.toml")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let args = Args::parse_from([
            "gifcut", "-v", "convert", "--url", "https://e/x.mp4", "--start", "4", "-o", "out.gif",
        ]);
        assert!(args.verbose);
        match args.command {
            Commands::Convert { url, start, duration, output, .. } => {
                assert_eq!(url, "https://e/x.mp4");
                assert_eq!(start, Some(4));
                assert_eq!(duration, None);
                assert_eq!(output, PathBuf::from("out.gif"));
            }
            _ => panic!("expected convert"),
        }
    }
}
