use thiserror::Error;

#[derive(Error, Debug)]
pub enum GifcutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Invalid request: {0}")]
    Request(String),

    #[error("Unknown task: {0}")]
    TaskNotFound(String),

    #[error("Task {0} was cancelled")]
    Cancelled(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),
}

pub type Result<T> = std::result::Result<T, GifcutError>;
