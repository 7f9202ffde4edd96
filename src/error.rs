use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildTrendsError {
    /// The builds endpoint answered with a non-success status.
    #[error("Failed to fetch builds: {status} - {body}")]
    ApiError { status: StatusCode, body: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// `merge` never replaces an existing file.
    #[error("Refusing to overwrite output file: {}", .0.display())]
    OutputExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, BuildTrendsError>;
