//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid archive {path}: {message}")]
    InvalidArchive { path: String, message: String },

    #[error("Chart.yaml not found in archive {path}")]
    ChartYamlNotFound { path: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
