//! Error types for release index lookups

use thiserror::Error;

/// Release index errors
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Invalid release index URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },
}

/// Result type for release index operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
