//! Error types for kotslint-kube

use std::path::PathBuf;

use thiserror::Error;

/// Result type for kotslint-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Infrastructure failures of the Kubernetes-facing stages
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// The schema store could not be written or read
    #[error("schema store error at {path}: {source}")]
    SchemaStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}
