//! Error types for the lint pipeline

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, LintError>;

/// Failures that abort a lint request.
///
/// Problems with the linted release are never reported here; they are lint
/// expressions in the result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LintError {
    /// The request was cancelled
    #[error("lint cancelled")]
    Cancelled,

    /// Request payload could not be understood
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A caller-supplied policy could not be compiled
    #[error("invalid policy '{name}': {message}")]
    InvalidPolicy { name: String, message: String },

    /// Policy evaluation failed
    #[error("policy '{name}' failed: {message}")]
    Policy { name: String, message: String },

    /// Template engine failure other than a render error
    #[error("template engine error: {0}")]
    Engine(#[from] kotslint_engine::EngineError),

    /// Kubernetes stage failure
    #[error(transparent)]
    Kube(#[from] kotslint_kube::KubeError),

    /// Release index failure
    #[error(transparent)]
    Repo(#[from] kotslint_repo::RepoError),

    /// Core failure
    #[error(transparent)]
    Core(#[from] kotslint_core::CoreError),
}

impl LintError {
    /// Whether the error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LintError::InvalidInput { .. } | LintError::InvalidPolicy { .. }
        )
    }
}
