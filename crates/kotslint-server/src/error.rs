//! Error types for the service

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

/// Failure of one request, rendered as `{"error": message}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be understood
    #[error("{0}")]
    BadRequest(String),

    /// The request could not be linted
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Failures while starting the service
#[derive(Debug, Error, Diagnostic)]
pub enum StartupError {
    #[error("failed to create schema directory: {0}")]
    #[diagnostic(code(kots_lint::startup::schema_dir))]
    SchemaDir(#[source] std::io::Error),

    #[error("failed to unpack schemas: {0}")]
    #[diagnostic(code(kots_lint::startup::schemas))]
    Schemas(#[from] kotslint_kube::KubeError),

    #[error("invalid release index: {0}")]
    #[diagnostic(
        code(kots_lint::startup::release_index),
        help("check --release-index-url / KOTS_LINT_RELEASE_INDEX_URL")
    )]
    ReleaseIndex(#[from] kotslint_repo::RepoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
