//! Endpoint handlers
//!
//! Each handler decodes its payload, runs one pipeline entry point and
//! answers with a [`LintResult`]. The request's cancellation token fires
//! when the handler is dropped, which happens when the client goes away.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use kotslint_core::File;
use kotslint_core::archive::{chart_files, chart_files_from_tar};
use kotslint_lint::{CancellationToken, LintResult, Linter, PolicyModule};

use crate::error::ApiError;
use crate::state::AppState;

/// Path given to a chart archive uploaded as `application/gzip`
pub const UPLOADED_ARCHIVE: &str = "chart.tgz";

#[derive(Debug, Deserialize)]
pub struct LintRequest {
    /// JSON array of release files, as a string
    pub spec: String,
}

#[derive(Debug, Deserialize)]
pub struct TroubleshootLintRequest {
    /// Raw YAML
    pub spec: String,
}

#[derive(Debug, Deserialize)]
pub struct EnterpriseLintRequest {
    /// JSON array of release files, as a string
    pub spec: String,
    /// JSON array of `{name, policy}`, as a string
    pub policies: String,
}

pub async fn livez() -> StatusCode {
    StatusCode::OK
}

pub async fn lint(
    State(state): State<AppState>,
    payload: Result<Json<LintRequest>, JsonRejection>,
) -> Result<Json<LintResult>, ApiError> {
    let Json(request) = payload?;
    let files = parse_files(&request.spec)?;

    // Version lookups stay on the runtime while the CPU stages hold a
    // blocking thread
    let runtime = tokio::runtime::Handle::current();
    run_blocking(&state, "lint", move |linter, cancel| {
        runtime.block_on(linter.lint_release(&files, cancel))
    })
    .await
    .map(Json)
}

pub async fn troubleshoot_lint(
    State(state): State<AppState>,
    payload: Result<Json<TroubleshootLintRequest>, JsonRejection>,
) -> Result<Json<LintResult>, ApiError> {
    let Json(request) = payload?;
    run_blocking(&state, "troubleshoot-lint", move |linter, cancel| {
        linter.lint_troubleshoot(&request.spec, cancel)
    })
    .await
    .map(Json)
}

pub async fn enterprise_lint(
    State(state): State<AppState>,
    payload: Result<Json<EnterpriseLintRequest>, JsonRejection>,
) -> Result<Json<LintResult>, ApiError> {
    let Json(request) = payload?;
    let files = parse_files(&request.spec)?;
    let policies: Vec<PolicyModule> = serde_json::from_str(&request.policies)
        .map_err(|e| ApiError::BadRequest(format!("invalid policies: {e}")))?;

    run_blocking(&state, "enterprise-lint", move |linter, cancel| {
        linter.lint_enterprise(&files, &policies, cancel)
    })
    .await
    .map(Json)
}

/// Lint chart archives uploaded as a tar of archives or a single archive
pub async fn builders_lint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LintResult>, ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let files = match content_type.as_str() {
        "application/tar" => chart_files_from_tar(&body),
        "application/gzip" => chart_files(UPLOADED_ARCHIVE, &body),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unsupported content type \"{other}\", expected application/tar or application/gzip"
            )));
        }
    }
    .map_err(|e| ApiError::BadRequest(format!("invalid archive: {e}")))?;
    tracing::debug!(files = files.len(), "extracted chart files");

    run_blocking(&state, "builders-lint", move |linter, cancel| {
        linter.lint_builders(&files, cancel)
    })
    .await
    .map(Json)
}

fn parse_files(spec: &str) -> Result<Vec<File>, ApiError> {
    serde_json::from_str(spec).map_err(|e| ApiError::BadRequest(format!("invalid spec: {e}")))
}

/// Run a synchronous entry point on the blocking pool
async fn run_blocking<F>(
    state: &AppState,
    endpoint: &'static str,
    lint: F,
) -> Result<LintResult, ApiError>
where
    F: FnOnce(&Linter, &CancellationToken) -> kotslint_lint::Result<LintResult> + Send + 'static,
{
    let started = Instant::now();
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let worker = state.clone();
    let token = cancel.clone();
    let result = tokio::task::spawn_blocking(move || lint(worker.linter(), &token))
        .await
        .map_err(|e| ApiError::Internal(format!("lint task failed: {e}")))?
        .map_err(|e| state.api_error(endpoint, e))?;

    state.telemetry().record(endpoint, started, &result);
    Ok(result)
}
