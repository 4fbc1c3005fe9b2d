//! Shared service state

use std::path::Path;
use std::sync::Arc;

use kotslint_kube::SchemaStore;
use kotslint_lint::{LintError, Linter};
use kotslint_repo::ReleaseIndex;
use tempfile::TempDir;

use crate::config::Config;
use crate::error::{ApiError, StartupError};
use crate::telemetry::Telemetry;

/// State shared by every handler. The schema directory lives as long as
/// the last clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    linter: Linter,
    telemetry: Telemetry,
    debug: bool,
    schemas: TempDir,
}

impl AppState {
    /// Unpack schemas into a fresh temporary directory and build the linter
    pub fn new(config: &Config) -> Result<Self, StartupError> {
        let schemas = tempfile::Builder::new()
            .prefix("kots-lint-schemas-")
            .tempdir()
            .map_err(StartupError::SchemaDir)?;
        let store = SchemaStore::unpack(schemas.path())?;
        let index = ReleaseIndex::new(&config.release_index_url, config.github_token.clone())?;

        Ok(Self {
            inner: Arc::new(Inner {
                linter: Linter::new(store).with_release_index(index),
                telemetry: Telemetry::from_license_key(config.new_relic_license_key.as_deref()),
                debug: config.debug,
                schemas,
            }),
        })
    }

    pub fn linter(&self) -> &Linter {
        &self.inner.linter
    }

    pub fn telemetry(&self) -> Telemetry {
        self.inner.telemetry
    }

    pub fn schema_dir(&self) -> &Path {
        self.inner.schemas.path()
    }

    /// Map a pipeline failure to a response. Outside debug mode internal
    /// failures are reported without detail.
    pub fn api_error(&self, endpoint: &str, err: LintError) -> ApiError {
        if err.is_client_error() {
            return ApiError::BadRequest(err.to_string());
        }

        match &err {
            LintError::Cancelled => tracing::info!(endpoint, "lint request cancelled"),
            _ => tracing::error!(endpoint, error = %err, "lint request failed"),
        }
        if self.inner.debug {
            ApiError::Internal(err.to_string())
        } else {
            ApiError::Internal("internal error".to_string())
        }
    }
}
