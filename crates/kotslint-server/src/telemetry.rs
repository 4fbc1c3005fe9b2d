//! Request telemetry
//!
//! With a license key configured, every lint request emits one event on the
//! `telemetry` target. The shipping of events is left to the log pipeline.

use std::time::Instant;

use kotslint_lint::LintResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct Telemetry {
    enabled: bool,
}

impl Telemetry {
    pub fn from_license_key(key: Option<&str>) -> Self {
        Self {
            enabled: key.is_some_and(|k| !k.trim().is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one finished lint request
    pub fn record(&self, endpoint: &str, started: Instant, result: &LintResult) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            target: "telemetry",
            endpoint,
            duration_ms = started.elapsed().as_millis() as u64,
            diagnostics = result.lint_expressions.len(),
            complete = result.is_linting_complete,
            "lint request"
        );
    }
}
