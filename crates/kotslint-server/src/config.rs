//! Service configuration

use std::net::SocketAddr;

use clap::Parser;
use clap::builder::BoolishValueParser;
use kotslint_repo::DEFAULT_BASE_URL;

/// kots-lint configuration. Every flag falls back to an environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "kots-lint")]
#[command(version)]
#[command(about = "Lint service for kots application releases", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "KOTS_LINT_BIND", default_value = "0.0.0.0:8082")]
    pub bind: SocketAddr,

    /// Leave release mode: debug logs and verbose errors (DEBUG_MODE=on)
    #[arg(long, env = "DEBUG_MODE", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Bearer token for release version lookups
    #[arg(long, env = "GITHUB_API_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Enables telemetry when set
    #[arg(long, env = "NEW_RELIC_LICENSE_KEY", hide_env_values = true)]
    pub new_relic_license_key: Option<String>,

    /// Base URL of the release index
    #[arg(long, env = "KOTS_LINT_RELEASE_INDEX_URL", default_value = DEFAULT_BASE_URL)]
    pub release_index_url: String,

    /// Write log lines as JSON
    #[arg(long, env = "KOTS_LINT_LOG_JSON", value_parser = BoolishValueParser::new())]
    pub log_json: bool,
}
