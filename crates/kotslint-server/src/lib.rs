//! kots-lint Server - HTTP transport for the lint pipeline
//!
//! - `config`: command line and environment configuration
//! - `state`: the shared linter and its unpacked schema directory
//! - `handlers`: one handler per lint endpoint
//! - `telemetry`: per-request telemetry events

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;
pub mod telemetry;

use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::http::Method;
use axum::http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{ApiError, StartupError};
pub use state::AppState;
pub use telemetry::Telemetry;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the service router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ORIGIN, ACCEPT, CONTENT_TYPE]);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map_or(request.uri().path(), MatchedPath::as_str);
        tracing::info_span!("http.request", method = %request.method(), route = %route)
    });

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/v1/lint", post(handlers::lint))
        .route("/v1/troubleshoot-lint", post(handlers::troubleshoot_lint))
        .route("/v1/enterprise-lint", post(handlers::enterprise_lint))
        .route("/v1/builders-lint", post(handlers::builders_lint))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(trace)
        .layer(cors)
        .with_state(state)
}
