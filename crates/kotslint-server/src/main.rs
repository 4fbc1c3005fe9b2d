//! kots-lint - HTTP lint service for kots application releases

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kotslint_server::{AppState, Config, router};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    let state = AppState::new(&config)?;
    tracing::info!(schemas = %state.schema_dir().display(), "unpacked schemas");

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .into_diagnostic()?;
    tracing::info!(
        bind = %config.bind,
        debug = config.debug,
        telemetry = state.telemetry().is_enabled(),
        "kots-lint listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("kots-lint stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}
