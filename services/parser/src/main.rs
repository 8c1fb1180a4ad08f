use anyhow::{Context, Result};
use cheapfood_parser::api::{start_api_server, AppState};
use cheapfood_parser::config::{BackendKind, Config};
use cheapfood_parser::{GeminiParser, RecipeParser, StubParser};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Cheap Food parser service"
    );

    init_metrics(config.service.metrics_port)?;

    let parser = init_parser(&config)?;
    info!(backend = parser.name(), "Recipe parser ready");

    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(AppState { parser }, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    shutdown_signal().await;

    info!("Shutting down parser service");
    api_handle.abort();

    Ok(())
}

fn init_parser(config: &Config) -> Result<Arc<dyn RecipeParser>> {
    match config.backend.kind {
        BackendKind::Stub => Ok(Arc::new(StubParser)),
        BackendKind::Gemini => {
            let gemini = config
                .gemini
                .clone()
                .context("backend.kind is gemini but no [gemini] section is configured")?;
            Ok(Arc::new(GeminiParser::new(gemini)))
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
