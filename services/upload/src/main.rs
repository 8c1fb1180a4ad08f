use anyhow::{Context, Result};
use cheapfood_upload::api::{start_api_server, AppState};
use cheapfood_upload::config::{Config, ObjectStoreBackend};
use cheapfood_upload::{
    HttpInferenceGateway, IdentityProvider, InferenceGateway, MemoryMetadataStore,
    MemoryObjectStore, MetadataStore, ObjectStore, PgMetadataStore, S3ObjectStore,
    SupabaseIdentity, UploadOrchestrator,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Cheap Food upload service"
    );

    init_metrics(config.service.metrics_port)?;

    let metadata_store = init_metadata_store(&config).await?;
    let object_store = init_object_store(&config).await?;

    if config.inference.timeout().is_none() {
        warn!("No inference timeout configured; parser calls wait indefinitely");
    }
    let gateway: Arc<dyn InferenceGateway> =
        Arc::new(HttpInferenceGateway::new(&config.inference));
    let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseIdentity::new(&config.identity));

    let orchestrator = Arc::new(UploadOrchestrator::new(
        object_store,
        metadata_store.clone(),
        gateway,
    ));

    let api_state = AppState {
        orchestrator,
        metadata_store,
        identity,
    };

    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Upload service started successfully");

    shutdown_signal().await;

    info!("Shutting down upload service");
    api_handle.abort();
    info!("Upload service stopped");

    Ok(())
}

async fn init_metadata_store(config: &Config) -> Result<Arc<dyn MetadataStore>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("No database URL configured; rows are kept in memory");
        return Ok(Arc::new(MemoryMetadataStore::new()));
    };

    let store = PgMetadataStore::new(url, &config.database)
        .await
        .context("Failed to initialize metadata store")?;

    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    Ok(Arc::new(store))
}

async fn init_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.object_store.backend {
        ObjectStoreBackend::S3 => {
            let store = S3ObjectStore::new(&config.object_store)
                .await
                .context("Failed to initialize object store")?;
            Ok(Arc::new(store))
        }
        ObjectStoreBackend::Memory => {
            warn!("Using in-memory object store; uploads are lost on restart");
            let base_url = config
                .object_store
                .public_base_url
                .clone()
                .unwrap_or_else(|| "memory://uploads".to_string());
            Ok(Arc::new(MemoryObjectStore::new(base_url)))
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
