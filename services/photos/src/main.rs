use anyhow::{Context, Result};
use shutter_photos::api::{start_api_server, AppState};
use shutter_photos::metadata_store::{MetadataStore, PgMetadataStore};
use shutter_photos::object_store::{ObjectStore, S3ObjectStore};
use shutter_photos::service::{PhotoService, ServiceSettings};
use shutter_photos::Config;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Shutter photos service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Storage clients are the only fatal startup dependency
    let pg_store = PgMetadataStore::new(&config.database)
        .await
        .context("Failed to initialize metadata store")?;

    if config.database.run_migrations {
        pg_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let metadata: Arc<dyn MetadataStore> = Arc::new(pg_store);
    let objects: Arc<dyn ObjectStore> = Arc::new(
        S3ObjectStore::new(&config.s3)
            .await
            .context("Failed to initialize object store")?,
    );

    let settings = ServiceSettings::from_config(&config);
    tokio::fs::create_dir_all(&settings.staging_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                settings.staging_dir.display()
            )
        })?;

    let photos = Arc::new(PhotoService::new(metadata, objects, settings));

    // Spawn reconciliation task
    let reconcile_handle = if config.reconcile.enabled {
        let reconciler = photos.reconciler();
        let interval = config.reconcile_interval();
        info!(interval_secs = interval.as_secs(), "Starting reconciliation sweep");
        Some(tokio::spawn(reconciler.run(interval)))
    } else {
        None
    };

    // Spawn API server task
    let api_state = AppState {
        photos: photos.clone(),
    };
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Photos service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down photos service");

    if let Some(handle) = reconcile_handle {
        handle.abort();
    }
    api_handle.abort();

    info!("Photos service stopped");

    Ok(())
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
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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
