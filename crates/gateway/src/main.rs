use anyhow::Context;
use common::{TelemetryGuard, setup_logging};
use gateway::{
    AppState, ArtifactStore, PredictionPipeline, RetentionPolicy, RetentionSweeper,
    RouterSettings, create_router, get_configuration,
};
use inference::{Detector, ModelDetector, OrtBackend};
use std::sync::Arc;
use std::time::Duration;

const SERVICE_NAME: &str = "gateway";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration().context("Failed to load configuration")?;

    let telemetry = config
        .otel_endpoint
        .as_deref()
        .map(|endpoint| TelemetryGuard::init(SERVICE_NAME, endpoint))
        .transpose()
        .context("Failed to initialize telemetry")?;
    setup_logging(
        config.log_level,
        config.environment,
        telemetry.as_ref().map(TelemetryGuard::tracer),
    );

    tracing::info!(
        environment = config.environment.as_str(),
        version = env!("CARGO_PKG_VERSION"),
        "Gateway starting"
    );

    let store = ArtifactStore::open(&config.storage.upload_dir, &config.storage.prediction_dir)
        .inspect_err(|e| tracing::error!(error = %e, "Failed to bootstrap artifact store"))?;

    let detector: Arc<dyn Detector> = Arc::new(
        ModelDetector::<OrtBackend>::load(&config.detector)
            .inspect_err(|e| tracing::error!(error = %e, "Failed to load detection model"))?,
    );
    tracing::info!(
        model_path = %config.detector.model_path.display(),
        provider = ?config.detector.execution_provider,
        "Detection model loaded"
    );

    let sweeper = RetentionSweeper::new(
        store.clone(),
        RetentionPolicy::from(&config.retention),
        Duration::from_secs(config.retention.sweep_interval_secs.max(1)),
    );
    tokio::spawn(sweeper.run());

    let pipeline = PredictionPipeline::new(store, detector, config.inference_timeout());
    let app = create_router(
        AppState::new(pipeline),
        RouterSettings {
            body_limit_bytes: config.server.body_limit_bytes,
            frontend_dir: config.storage.frontend_dir.as_deref(),
        },
    );

    let addr = config
        .server
        .address()
        .context("Invalid server host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
