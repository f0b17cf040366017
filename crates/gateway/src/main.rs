use gateway::{
    AppState, ErrorPolicy, ScratchDir, config::get_configuration, logging::setup_logging, router,
};
use inference::{DetectionModel, Detector, InferenceConfig, backend::ort::OrtBackend};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;
    let _telemetry = setup_logging(&config)?;

    tracing::info!(
        environment = config.environment.as_str(),
        format = config.response_format.as_str(),
        "Gateway starting"
    );

    let inference_config = InferenceConfig::from_env()?;
    let detector = Detector::<OrtBackend>::from_config(&inference_config)?;
    tracing::info!(
        model = %detector.describe(),
        classes = detector.names().len(),
        "Detector ready"
    );

    let scratch = ScratchDir::new(&config.upload_dir);
    scratch.ensure()?;

    let state = AppState::new(
        Arc::new(detector),
        scratch,
        config.response_format,
        ErrorPolicy::new(config.expose_errors()),
    );
    let app = router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Detection server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
