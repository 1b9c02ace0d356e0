//! Background removal HTTP server binary.

use anyhow::Context;
use clap::Parser;
use imgly_bgremove_server::{
    config::{ServerArgs, ServerConfig},
    server::{create_router, AppState},
    tracing_config::{spans, TracingConfig},
    BackgroundRemovalProcessor, ProcessorConfig,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    TracingConfig::new()
        .with_verbosity(args.verbose)
        .with_format(args.log_format)
        .with_rust_log()
        .init()
        .context("Failed to initialize tracing")?;

    let config = ServerConfig::from_args(&args).context("Invalid server configuration")?;
    let addr = config.socket_addr().context("Invalid bind address")?;

    let processor_config = ProcessorConfig::from_removal_config(&config.removal, config.backend);
    let model_name = processor_config.model_spec.display_name();
    let provider = processor_config.execution_provider.to_string();

    let processor = spans::model_loading(&model_name, &provider).in_scope(|| {
        BackgroundRemovalProcessor::new(processor_config)
            .with_context(|| format!("Failed to load model from {model_name}"))
    })?;
    info!(
        backend = %config.backend,
        model_load_ms = processor.model_load_ms(),
        "Model ready"
    );

    let app = create_router(AppState::new(processor), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
