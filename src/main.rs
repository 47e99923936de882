//! Embedding Server Main
//!
//! Entry point for the OpenAI-compatible embedding server

use std::sync::Arc;
use kanana_embedding_server::{start_hyper_http_server, ModelLifecycle, OnnxModelLoader, ServerConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Initialize tracing
    let log_level = match config.monitoring.log_level.to_lowercase().as_str() {
        "trace" => "kanana_embedding_server=trace,info",
        "debug" => "kanana_embedding_server=debug,info",
        "warn" => "kanana_embedding_server=warn,warn",
        "error" => "kanana_embedding_server=error,error",
        _ => "kanana_embedding_server=info,info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into())
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .init();

    info!("Kanana Embedding Server v{}", env!("CARGO_PKG_VERSION"));

    // The server must never come up without a model
    let lifecycle = Arc::new(ModelLifecycle::new());
    let loader = OnnxModelLoader::new(config.model.clone()).map_err(|e| {
        error!("Failed to prepare model loader: {}", e);
        e
    })?;
    lifecycle.initialize(&loader).await?;

    start_hyper_http_server(Arc::new(config), Arc::clone(&lifecycle), shutdown_signal()).await?;

    lifecycle.shutdown().await;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received");
}
