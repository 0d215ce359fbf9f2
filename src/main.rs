//! tailhub - Entry Point
//!
//! Starts the API server and the hub sweeper with graceful shutdown support.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tailhub::api::{ApiServer, AppState};
use tailhub::config::LogConfig;
use tailhub::source::DockerClient;
use tailhub::stream::Registry;
use tailhub::Config;

#[tokio::main]
async fn main() -> tailhub::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);
    info!("Starting tailhub");
    info!("Configuration loaded");

    // One Docker client serves both as log source and container catalog
    let docker = Arc::new(DockerClient::new(config.docker.clone())?);
    let registry = Arc::new(Registry::new(docker.clone(), config.stream));

    // Create shutdown channel
    let (shutdown_tx, _) = watch::channel(false);

    // Start hub sweeper
    let sweeper_shutdown = shutdown_tx.subscribe();
    let sweeper_registry = registry.clone();
    let sweeper_task = tokio::spawn(async move {
        sweeper_registry.run_sweeper(sweeper_shutdown).await;
    });

    // Create API server
    let api_server = ApiServer::new(AppState::new(config.clone(), registry.clone(), docker));
    let api_shutdown = shutdown_tx.subscribe();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!("Server started - API: {}", config.api_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(api_task, sweeper_task);

    // Ends every hub; viewer tasks still attached are not awaited, so their
    // close frames are best effort
    registry.shutdown().await;

    info!("tailhub stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tailhub={},tower_http=debug", log.level).into());

    if log.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
