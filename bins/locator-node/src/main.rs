//! Locator node daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use locator_node::{LocatorService, NodeConfig};
use tracing::{error, info};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LOCATOR_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".locator").join("config.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "locator_node=debug,info".to_string()),
        )
        .init();

    info!("Starting locator node...");

    let config_path = config_path()?;
    let config = match NodeConfig::load_or_create(&config_path) {
        Ok(cfg) => {
            info!("Loaded config from: {}", config_path.display());
            cfg
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    let service = match LocatorService::new(config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create locator service: {:#}", e);
            return Err(e);
        }
    };

    let shutdown_trigger = service.shutdown_trigger();
    let mut run_handle = tokio::spawn(async move { service.run().await });

    tokio::select! {
        result = &mut run_handle => {
            match result {
                Ok(Ok(())) => {
                    info!("Node stopped");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Service error: {}", e);
                    Err(e)
                }
                Err(e) => {
                    error!("Service task panicked: {}", e);
                    Err(e.into())
                }
            }
        }
        _ = shutdown_signal() => {
            info!("Initiating graceful shutdown...");
            let _ = shutdown_trigger.send(true);

            match tokio::time::timeout(std::time::Duration::from_secs(5), run_handle).await {
                Ok(Ok(Ok(()))) => {
                    info!("Node stopped gracefully");
                    Ok(())
                }
                Ok(Ok(Err(e))) => {
                    error!("Service error during shutdown: {}", e);
                    Err(e)
                }
                Ok(Err(e)) => {
                    error!("Service task panicked: {}", e);
                    Err(e.into())
                }
                Err(_) => {
                    error!("Shutdown timeout, forcing exit");
                    Err(anyhow::anyhow!("Shutdown timeout"))
                }
            }
        }
    }
}
