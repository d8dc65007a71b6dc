use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::config::{load_config, mask_secret};
use crate::logs::LogService;

/// Shutdown signal types
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    /// Graceful shutdown (stop accepting, finish in-flight requests)
    Graceful,
}

/// Setup signal handlers for the server
///
/// Returns a broadcast sender for shutdown signals and a join handle for the signal task
///
/// Handles:
/// - SIGTERM/SIGINT: Graceful shutdown
/// - SIGHUP: Re-read the config file and swap in the ingest key
#[cfg(unix)]
pub fn setup_signal_handlers(
    config_path: PathBuf,
    service: Arc<LogService>,
) -> Result<(broadcast::Sender<ShutdownSignal>, tokio::task::JoinHandle<()>)> {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reloading configuration");
                    match reload_config(&config_path, &service) {
                        Ok(()) => info!("Configuration reloaded successfully"),
                        Err(e) => error!("Failed to reload configuration: {}", e),
                    }
                }
            }
        }
    });

    Ok((shutdown_tx, handle))
}

/// Non-unix platforms: only Ctrl+C, no reload
#[cfg(not(unix))]
pub fn setup_signal_handlers(
    _config_path: PathBuf,
    _service: Arc<LogService>,
) -> Result<(broadcast::Sender<ShutdownSignal>, tokio::task::JoinHandle<()>)> {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = tx_clone.send(ShutdownSignal::Graceful);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });

    Ok((shutdown_tx, handle))
}

/// Load and validate the config file again, then apply the settings that can
/// change at runtime. On any error the running settings stay in place.
///
/// Only the ingest key is hot-reloadable; buffer and queue sizes need a restart.
pub fn reload_config(config_path: &std::path::Path, service: &LogService) -> Result<()> {
    let new_config = load_config(config_path)?;

    let key = new_config.ingest.key().map(str::to_string);
    info!(
        ingest_key = %key.as_deref().map(mask_secret).unwrap_or_else(|| "(open)".to_string()),
        "Applying reloaded ingest settings"
    );
    service.set_ingest_key(key);

    Ok(())
}
