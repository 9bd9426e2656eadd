//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::resolve_taps;
use kegbot_core::backend::Backend;
use kegbot_core::config::TapStore;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Spawns a task that listens for SIGHUP and reloads the tap configuration.
///
/// Only the tap list is applied live; the core service reconciles registered
/// taps against it. Changes to other sections take effect on restart.
pub fn spawn_config_reload_handler(
    config_loader: Arc<ConfigLoader>,
    backend: Arc<dyn Backend>,
    tap_store: TapStore,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<JoinHandle<()>> {
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("Config reload handler shutting down");
                        break;
                    }
                }

                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded) => {
                            let taps = resolve_taps(
                                backend.as_ref(),
                                loaded.taps,
                                loaded.load_backend_taps,
                            )
                            .await;
                            let count = taps.len();
                            let version = tap_store.update(taps);
                            tracing::info!(taps = count, version, "Tap configuration reloaded");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload configuration");
                        }
                    }
                }
            }
        }
    }))
}
