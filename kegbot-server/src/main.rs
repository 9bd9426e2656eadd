//! Kegbot Core Server
//!
//! Turns raw flow meter readings and auth token events into pours, and
//! records completed pours with the kegweb backend.

mod config;
mod event_log;
mod shutdown;

use clap::Parser;
use config::{BackendSettings, ConfigLoader, LoadedConfig, merge_backend_taps};
use kegbot_core::alarm::AlarmManager;
use kegbot_core::auth::AuthenticationManager;
use kegbot_core::backend::{Backend, MemoryBackend, WebBackend};
use kegbot_core::config::TapStore;
use kegbot_core::events::{
    EventPublisher, InboundEvent, completed_flow_channel, inbound_event_channel,
};
use kegbot_core::flow_manager::FlowManager;
use kegbot_core::processors::{
    AlarmDispatcher, CoreService, DrinkRecorder, Heartbeat, LineDevice, MeterReader,
};
use kegbot_core::tap::TapManager;
use kegbot_sdk::config::TapConfig;
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the drink recorder to flush after the core stops.
const RECORDER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Kegbot core - flow meter accounting and drink recording
#[derive(Parser, Debug)]
#[command(name = "kegbot-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "KEGBOT_CONFIG", default_value = "./kegbot.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    tracing::info!("Starting kegbot-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", config_loader.path());

    let LoadedConfig {
        core,
        backend: backend_settings,
        load_backend_taps,
        taps,
        devices,
        auth_policies,
    } = loaded;

    let backend = build_backend(backend_settings);
    tracing::info!(backend = backend.name(), "Backend ready");

    let taps = resolve_taps(backend.as_ref(), taps, load_backend_taps).await;
    let tap_store = TapStore::new(taps);

    // Channels and shared managers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = inbound_event_channel();
    let (completed_tx, completed_rx) = completed_flow_channel();
    let publisher = EventPublisher::new(core.event_buffer);

    let event_logger = tokio::spawn(event_log::run(publisher.subscribe()));

    let tap_manager = Arc::new(TapManager::new());
    let flows = Arc::new(FlowManager::new(
        tap_manager,
        publisher.clone(),
        completed_tx,
        core.idle_timeout,
    ));
    let alarms = Arc::new(AlarmManager::<InboundEvent>::new());
    let auth = Arc::new(AuthenticationManager::new(
        flows.clone(),
        backend.clone(),
        auth_policies,
        alarms.clone(),
    ));

    // Spawn processors
    let core_service = CoreService::new(flows.clone(), auth.clone());
    let core_handle = tokio::spawn(core_service.run(
        shutdown_rx.clone(),
        event_rx,
        tap_store.clone(),
        tap_store.subscribe(),
    ));

    let recorder = DrinkRecorder::new(
        backend.clone(),
        publisher.clone(),
        core.min_volume_to_record_ml,
    );
    let recorder_handle = tokio::spawn(recorder.run(shutdown_rx.clone(), completed_rx));

    let heartbeat_handle = tokio::spawn(
        Heartbeat::new(core.heartbeat_interval).run(shutdown_rx.clone(), event_tx.clone()),
    );

    let alarm_handle = tokio::spawn(
        AlarmDispatcher::new(alarms.clone()).run(shutdown_rx.clone(), event_tx.clone()),
    );

    let reader_handles: Vec<_> = devices
        .iter()
        .map(|device| {
            tracing::info!(device = %device.name, path = %device.path, "Starting meter reader");
            let reader = MeterReader::new(
                LineDevice::from_config(device),
                device.poll_timeout,
                device.reopen_delay,
            );
            tokio::spawn(reader.run(shutdown_rx.clone(), event_tx.clone()))
        })
        .collect();
    drop(event_tx);

    // Spawn config reload handler (listens for SIGHUP)
    let reload_handle = spawn_config_reload_handler(
        config_loader,
        backend.clone(),
        tap_store,
        shutdown_rx.clone(),
    )?;

    tracing::info!(devices = reader_handles.len(), "kegbot-server running");

    if let Err(e) = shutdown_signal().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signals");
    }
    let _ = shutdown_tx.send(true);

    for handle in reader_handles {
        let _ = handle.await;
    }
    let _ = heartbeat_handle.await;
    let _ = alarm_handle.await;
    let _ = reload_handle.await;

    // The core service ends all active flows before it exits.
    if let Err(e) = core_handle.await {
        tracing::error!(error = %e, "CoreService task failed");
    }

    // Release the completed-flow sender so the recorder's drain can finish.
    drop(auth);
    drop(flows);
    drop(alarms);

    match tokio::time::timeout(RECORDER_SHUTDOWN_TIMEOUT, recorder_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "DrinkRecorder task failed"),
        Err(_) => tracing::error!("DrinkRecorder did not finish in time"),
    }

    drop(publisher);
    let _ = tokio::time::timeout(Duration::from_secs(1), event_logger).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Configured taps, plus the backend's taps when requested.
pub(crate) async fn resolve_taps(
    backend: &dyn Backend,
    taps: Vec<TapConfig>,
    load_backend_taps: bool,
) -> Vec<TapConfig> {
    if !load_backend_taps {
        return taps;
    }
    match backend.get_all_taps().await {
        Ok(backend_taps) => {
            tracing::info!(count = backend_taps.len(), "Loaded taps from backend");
            merge_backend_taps(taps, backend_taps)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load taps from backend, using configured taps only");
            taps
        }
    }
}

fn build_backend(settings: BackendSettings) -> Arc<dyn Backend> {
    match settings {
        BackendSettings::Web {
            api_url,
            api_key,
            timeout,
        } => Arc::new(WebBackend::new(api_url, api_key, timeout)),
        BackendSettings::Memory { tokens } => Arc::new(MemoryBackend::new().with_tokens(tokens)),
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
