//! Sharedcanvas Daemon - Main Entry Point
//!
//! Pairs the configured pointing devices, runs one input worker per device,
//! composes their strokes at the display frame rate and serves the frames
//! to presentation clients over a Unix socket.

use sharedcanvas_common::tracing;
use sharedcanvasd::config::{ConfigManager, DEFAULT_CONFIG_PATH};
use sharedcanvasd::device::{DeviceManager, EvdevSource};
use sharedcanvasd::registry::DeviceRegistry;
use sharedcanvasd::router::{Coordinator, DeviceIdentity, DrawLock, RouterSettings, ShutdownSignal, WorkerContext,
                            WorkerSet};
use sharedcanvasd::{ipc, DaemonState};
use std::env;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Initialize logging; the configured level applies once the config is read
    let (level, level_handle) = reload::Layer::new(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(level)
        .with(fmt::layer().with_target(false))
        .init();

    if let Some(path) = flag_value(&args, "--write-default-config") {
        ConfigManager::new(path).save_config().await?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    let config_path = flag_value(&args, "--config").unwrap_or(DEFAULT_CONFIG_PATH);
    let mut config_manager = ConfigManager::new(config_path);
    config_manager.load_config().await?;
    let config = config_manager.config().clone();
    config.validate()?;
    level_handle.modify(|filter| *filter = LevelFilter::from_level(config.daemon.tracing_level()))?;

    info!("Starting Sharedcanvas Daemon v{}", env!("CARGO_PKG_VERSION"));

    if !nix::unistd::getuid().is_root() {
        warn!("Not running as root, input devices may not be readable");
    }

    let registry = Arc::new(DeviceRegistry::from_config(&config));
    let draw_lock = DrawLock::new();
    let shutdown = ShutdownSignal::new();
    let (click_tx, click_rx) = mpsc::unbounded_channel();

    // Everything that can fail comes up before any worker holds a device
    let mut signals = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let coordinator = Coordinator::from_config(&config, Arc::clone(&registry), draw_lock.clone(), click_rx);
    let state = Arc::new(DaemonState::new(Arc::clone(&registry), coordinator.subscribe()));
    let mut ipc_server = ipc::IpcServer::new(&config.daemon.socket_path)?
        .with_socket_group(config.daemon.socket_group.clone());
    ipc_server.start(state).await?;
    info!("IPC server started successfully");

    let coordinator_handle = tokio::spawn(coordinator.run(shutdown.clone()));

    // Discover and start one worker per configured device
    let mut device_manager = DeviceManager::new(&config.devices.input_devices_path);
    if let Err(e) = device_manager.start_discovery().await {
        error!("Device discovery failed: {}", e);
    }

    let selected = device_manager.select(&config.devices.names);
    if selected.is_empty() {
        warn!("None of the configured devices were found");
    }

    let mut workers = WorkerSet::new(WorkerContext {
        registry: Arc::clone(&registry),
        draw_lock,
        clicks: click_tx,
        shutdown: shutdown.clone(),
        settings: RouterSettings::from_config(&config),
    });

    for (n, device) in selected.into_iter().enumerate() {
        let source = match EvdevSource::open(&device.path, config.devices.grab) {
            Ok(source) => source,
            Err(e) => {
                error!("Skipping {}: {}", device, e);
                continue;
            }
        };

        let identity = DeviceIdentity {
            id: device.path.display().to_string(),
            name: device.name.clone(),
            owner: format!("user{}", n + 1),
        };
        info!("Starting worker for {} as {}", device, identity.owner);
        workers.spawn(identity, source);
    }
    info!("{} input workers running", workers.len());

    tokio::select! {
        _ = signals.recv() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = interrupt.recv() => {
            info!("Received SIGINT, shutting down gracefully");
        }
    }

    info!("Starting cleanup...");
    workers.shutdown().await;

    if let Err(e) = coordinator_handle.await {
        error!("Coordinator task failed: {}", e);
    }

    ipc_server.shutdown().await?;
    info!("Sharedcanvas Daemon shutdown complete");
    Ok(())
}

/// Value following `flag` on the command line
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
