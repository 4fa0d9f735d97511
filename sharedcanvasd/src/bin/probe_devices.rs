//! Simple CLI tool to check which pointing devices the daemon would pair,
//! and to print the pointer events one of them produces.
//! Usage: cargo run --bin probe_devices -- [--grab] [/dev/input/eventX]

use sharedcanvas_common::tracing;
use sharedcanvasd::config::{ConfigManager, DEFAULT_CONFIG_PATH};
use sharedcanvasd::device::{DeviceManager, EvdevSource};
use sharedcanvasd::input::{EventSource, SourcePoll};
use sharedcanvasd::router::ShutdownSignal;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let grab = args.iter().any(|a| a == "--grab");
    let device_path = args.iter().find(|a| !a.starts_with("--")).map(PathBuf::from);

    if !nix::unistd::getuid().is_root() {
        warn!("Not running as root, some devices may be unreadable");
    }

    let mut config_manager = ConfigManager::new(DEFAULT_CONFIG_PATH);
    config_manager.load_config().await?;
    let config = config_manager.config().clone();

    let mut device_manager = DeviceManager::new(&config.devices.input_devices_path);
    device_manager.start_discovery().await?;

    let devices = device_manager.get_devices();
    info!("Found {} devices:", devices.len());
    for device in &devices {
        info!("  - {} at {} (phys {})", device, device.path.display(), device.phys);
    }

    let selected = device_manager.select(&config.devices.names);
    info!("The daemon would pair {} of them:", selected.len());
    for device in &selected {
        let role = if config.devices.admin_name.as_deref() == Some(device.name.as_str()) {
            "administrator"
        } else {
            "participant"
        };
        info!("  - {} at {} as {}", device.name, device.path.display(), role);
    }

    let Some(path) = device_path else {
        return Ok(());
    };

    if !devices.iter().any(|d| d.path == path) {
        error!("Device {} not found in discovered devices", path.display());
        std::process::exit(1);
    }

    // The reader runs on the blocking pool; Ctrl+C flips the signal
    let shutdown = ShutdownSignal::new();
    let reader_shutdown = shutdown.clone();
    let poll_interval = config.devices.poll_interval();

    let mut source = EvdevSource::open(&path, grab)?;
    info!("Reading pointer events from {}. Press Ctrl+C to exit.", source.path());

    let mut reader = tokio::task::spawn_blocking(move || {
        while !reader_shutdown.is_triggered() {
            match source.poll_event(poll_interval) {
                Ok(SourcePoll::Event(event)) => info!("{:?}", event),
                Ok(SourcePoll::Idle) => {}
                Ok(SourcePoll::Closed) => {
                    warn!("Device disconnected");
                    break;
                }
                Err(e) => {
                    error!("{}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, cleaning up...");
            shutdown.trigger();
            reader.await?;
        }
        result = &mut reader => result?,
    }

    info!("Device released. Probe complete!");
    Ok(())
}
