//! Sharedcanvas Daemon Library
//!
//! This library provides the core functionality for the sharedcanvas daemon:
//! - Per-device drawing state and the shared device registry
//! - Composition of every device's strokes into one frame
//! - Control band commands (undo, redo, clear, tools, palette)
//! - Input workers over evdev and the frame coordinator
//! - IPC communication with presentation clients

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

pub mod commands;
pub mod compositor;
pub mod config;
pub mod device;
pub mod input;
pub mod ipc;
pub mod registry;
pub mod router;
pub mod state;

// Re-export common types
pub use sharedcanvas_common::{Control, Frame, Point, Rgb, Stroke, Tool};

/// DaemonState holds what the IPC server reads
pub struct DaemonState {
    pub start_time: Instant,
    pub registry: Arc<registry::DeviceRegistry>,
    pub frames: watch::Receiver<Arc<Frame>>,
}

impl DaemonState {
    pub fn new(registry: Arc<registry::DeviceRegistry>, frames: watch::Receiver<Arc<Frame>>) -> Self {
        Self {
            start_time: Instant::now(),
            registry,
            frames,
        }
    }
}
