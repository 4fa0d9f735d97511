use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// Re-export common dependencies
pub use serde;
pub use bincode;
pub use tokio;
pub use tracing;

// IPC client module
pub mod ipc_client;

/// A coordinate in canvas (screen) space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Squared euclidean distance, saturating at `i64::MAX`
    pub fn distance_squared(self, other: Point) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Shift the point vertically, used to move from screen space into the
    /// drawing surface below the control band
    pub fn offset_y(self, dy: i32) -> Self {
        Self::new(self.x, self.y.saturating_add(dy))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An RGB color triple
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const BLUE: Rgb = Rgb(0, 0, 255);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const MAGENTA: Rgb = Rgb(255, 0, 255);
    pub const CYAN: Rgb = Rgb(0, 255, 255);
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Drawing tool selected on a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tool {
    #[default]
    Marker,
    Eraser,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Tool::Marker => write!(f, "Marker"),
            Tool::Eraser => write!(f, "Eraser"),
        }
    }
}

/// A committed polyline and the color it was drawn with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: Rgb,
}

impl Stroke {
    pub fn new(points: Vec<Point>, color: Rgb) -> Self {
        Self { points, color }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Controls in the header band. `Swatch` carries the palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Control {
    Undo,
    Redo,
    Clear,
    Eraser,
    Marker,
    ChangeColor,
    Swatch(usize),
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Control::Undo => write!(f, "Undo"),
            Control::Redo => write!(f, "Redo"),
            Control::Clear => write!(f, "Clear"),
            Control::Eraser => write!(f, "Eraser"),
            Control::Marker => write!(f, "Marker"),
            Control::ChangeColor => write!(f, "Change Color"),
            Control::Swatch(index) => write!(f, "Swatch {}", index),
        }
    }
}

/// Information about a discovered input device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub path: PathBuf,
    pub vendor_id: u16,
    pub product_id: u16,
    pub phys: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (VID: {:04X}, PID: {:04X})",
               self.name, self.vendor_id, self.product_id)
    }
}

/// One polyline of a composited frame, already translated into drawing
/// surface coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drawable {
    pub points: Vec<Point>,
    pub color: Rgb,
    pub width: u32,
}

/// Live cursor of a paired device, in screen coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub device_id: String,
    pub owner: String,
    pub position: Point,
    pub tool: Tool,
    pub color: Rgb,
}

/// A composited frame as handed to the presentation layer.
///
/// `sequence` is the number of composition passes that produced `drawables`;
/// cursors and header state are refreshed on every display frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub sequence: u64,
    pub drawables: Vec<Drawable>,
    pub cursors: Vec<Cursor>,
    pub palette_visible: bool,
    pub hovered: Vec<Control>,
}

/// Summary of a paired device for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub privileged: bool,
    pub position: Point,
    pub tool: Tool,
    pub color: Rgb,
    pub size: u32,
    pub strokes: usize,
    pub redo_depth: usize,
}

/// IPC requests from a presentation client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Fetch the most recently published frame
    GetFrame,

    /// Get daemon status and version
    GetStatus,

    /// List all paired devices
    ListDevices,
}

/// IPC responses from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Latest composited frame
    Frame(Frame),

    /// Status information
    Status {
        version: String,
        uptime_seconds: u64,
        devices_count: usize,
        frame_sequence: u64,
    },

    /// Currently paired devices
    Devices(Vec<PairedDevice>),

    /// Error response
    Error(String),
}

/// Serialization helpers for the IPC protocol
pub fn serialize<T: Serialize>(msg: &T) -> Vec<u8> {
    bincode::serialize(msg).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize message: {:?}", e);
        Vec::new()
    })
}

pub fn deserialize<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}
