use sharedcanvas_common::{ipc_client::DEFAULT_SOCKET_PATH, tracing, Control, Point, Rgb};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Default location of the daemon configuration
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sharedcanvas/config.yaml";

/// Configuration manager for the sharedcanvas daemon
pub struct ConfigManager {
    pub config_path: PathBuf,
    pub config: CanvasConfig,
}

/// Daemon configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub daemon: DaemonSettings,
    pub canvas: CanvasSettings,
    pub devices: DeviceSettings,
    pub drawing: DrawingSettings,
    pub rendering: RenderSettings,
    pub header: HeaderSettings,
}

/// Daemon-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub socket_path: String,
    /// Group given ownership of the socket, if any
    pub socket_group: Option<String>,
    pub log_level: String,
}

/// Screen geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasSettings {
    pub width: i32,
    pub height: i32,
    /// Height of the control band at the top of the screen
    pub header_height: i32,
    /// Distance kept between cursors and the top/bottom screen edges
    pub vertical_margin: i32,
}

/// Device discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub input_devices_path: String,
    /// Device names to pair, one worker each
    pub names: Vec<String>,
    /// Name of the device that gets the administrator role
    pub admin_name: Option<String>,
    /// Take exclusive access so the desktop cursor does not move too
    pub grab: bool,
    pub poll_interval_ms: u64,
}

/// Per-device drawing defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawingSettings {
    pub default_color: Rgb,
    pub default_size: u32,
    pub eraser_radius: i32,
    /// Per-event motion clamp while a button is held
    pub max_motion_delta: i32,
}

/// Render cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub refresh_interval_ms: u64,
    pub target_fps: u32,
}

/// A command button in the control band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonSettings {
    pub control: Control,
    pub center: Point,
}

/// Control band layout and click handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSettings {
    pub debounce_ms: u64,
    /// Checked in order; the first button containing a click wins
    pub buttons: Vec<ButtonSettings>,
    pub button_width: i32,
    pub button_height: i32,
    pub palette: Vec<Rgb>,
    /// Center of the first swatch
    pub palette_origin: Point,
    pub palette_spacing: i32,
    pub swatch_size: i32,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            socket_group: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            header_height: 100,
            vertical_margin: 10,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            input_devices_path: "/dev/input".to_string(),
            names: vec![
                "ImExPS/2 Generic Explorer Mouse".to_string(),
                "Lenovo Bluetooth Mouse".to_string(),
                "Microsoft Arc Mouse".to_string(),
            ],
            admin_name: Some("ImExPS/2 Generic Explorer Mouse".to_string()),
            grab: false,
            poll_interval_ms: 10,
        }
    }
}

impl Default for DrawingSettings {
    fn default() -> Self {
        Self {
            default_color: Rgb::BLACK,
            default_size: 5,
            eraser_radius: 10,
            max_motion_delta: 7,
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
            target_fps: 60,
        }
    }
}

impl Default for HeaderSettings {
    fn default() -> Self {
        let controls = [
            Control::Undo,
            Control::Redo,
            Control::Clear,
            Control::Eraser,
            Control::Marker,
            Control::ChangeColor,
        ];

        Self {
            debounce_ms: 100,
            buttons: controls
                .into_iter()
                .zip((100..).step_by(150))
                .map(|(control, x)| ButtonSettings { control, center: Point::new(x, 50) })
                .collect(),
            button_width: 60,
            button_height: 44,
            palette: vec![Rgb::RED, Rgb::GREEN, Rgb::BLUE, Rgb::YELLOW, Rgb::MAGENTA, Rgb::CYAN],
            palette_origin: Point::new(950, 50),
            palette_spacing: 50,
            swatch_size: 20,
        }
    }
}

impl DaemonSettings {
    /// Map the configured level name onto a tracing level, falling back to INFO
    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

impl DeviceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RenderSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Duration of one display frame at the target rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

impl HeaderSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl CanvasConfig {
    /// Reject geometry and tuning values the daemon cannot work with
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let canvas = &self.canvas;
        if canvas.width <= 0 || canvas.height <= 0 {
            return Err(format!("Canvas size must be positive, got {}x{}", canvas.width, canvas.height).into());
        }
        if canvas.vertical_margin < 0 || canvas.height <= 2 * canvas.vertical_margin {
            return Err(format!("Vertical margin {} does not fit a canvas of height {}",
                               canvas.vertical_margin, canvas.height).into());
        }
        if canvas.header_height < 0 || canvas.header_height >= canvas.height {
            return Err(format!("Header height {} must be below canvas height {}",
                               canvas.header_height, canvas.height).into());
        }
        if self.rendering.target_fps == 0 {
            return Err("Target frame rate must be at least 1".into());
        }
        if self.drawing.default_size == 0 {
            return Err("Default stroke size must be positive".into());
        }
        if self.drawing.eraser_radius <= 0 {
            return Err("Eraser radius must be positive".into());
        }
        if self.drawing.max_motion_delta <= 0 {
            return Err("Maximum motion delta must be positive".into());
        }
        if let Some(button) = self.header.buttons.iter().find(|b| matches!(b.control, Control::Swatch(_))) {
            return Err(format!("Swatch '{}' belongs in header.palette, not header.buttons", button.control).into());
        }
        Ok(())
    }
}

impl ConfigManager {
    /// Create a configuration manager for the given path, holding defaults
    /// until `load_config` runs
    pub fn new<P: Into<PathBuf>>(config_path: P) -> Self {
        Self {
            config_path: config_path.into(),
            config: CanvasConfig::default(),
        }
    }

    /// Load configuration from disk, keeping defaults when the file is absent
    pub async fn load_config(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Loading configuration from {}", self.config_path.display());

        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path).await?;
            self.config = serde_yaml::from_str(&content)?;
            debug!("Loaded configuration from disk");
        } else {
            warn!("Configuration file not found, using defaults");
            self.config = CanvasConfig::default();
        }

        Ok(())
    }

    /// Save configuration to disk
    pub async fn save_config(&self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Saving configuration to {}", self.config_path.display());

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_yaml::to_string(&self.config)?;
        fs::write(&self.config_path, content).await?;

        debug!("Configuration saved");
        Ok(())
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }
}
