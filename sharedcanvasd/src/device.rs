//! Input device discovery and the evdev-backed event source.

use sharedcanvas_common::{tracing, DeviceInfo};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use evdev::{Device as EvdevDevice, InputEvent, InputEventKind, Key, RelativeAxisType};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::input::{Axis, EventSource, RawEvent, SourceError, SourcePoll};

/// Discovers input devices and picks the ones configured for drawing
pub struct DeviceManager {
    input_path: PathBuf,
    devices: Vec<DeviceInfo>,
}

impl DeviceManager {
    pub fn new<P: Into<PathBuf>>(input_path: P) -> Self {
        Self {
            input_path: input_path.into(),
            devices: Vec::new(),
        }
    }

    /// Scan the input directory for event nodes
    pub async fn start_discovery(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Starting device discovery in {}", self.input_path.display());

        let input_path = self.input_path.clone();
        self.devices = tokio::task::spawn_blocking(move || scan_devices(&input_path)).await??;

        for device in &self.devices {
            info!("Found device: {} at {}", device.name, device.path.display());
        }
        info!("Discovered {} input devices", self.devices.len());
        Ok(())
    }

    /// Get all discovered devices, ordered by event number
    pub fn get_devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    /// Discovered devices whose name is in `names`
    pub fn select(&self, names: &[String]) -> Vec<DeviceInfo> {
        select_devices(&self.devices, names)
    }
}

/// Pick the first node reported under each configured name.
///
/// Devices often expose several event nodes with the same name; only the
/// lowest numbered one is kept. The result follows the order of `names`.
pub fn select_devices(discovered: &[DeviceInfo], names: &[String]) -> Vec<DeviceInfo> {
    let mut selected: Vec<DeviceInfo> = Vec::new();

    for name in names {
        if selected.iter().any(|d| &d.name == name) {
            continue;
        }
        match discovered.iter().find(|d| &d.name == name) {
            Some(device) => selected.push(device.clone()),
            None => warn!("Configured device '{}' not found", name),
        }
    }

    selected
}

fn event_number(path: &Path) -> Option<u32> {
    path.file_name()?.to_str()?.strip_prefix("event")?.parse().ok()
}

fn scan_devices(input_path: &Path) -> io::Result<Vec<DeviceInfo>> {
    let mut nodes: Vec<(u32, PathBuf)> = Vec::new();
    for entry in fs::read_dir(input_path)? {
        let path = entry?.path();
        if let Some(number) = event_number(&path) {
            nodes.push((number, path));
        }
    }
    nodes.sort();

    let devices = nodes
        .into_iter()
        .filter_map(|(_, path)| match get_device_info(&path) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    Ok(devices)
}

fn get_device_info(path: &Path) -> io::Result<DeviceInfo> {
    let device = EvdevDevice::open(path)?;
    let input_id = device.input_id();

    Ok(DeviceInfo {
        name: device.name().unwrap_or("Unknown Device").to_string(),
        path: path.to_path_buf(),
        vendor_id: input_id.vendor(),
        product_id: input_id.product(),
        phys: device.physical_path().unwrap_or("unknown").to_string(),
    })
}

/// Map an evdev event onto the pointer events workers understand
pub fn translate(event: &InputEvent) -> Option<RawEvent> {
    match event.kind() {
        InputEventKind::RelAxis(RelativeAxisType::REL_X) => Some(RawEvent::motion_x(event.value())),
        InputEventKind::RelAxis(RelativeAxisType::REL_Y) => Some(RawEvent::motion_y(event.value())),
        InputEventKind::Key(Key::BTN_LEFT) => match event.value() {
            0 => Some(RawEvent::release()),
            1 => Some(RawEvent::press()),
            _ => None,
        },
        _ => None,
    }
}

/// Non-blocking evdev reader, optionally holding an exclusive grab
pub struct EvdevSource {
    path: String,
    device: EvdevDevice,
    pending: VecDeque<RawEvent>,
    grabbed: bool,
}

impl EvdevSource {
    pub fn open(path: &Path, grab: bool) -> Result<Self, SourceError> {
        let path_str = path.display().to_string();
        let mut device = EvdevDevice::open(path)
            .map_err(|source| SourceError::Open { path: path_str.clone(), source })?;

        let fd = device.as_raw_fd();
        let flags = fcntl(fd, FcntlArg::F_GETFL)
            .map_err(|source| SourceError::Configure { path: path_str.clone(), source })?;
        fcntl(fd, FcntlArg::F_SETFL(OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK))
            .map_err(|source| SourceError::Configure { path: path_str.clone(), source })?;

        if grab {
            device.grab().map_err(|source| SourceError::Grab { path: path_str.clone(), source })?;
            info!("Grabbed device {} exclusively", path_str);
        }

        Ok(Self {
            path: path_str,
            device,
            pending: VecDeque::new(),
            grabbed: grab,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl EventSource for EvdevSource {
    fn poll_event(&mut self, wait: Duration) -> Result<SourcePoll, SourceError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(SourcePoll::Event(event));
        }

        match self.device.fetch_events() {
            Ok(events) => self.pending.extend(events.filter_map(|e| translate(&e))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(wait);
                return Ok(SourcePoll::Idle);
            }
            Err(e) if e.raw_os_error() == Some(Errno::ENODEV as i32) => return Ok(SourcePoll::Closed),
            Err(source) => return Err(SourceError::Read { path: self.path.clone(), source }),
        }

        Ok(self.pending.pop_front().map_or(SourcePoll::Idle, SourcePoll::Event))
    }
}

impl Drop for EvdevSource {
    fn drop(&mut self) {
        if self.grabbed {
            match self.device.ungrab() {
                Ok(()) => info!("Released device {}", self.path),
                Err(e) => warn!("Failed to ungrab device {}: {}", self.path, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evdev::EventType;
    use tempfile::TempDir;

    fn info(name: &str, node: u32) -> DeviceInfo {
        DeviceInfo {
            name: name.to_string(),
            path: PathBuf::from(format!("/dev/input/event{}", node)),
            vendor_id: 0x046d,
            product_id: 0xc52b,
            phys: format!("usb-0000:00:14.0-{}/input0", node),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_keeps_first_node_per_name() {
        let discovered = vec![
            info("Power Button", 0),
            info("Microsoft Arc Mouse", 3),
            info("ImExPS/2 Generic Explorer Mouse", 4),
            info("Microsoft Arc Mouse", 5),
        ];

        let selected = select_devices(&discovered, &names(&[
            "ImExPS/2 Generic Explorer Mouse",
            "Lenovo Bluetooth Mouse",
            "Microsoft Arc Mouse",
        ]));

        let paths: Vec<PathBuf> = selected.iter().map(|d| d.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/dev/input/event4"), PathBuf::from("/dev/input/event3")]);
    }

    #[test]
    fn test_select_ignores_repeated_names() {
        let discovered = vec![info("Mouse", 1), info("Mouse", 2)];
        let selected = select_devices(&discovered, &names(&["Mouse", "Mouse"]));
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_event_number() {
        assert_eq!(event_number(Path::new("/dev/input/event12")), Some(12));
        assert_eq!(event_number(Path::new("/dev/input/mouse0")), None);
        assert_eq!(event_number(Path::new("/dev/input/eventx")), None);
    }

    #[test]
    fn test_translate_pointer_events() {
        let rel_x = InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_X.0, -3);
        let rel_y = InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_Y.0, 4);
        let wheel = InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_WHEEL.0, 1);
        let down = InputEvent::new(EventType::KEY, Key::BTN_LEFT.code(), 1);
        let up = InputEvent::new(EventType::KEY, Key::BTN_LEFT.code(), 0);
        let right = InputEvent::new(EventType::KEY, Key::BTN_RIGHT.code(), 1);

        assert_eq!(translate(&rel_x), Some(RawEvent::motion_x(-3)));
        assert_eq!(translate(&rel_y), Some(RawEvent::motion_y(4)));
        assert_eq!(translate(&wheel), None);
        assert_eq!(translate(&down), Some(RawEvent::press()));
        assert_eq!(translate(&up), Some(RawEvent::release()));
        assert_eq!(translate(&right), None);
    }

    #[tokio::test]
    async fn test_discovery_skips_non_devices() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("event0"), b"not a device").unwrap();
        std::fs::write(temp_dir.path().join("mouse0"), b"").unwrap();

        let mut manager = DeviceManager::new(temp_dir.path());
        manager.start_discovery().await.unwrap();
        assert!(manager.get_devices().is_empty());
        assert!(manager.select(&names(&["Mouse"])).is_empty());
    }

    #[tokio::test]
    async fn test_discovery_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = DeviceManager::new(temp_dir.path().join("absent"));
        assert!(manager.start_discovery().await.is_err());
    }

    #[test]
    fn test_open_missing_device() {
        let result = EvdevSource::open(Path::new("/nonexistent/event0"), false);
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }
}
