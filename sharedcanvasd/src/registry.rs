//! Process-wide registry of paired devices.
//!
//! Every read and mutation runs under a single mutex, which makes the
//! administrator cascades (clear, erase) atomic with respect to commits from
//! other workers. Callers only ever receive copies of device state.

use sharedcanvas_common::{tracing, PairedDevice, Point, Rgb, Stroke, Tool, Cursor};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::CanvasConfig;
use crate::state::{DeviceState, Role};

/// Clamp region for cursor positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasBounds {
    pub width: i32,
    pub height: i32,
    pub vertical_margin: i32,
}

impl CanvasBounds {
    pub fn new(width: i32, height: i32, vertical_margin: i32) -> Self {
        Self { width, height, vertical_margin }
    }

    /// Clamp into [0, width] x [margin, height - margin]
    pub fn clamp(&self, point: Point) -> Point {
        Point::new(
            point.x.min(self.width).max(0),
            point.y.min(self.height - self.vertical_margin).max(self.vertical_margin),
        )
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2, self.height / 2)
    }
}

/// Values a freshly paired device starts with
#[derive(Debug, Clone, Copy)]
pub struct DrawingDefaults {
    pub color: Rgb,
    pub size: u32,
    pub eraser_radius: i32,
}

impl Default for DrawingDefaults {
    fn default() -> Self {
        Self { color: Rgb::BLACK, size: 5, eraser_radius: 10 }
    }
}

/// Registry of paired devices keyed by device id (the input node path)
pub struct DeviceRegistry {
    devices: Mutex<BTreeMap<String, DeviceState>>,
    bounds: CanvasBounds,
    defaults: DrawingDefaults,
    admin_name: Option<String>,
}

impl DeviceRegistry {
    pub fn new(bounds: CanvasBounds, defaults: DrawingDefaults, admin_name: Option<String>) -> Self {
        Self {
            devices: Mutex::new(BTreeMap::new()),
            bounds,
            defaults,
            admin_name,
        }
    }

    pub fn from_config(config: &CanvasConfig) -> Self {
        Self::new(
            CanvasBounds::new(config.canvas.width, config.canvas.height, config.canvas.vertical_margin),
            DrawingDefaults {
                color: config.drawing.default_color,
                size: config.drawing.default_size,
                eraser_radius: config.drawing.eraser_radius,
            },
            config.devices.admin_name.clone(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DeviceState>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_device<T>(&self, id: &str, f: impl FnOnce(&mut DeviceState) -> T) -> Option<T> {
        self.lock().get_mut(id).map(f)
    }

    pub fn bounds(&self) -> CanvasBounds {
        self.bounds
    }

    pub fn defaults(&self) -> DrawingDefaults {
        self.defaults
    }

    /// Role a device with this name receives from `pair`
    pub fn role_for(&self, name: &str) -> Role {
        match &self.admin_name {
            Some(admin) if admin == name => Role::Administrator,
            _ => Role::Participant,
        }
    }

    /// Pair a device, deriving its role from the configured administrator name
    pub fn pair(&self, id: &str, name: &str, owner: &str) -> bool {
        self.pair_with_role(id, name, owner, self.role_for(name))
    }

    /// Pair a device with an explicit role. Fails if `id` is already paired.
    pub fn pair_with_role(&self, id: &str, name: &str, owner: &str, role: Role) -> bool {
        let mut devices = self.lock();
        info!("Attempting to pair device {} with user {} and name {}", id, owner, name);

        if devices.contains_key(id) {
            warn!("Device {} already in use", name);
            return false;
        }

        let state = DeviceState::new(id, name, owner, role, self.bounds.center(),
                                     self.defaults.color, self.defaults.size);
        devices.insert(id.to_string(), state);
        info!("Successfully paired device {} with user {} ({:?})", name, owner, role);
        true
    }

    pub fn unpair(&self, id: &str) -> bool {
        if self.lock().remove(id).is_some() {
            info!("{} unpaired", id);
            true
        } else {
            debug!("{} was not paired", id);
            false
        }
    }

    pub fn is_privileged(&self, id: &str) -> bool {
        self.with_device(id, |d| d.is_privileged()).unwrap_or(false)
    }

    /// Store a clamped position, returning what was stored
    pub fn set_position(&self, id: &str, position: Point) -> Option<Point> {
        let clamped = self.bounds.clamp(position);
        self.with_device(id, |d| {
            d.position = clamped;
            clamped
        })
    }

    pub fn position(&self, id: &str) -> Option<Point> {
        self.with_device(id, |d| d.position)
    }

    pub fn add_to_current_line(&self, id: &str, point: Point) {
        self.with_device(id, |d| d.add_to_current_line(point));
    }

    pub fn get_current_line(&self, id: &str) -> Vec<Point> {
        self.with_device(id, |d| d.current_line.clone()).unwrap_or_default()
    }

    pub fn clear_current_line(&self, id: &str) {
        self.with_device(id, |d| d.reset_current_line());
    }

    pub fn commit_line(&self, id: &str) -> bool {
        self.with_device(id, |d| d.commit_line()).unwrap_or(false)
    }

    /// Commit every device's live stroke in one critical section.
    /// Returns how many strokes were committed.
    pub fn commit_all_lines(&self) -> usize {
        self.lock()
            .values_mut()
            .map(|d| d.commit_line())
            .filter(|&committed| committed)
            .count()
    }

    pub fn undo(&self, id: &str) -> bool {
        self.with_device(id, |d| d.undo()).unwrap_or(false)
    }

    pub fn redo(&self, id: &str) -> bool {
        self.with_device(id, |d| d.redo()).unwrap_or(false)
    }

    /// Erase around `position` on the issuer, or on every device when the
    /// issuer is an administrator
    pub fn erase(&self, id: &str, position: Point) -> bool {
        let radius = self.defaults.eraser_radius;
        let mut devices = self.lock();

        let Some(issuer) = devices.get_mut(id) else {
            return false;
        };

        if issuer.is_privileged() {
            let erased: usize = devices.values_mut().map(|d| d.erase(position, radius)).sum();
            if erased > 0 {
                debug!("Administrator {} erased {} points across all devices", id, erased);
            }
        } else {
            issuer.erase(position, radius);
        }
        true
    }

    /// Clear the issuer's history, or every device's when the issuer is an
    /// administrator
    pub fn clear(&self, id: &str) -> bool {
        let mut devices = self.lock();

        let Some(issuer) = devices.get_mut(id) else {
            return false;
        };

        if issuer.is_privileged() {
            info!("Administrator {} cleared every canvas", id);
            devices.values_mut().for_each(DeviceState::clear);
        } else {
            issuer.clear();
        }
        true
    }

    pub fn set_color(&self, id: &str, color: Rgb) {
        self.with_device(id, |d| d.set_color(color));
    }

    pub fn color(&self, id: &str) -> Option<Rgb> {
        self.with_device(id, |d| d.color)
    }

    pub fn set_tool(&self, id: &str, tool: Tool) {
        self.with_device(id, |d| d.set_tool(tool));
    }

    pub fn tool(&self, id: &str) -> Option<Tool> {
        self.with_device(id, |d| d.tool)
    }

    pub fn set_size(&self, id: &str, size: u32) {
        if size == 0 {
            warn!("Ignoring zero stroke size for {}", id);
            return;
        }
        self.with_device(id, |d| d.size = size);
    }

    pub fn size(&self, id: &str) -> Option<u32> {
        self.with_device(id, |d| d.size)
    }

    pub fn undo_stack(&self, id: &str) -> Vec<Stroke> {
        self.with_device(id, |d| d.undo_stack.clone()).unwrap_or_default()
    }

    pub fn redo_stack(&self, id: &str) -> Vec<Stroke> {
        self.with_device(id, |d| d.redo_stack.clone()).unwrap_or_default()
    }

    pub fn active_devices(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every device, ordered by id
    pub fn snapshot(&self) -> Vec<DeviceState> {
        self.lock().values().cloned().collect()
    }

    /// Cursor of every device, ordered by id
    pub fn cursors(&self) -> Vec<Cursor> {
        self.lock()
            .values()
            .map(|d| Cursor {
                device_id: d.id.clone(),
                owner: d.owner.clone(),
                position: d.position,
                tool: d.tool,
                color: d.color,
            })
            .collect()
    }

    /// Summaries for device listings
    pub fn paired_devices(&self) -> Vec<PairedDevice> {
        self.lock()
            .values()
            .map(|d| PairedDevice {
                id: d.id.clone(),
                name: d.name.clone(),
                owner: d.owner.clone(),
                privileged: d.is_privileged(),
                position: d.position,
                tool: d.tool,
                color: d.color,
                size: d.size,
                strokes: d.undo_stack.len(),
                redo_depth: d.redo_stack.len(),
            })
            .collect()
    }
}
