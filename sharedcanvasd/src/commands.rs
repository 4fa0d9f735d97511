//! Control band: header layout, hover detection and click dispatch.

use sharedcanvas_common::{tracing, Control, Point, Rgb, Tool};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::HeaderSettings;
use crate::registry::DeviceRegistry;

/// Axis-aligned rectangle with half-open containment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn centered(center: Point, width: i32, height: i32) -> Self {
        Self {
            left: center.x - width / 2,
            top: center.y - height / 2,
            width,
            height,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x < self.left + self.width
            && point.y >= self.top
            && point.y < self.top + self.height
    }
}

/// Hit regions of the control band
#[derive(Debug, Clone)]
pub struct HeaderLayout {
    band_height: i32,
    buttons: Vec<(Control, Rect)>,
    swatches: Vec<(Rgb, Rect)>,
}

impl HeaderLayout {
    pub fn new(band_height: i32, buttons: Vec<(Control, Rect)>, swatches: Vec<(Rgb, Rect)>) -> Self {
        Self { band_height, buttons, swatches }
    }

    pub fn from_settings(settings: &HeaderSettings, band_height: i32) -> Self {
        let buttons = settings
            .buttons
            .iter()
            .map(|b| (b.control, Rect::centered(b.center, settings.button_width, settings.button_height)))
            .collect();

        let swatches = settings
            .palette
            .iter()
            .zip(0..)
            .map(|(&color, i)| {
                let center = Point::new(settings.palette_origin.x + i * settings.palette_spacing,
                                        settings.palette_origin.y);
                (color, Rect::centered(center, settings.swatch_size, settings.swatch_size))
            })
            .collect();

        Self::new(band_height, buttons, swatches)
    }

    pub fn band_height(&self) -> i32 {
        self.band_height
    }

    pub fn in_band(&self, point: Point) -> bool {
        point.y < self.band_height
    }

    pub fn button_at(&self, point: Point) -> Option<Control> {
        self.buttons.iter().find(|(_, rect)| rect.contains(point)).map(|&(control, _)| control)
    }

    pub fn swatch_at(&self, point: Point) -> Option<(usize, Rgb)> {
        self.swatches
            .iter()
            .position(|(_, rect)| rect.contains(point))
            .map(|index| (index, self.swatches[index].0))
    }

    /// Every control under at least one of the given cursors
    pub fn hovered(&self, positions: &[Point], palette_visible: bool) -> Vec<Control> {
        let under_cursor = |rect: &Rect| positions.iter().any(|&p| rect.contains(p));

        let mut hovered: Vec<Control> = self
            .buttons
            .iter()
            .filter(|(_, rect)| under_cursor(rect))
            .map(|&(control, _)| control)
            .collect();

        if palette_visible {
            hovered.extend(
                self.swatches
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, rect))| under_cursor(rect))
                    .map(|(index, _)| Control::Swatch(index)),
            );
        }
        hovered
    }
}

/// Executes control band clicks against the registry
pub struct CommandDispatcher {
    layout: HeaderLayout,
    palette_visible: bool,
    last_click: Option<Instant>,
    debounce: Duration,
    tool_size: u32,
}

impl CommandDispatcher {
    pub fn new(layout: HeaderLayout, debounce: Duration, tool_size: u32) -> Self {
        Self {
            layout,
            palette_visible: false,
            last_click: None,
            debounce,
            tool_size,
        }
    }

    pub fn layout(&self) -> &HeaderLayout {
        &self.layout
    }

    pub fn palette_visible(&self) -> bool {
        self.palette_visible
    }

    /// Handle a click issued by `device_id`, returning the executed control
    pub fn handle_click(&mut self, position: Point, device_id: &str, registry: &DeviceRegistry) -> Option<Control> {
        self.handle_click_at(position, device_id, registry, Instant::now())
    }

    pub fn handle_click_at(&mut self, position: Point, device_id: &str, registry: &DeviceRegistry,
                           now: Instant) -> Option<Control> {
        if let Some(last) = self.last_click {
            if now.saturating_duration_since(last) < self.debounce {
                debug!("Ignoring click from {} at {} within debounce window", device_id, position);
                return None;
            }
        }
        self.last_click = Some(now);

        // History must reflect every gesture in flight before a command runs
        let committed = registry.commit_all_lines();
        if committed > 0 {
            debug!("Committed {} in-progress strokes before command", committed);
        }

        if let Some(control) = self.layout.button_at(position) {
            info!("Button '{}' clicked by {}", control, device_id);
            self.execute(control, device_id, registry);
            return Some(control);
        }

        if self.palette_visible {
            if let Some((index, _)) = self.layout.swatch_at(position) {
                self.pick_swatch(index, device_id, registry);
                return Some(Control::Swatch(index));
            }
        }

        None
    }

    fn execute(&mut self, control: Control, device_id: &str, registry: &DeviceRegistry) {
        match control {
            Control::Undo => {
                registry.undo(device_id);
            }
            Control::Redo => {
                registry.redo(device_id);
            }
            Control::Clear => {
                registry.clear(device_id);
            }
            Control::Eraser => {
                registry.set_tool(device_id, Tool::Eraser);
                registry.set_size(device_id, self.tool_size);
            }
            Control::Marker => {
                registry.set_tool(device_id, Tool::Marker);
                registry.set_size(device_id, self.tool_size);
            }
            Control::ChangeColor => {
                self.palette_visible = !self.palette_visible;
            }
            // Config validation keeps swatches out of the button list
            Control::Swatch(index) => self.pick_swatch(index, device_id, registry),
        }
    }

    fn pick_swatch(&mut self, index: usize, device_id: &str, registry: &DeviceRegistry) {
        if let Some(&(color, _)) = self.layout.swatches.get(index) {
            info!("{} changed color to {}", device_id, color);
            registry.set_color(device_id, color);
            registry.set_tool(device_id, Tool::Marker);
            self.palette_visible = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CanvasBounds, DrawingDefaults};

    const ADMIN: &str = "Admin Mouse";

    fn registry() -> DeviceRegistry {
        let registry = DeviceRegistry::new(CanvasBounds::new(1920, 1080, 10), DrawingDefaults::default(),
                                           Some(ADMIN.to_string()));
        registry.pair("a", "Mouse", "user1");
        registry.pair("b", ADMIN, "user2");
        registry
    }

    fn dispatcher() -> CommandDispatcher {
        let layout = HeaderLayout::from_settings(&HeaderSettings::default(), 100);
        CommandDispatcher::new(layout, Duration::from_millis(100), 5)
    }

    fn draw(registry: &DeviceRegistry, id: &str, y: i32) {
        registry.add_to_current_line(id, Point::new(0, y));
        registry.add_to_current_line(id, Point::new(10, y));
        registry.commit_line(id);
    }

    /// Click several times, far enough apart to never be debounced
    fn click_all(dispatcher: &mut CommandDispatcher, registry: &DeviceRegistry, clicks: &[(Point, &str)])
                 -> Vec<Option<Control>> {
        let start = Instant::now();
        clicks
            .iter()
            .zip(0u64..)
            .map(|(&(pos, id), n)| dispatcher.handle_click_at(pos, id, registry, start + Duration::from_secs(n)))
            .collect()
    }

    const UNDO: Point = Point::new(100, 50);
    const REDO: Point = Point::new(250, 50);
    const CLEAR: Point = Point::new(400, 50);
    const ERASER: Point = Point::new(550, 50);
    const MARKER: Point = Point::new(700, 50);
    const CHANGE_COLOR: Point = Point::new(850, 50);
    const SECOND_SWATCH: Point = Point::new(1000, 50);

    #[test]
    fn test_rect_containment_is_half_open() {
        let rect = Rect::centered(Point::new(100, 50), 60, 44);
        assert!(rect.contains(Point::new(70, 28)));
        assert!(!rect.contains(Point::new(130, 50)));
        assert!(!rect.contains(Point::new(100, 72)));
        assert!(rect.contains(Point::new(129, 71)));
    }

    #[test]
    fn test_undo_redo_buttons() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        draw(&registry, "a", 200);

        let results = click_all(&mut dispatcher, &registry, &[(UNDO, "a")]);
        assert_eq!(results, vec![Some(Control::Undo)]);
        assert!(registry.undo_stack("a").is_empty());

        let results = click_all(&mut dispatcher, &registry, &[(REDO, "a")]);
        assert_eq!(results, vec![Some(Control::Redo)]);
        assert_eq!(registry.undo_stack("a").len(), 1);
    }

    #[test]
    fn test_click_commits_lines_in_progress() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        registry.add_to_current_line("a", Point::new(0, 300));
        registry.add_to_current_line("a", Point::new(5, 300));

        // Undo issued by b still commits a's gesture first
        click_all(&mut dispatcher, &registry, &[(UNDO, "b")]);
        assert_eq!(registry.undo_stack("a").len(), 1);
        assert!(registry.get_current_line("a").is_empty());
    }

    #[test]
    fn test_admin_clear_button_cascades() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        draw(&registry, "a", 200);
        draw(&registry, "b", 300);

        click_all(&mut dispatcher, &registry, &[(CLEAR, "a")]);
        assert!(registry.undo_stack("a").is_empty());
        assert_eq!(registry.undo_stack("b").len(), 1);

        draw(&registry, "a", 200);
        click_all(&mut dispatcher, &registry, &[(CLEAR, "b")]);
        assert!(registry.undo_stack("a").is_empty());
        assert!(registry.undo_stack("b").is_empty());
    }

    #[test]
    fn test_tool_buttons_reset_size() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        registry.set_size("a", 20);

        click_all(&mut dispatcher, &registry, &[(ERASER, "a")]);
        assert_eq!(registry.tool("a"), Some(Tool::Eraser));
        assert_eq!(registry.size("a"), Some(5));

        registry.set_size("a", 20);
        click_all(&mut dispatcher, &registry, &[(MARKER, "a")]);
        assert_eq!(registry.tool("a"), Some(Tool::Marker));
        assert_eq!(registry.size("a"), Some(5));
    }

    #[test]
    fn test_palette_flow() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        registry.set_tool("a", Tool::Eraser);

        // Swatches are inert while the palette is hidden
        let results = click_all(&mut dispatcher, &registry, &[
            (SECOND_SWATCH, "a"),
            (CHANGE_COLOR, "a"),
            (SECOND_SWATCH, "a"),
        ]);
        assert_eq!(results, vec![None, Some(Control::ChangeColor), Some(Control::Swatch(1))]);
        assert_eq!(registry.color("a"), Some(Rgb::GREEN));
        assert_eq!(registry.tool("a"), Some(Tool::Marker));
        assert!(!dispatcher.palette_visible());
    }

    #[test]
    fn test_change_color_toggles() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        click_all(&mut dispatcher, &registry, &[(CHANGE_COLOR, "a")]);
        assert!(dispatcher.palette_visible());
        click_all(&mut dispatcher, &registry, &[(CHANGE_COLOR, "b")]);
        assert!(!dispatcher.palette_visible());
    }

    #[test]
    fn test_debounce_ignores_rapid_clicks() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        draw(&registry, "a", 200);
        draw(&registry, "a", 300);

        let start = Instant::now();
        assert_eq!(dispatcher.handle_click_at(UNDO, "a", &registry, start), Some(Control::Undo));
        assert_eq!(dispatcher.handle_click_at(UNDO, "a", &registry, start + Duration::from_millis(50)), None);
        assert_eq!(registry.undo_stack("a").len(), 1);

        assert_eq!(dispatcher.handle_click_at(UNDO, "a", &registry, start + Duration::from_millis(150)),
                   Some(Control::Undo));
        assert!(registry.undo_stack("a").is_empty());
    }

    #[test]
    fn test_click_outside_controls() {
        let registry = registry();
        let mut dispatcher = dispatcher();
        let results = click_all(&mut dispatcher, &registry, &[(Point::new(1800, 50), "a")]);
        assert_eq!(results, vec![None]);
    }

    #[test]
    fn test_hovered_controls() {
        let layout = HeaderLayout::from_settings(&HeaderSettings::default(), 100);
        let positions = [UNDO, SECOND_SWATCH, Point::new(500, 500)];

        assert_eq!(layout.hovered(&positions, false), vec![Control::Undo]);
        assert_eq!(layout.hovered(&positions, true), vec![Control::Undo, Control::Swatch(1)]);
        assert!(layout.in_band(UNDO));
        assert!(!layout.in_band(Point::new(0, 100)));
    }
}
