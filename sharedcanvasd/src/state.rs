//! Per-device drawing state: live stroke buffer, undo/redo histories and the
//! erase algorithm.

use sharedcanvas_common::{tracing, Point, Rgb, Stroke, Tool};
use tracing::{debug, info};

/// Fewest points a committed stroke may hold
pub const MIN_STROKE_POINTS: usize = 2;

/// Role assigned to a device when it pairs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Participant,
    /// May cascade clear and erase to every paired device
    Administrator,
}

/// Mutable record for one paired device
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub role: Role,
    pub position: Point,
    pub color: Rgb,
    pub tool: Tool,
    pub size: u32,
    pub current_line: Vec<Point>,
    /// Committed strokes, oldest first
    pub undo_stack: Vec<Stroke>,
    pub redo_stack: Vec<Stroke>,
}

impl DeviceState {
    pub fn new(id: &str, name: &str, owner: &str, role: Role, position: Point, color: Rgb, size: u32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            role,
            position,
            color,
            tool: Tool::Marker,
            size,
            current_line: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn add_to_current_line(&mut self, point: Point) {
        self.current_line.push(point);
    }

    pub fn reset_current_line(&mut self) {
        self.current_line.clear();
    }

    /// Move the live stroke onto the undo stack.
    ///
    /// Lines shorter than [`MIN_STROKE_POINTS`] are left untouched so a
    /// forced commit in the middle of a gesture does not lose its first point.
    pub fn commit_line(&mut self) -> bool {
        if self.current_line.len() < MIN_STROKE_POINTS {
            return false;
        }

        let points = std::mem::take(&mut self.current_line);
        self.undo_stack.push(Stroke::new(points, self.color));
        self.redo_stack.clear();
        true
    }

    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(stroke) => {
                self.redo_stack.push(stroke);
                info!("{} performed undo", self.owner);
                true
            }
            None => {
                info!("{} undo stack empty", self.owner);
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(stroke) => {
                self.undo_stack.push(stroke);
                info!("{} performed redo", self.owner);
                true
            }
            None => {
                info!("{} redo stack empty", self.owner);
                false
            }
        }
    }

    /// Remove every committed point within `radius` of `center`, splitting
    /// strokes around the gap and dropping pieces too short to draw.
    ///
    /// Returns the number of points that fell inside the eraser.
    pub fn erase(&mut self, center: Point, radius: i32) -> usize {
        let radius_sq = i64::from(radius) * i64::from(radius);
        let mut erased = 0;
        let mut pieces = Vec::with_capacity(self.undo_stack.len());

        for Stroke { points, color } in self.undo_stack.drain(..) {
            let mut segment = Vec::with_capacity(points.len());
            for point in points {
                if point.distance_squared(center) >= radius_sq {
                    segment.push(point);
                } else {
                    erased += 1;
                    flush_segment(&mut pieces, &mut segment, color);
                }
            }
            flush_segment(&mut pieces, &mut segment, color);
        }

        self.undo_stack = pieces;
        if erased > 0 {
            debug!("{} lost {} points to eraser at {}", self.owner, erased, center);
        }
        erased
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        info!("{} cleared canvas", self.owner);
    }

    pub fn set_color(&mut self, color: Rgb) {
        self.color = color;
        info!("{} changed color to {}", self.owner, color);
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        info!("{} changed tool to {}", self.owner, tool);
    }
}

fn flush_segment(out: &mut Vec<Stroke>, segment: &mut Vec<Point>, color: Rgb) {
    let points = std::mem::take(segment);
    if points.len() >= MIN_STROKE_POINTS {
        out.push(Stroke::new(points, color));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceState {
        DeviceState::new("/dev/input/event3", "Test Mouse", "user1", Role::Participant, Point::new(0, 0), Rgb::BLACK, 5)
    }

    fn horizontal(xs: &[i32], y: i32) -> Vec<Point> {
        xs.iter().map(|&x| Point::new(x, y)).collect()
    }

    fn draw(state: &mut DeviceState, points: &[Point]) {
        for &point in points {
            state.add_to_current_line(point);
        }
        assert!(state.commit_line());
    }

    #[test]
    fn test_commit_clears_redo_stack() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 1, 2], 50));
        assert!(state.undo());
        assert_eq!(state.redo_stack.len(), 1);

        draw(&mut state, &horizontal(&[5, 6], 50));
        assert!(state.redo_stack.is_empty());
        assert_eq!(state.undo_stack.len(), 1);
        assert!(state.current_line.is_empty());
    }

    #[test]
    fn test_short_commit_is_noop() {
        let mut state = device();
        assert!(!state.commit_line());

        draw(&mut state, &horizontal(&[0, 1], 50));
        state.undo();
        state.add_to_current_line(Point::new(9, 9));
        assert!(!state.commit_line());
        assert_eq!(state.current_line, vec![Point::new(9, 9)]);
        assert_eq!(state.redo_stack.len(), 1);
        assert!(state.undo_stack.is_empty());
    }

    #[test]
    fn test_commit_records_color_at_commit_time() {
        let mut state = device();
        state.set_color(Rgb::GREEN);
        draw(&mut state, &horizontal(&[0, 1], 50));
        assert_eq!(state.undo_stack[0].color, Rgb::GREEN);
    }

    #[test]
    fn test_undo_redo_restore_same_stroke() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 1], 50));
        state.set_color(Rgb::RED);
        draw(&mut state, &horizontal(&[3, 4, 5], 60));
        let before = state.undo_stack.clone();

        assert!(state.undo());
        assert!(state.redo());
        assert_eq!(state.undo_stack, before);
        assert!(state.redo_stack.is_empty());
    }

    #[test]
    fn test_undo_redo_on_empty_stacks() {
        let mut state = device();
        assert!(!state.undo());
        assert!(!state.redo());
    }

    #[test]
    fn test_erase_splits_stroke_in_two() {
        let mut state = device();
        draw(&mut state, &horizontal(&[100, 104, 108, 112, 116], 50));

        let erased = state.erase(Point::new(108, 50), 3);
        assert_eq!(erased, 1);
        assert_eq!(state.undo_stack, vec![
            Stroke::new(horizontal(&[100, 104], 50), Rgb::BLACK),
            Stroke::new(horizontal(&[112, 116], 50), Rgb::BLACK),
        ]);
    }

    #[test]
    fn test_erase_with_default_radius_keeps_outer_pieces() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 4, 8, 12, 16, 20, 24, 28, 32], 50));

        state.erase(Point::new(16, 50), 10);
        assert_eq!(state.undo_stack.len(), 2);
        assert_eq!(state.undo_stack[0].points, horizontal(&[0, 4], 50));
        assert_eq!(state.undo_stack[1].points, horizontal(&[28, 32], 50));
    }

    #[test]
    fn test_erase_drops_isolated_points() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 12, 24], 50));

        state.erase(Point::new(12, 50), 10);
        assert!(state.undo_stack.is_empty());
    }

    #[test]
    fn test_erase_preserves_order_and_colors() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 1, 2], 10));
        state.set_color(Rgb::RED);
        draw(&mut state, &horizontal(&[0, 50, 100, 150, 200], 300));
        state.set_color(Rgb::BLUE);
        draw(&mut state, &horizontal(&[0, 1, 2], 500));

        state.erase(Point::new(100, 300), 10);

        let colors: Vec<Rgb> = state.undo_stack.iter().map(|s| s.color).collect();
        assert_eq!(colors, vec![Rgb::BLACK, Rgb::RED, Rgb::RED, Rgb::BLUE]);
        assert!(state.undo_stack.iter().all(|s| s.len() >= MIN_STROKE_POINTS));
    }

    #[test]
    fn test_erase_leaves_redo_stack_alone() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 1, 2], 50));
        state.undo();

        state.erase(Point::new(1, 50), 10);
        assert_eq!(state.redo_stack.len(), 1);
    }

    #[test]
    fn test_clear_wipes_both_stacks() {
        let mut state = device();
        draw(&mut state, &horizontal(&[0, 1], 50));
        draw(&mut state, &horizontal(&[2, 3], 50));
        state.undo();

        state.clear();
        assert!(state.undo_stack.is_empty());
        assert!(state.redo_stack.is_empty());
    }
}
