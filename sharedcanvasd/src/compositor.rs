//! Rate-limited composition of every device's strokes into one layer.

use sharedcanvas_common::{Drawable, Point};
use std::time::{Duration, Instant};

use crate::registry::DeviceRegistry;
use crate::state::MIN_STROKE_POINTS;

/// Turns registry state into an ordered list of drawables, at most once
/// per refresh interval.
///
/// Committed strokes of every device come first (per device in commit
/// order), followed by every device's live stroke, so a stroke being drawn
/// is always on top.
pub struct CompositionEngine {
    refresh_interval: Duration,
    header_offset: i32,
    last_refresh: Option<Instant>,
    sequence: u64,
    drawables: Vec<Drawable>,
}

impl CompositionEngine {
    pub fn new(refresh_interval: Duration, header_offset: i32) -> Self {
        Self {
            refresh_interval,
            header_offset,
            last_refresh: None,
            sequence: 0,
            drawables: Vec::new(),
        }
    }

    /// Recompose if the refresh interval has elapsed.
    /// Returns true when a new layer was produced.
    pub fn refresh(&mut self, registry: &DeviceRegistry) -> bool {
        self.refresh_at(registry, Instant::now())
    }

    pub fn refresh_at(&mut self, registry: &DeviceRegistry, now: Instant) -> bool {
        if let Some(last) = self.last_refresh {
            if now.saturating_duration_since(last) < self.refresh_interval {
                return false;
            }
        }
        self.last_refresh = Some(now);

        let devices = registry.snapshot();
        self.drawables.clear();

        for device in &devices {
            for stroke in &device.undo_stack {
                if stroke.len() >= MIN_STROKE_POINTS {
                    let points = self.translate(&stroke.points);
                    self.drawables.push(Drawable { points, color: stroke.color, width: device.size });
                }
            }
        }

        for device in &devices {
            if device.current_line.len() >= MIN_STROKE_POINTS {
                let points = self.translate(&device.current_line);
                self.drawables.push(Drawable { points, color: device.color, width: device.size });
            }
        }

        self.sequence += 1;
        true
    }

    fn translate(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| p.offset_y(-self.header_offset)).collect()
    }

    /// Number of layers produced so far
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}
