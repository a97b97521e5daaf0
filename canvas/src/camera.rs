//! Viewport transform between screen pixels and board coordinates.
//!
//! `screen = world * zoom + pan`. Screen points are CSS pixels measured from
//! the viewport's top-left corner; world points are what shapes store.

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use serde::{Deserialize, Serialize};

use crate::consts::{ZOOM_MAX, ZOOM_MIN};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Per-client view state. Never sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Screen offset of the world origin, in pixels.
    pub pan_x: f64,
    pub pan_y: f64,
    /// Pixels per world unit.
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    #[must_use]
    pub fn world_to_screen(&self, p: Point) -> Point {
        Point::new(p.x.mul_add(self.zoom, self.pan_x), p.y.mul_add(self.zoom, self.pan_y))
    }

    #[must_use]
    pub fn screen_to_world(&self, p: Point) -> Point {
        Point::new((p.x - self.pan_x) / self.zoom, (p.y - self.pan_y) / self.zoom)
    }

    /// Length of `pixels` on screen measured in world units. Used to keep
    /// hit slop constant while zoomed.
    #[must_use]
    pub fn screen_dist_to_world(&self, pixels: f64) -> f64 {
        pixels / self.zoom
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Scale the view by `factor` around `anchor` (a screen point), so the
    /// world point under the anchor stays put. Zoom is clamped to
    /// `ZOOM_MIN..=ZOOM_MAX`. Factors that are not finite and positive are
    /// ignored.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let pinned = self.screen_to_world(anchor);
        self.zoom = (self.zoom * factor).clamp(ZOOM_MIN, ZOOM_MAX);
        self.pan_x = pinned.x.mul_add(-self.zoom, anchor.x);
        self.pan_y = pinned.y.mul_add(-self.zoom, anchor.y);
    }
}
