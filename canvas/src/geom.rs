//! Geometry: bounding boxes, point hit-testing, and marquee selection.
//!
//! All inputs and outputs are in world coordinates unless a function takes a
//! [`Camera`], in which case screen-space tolerances are converted through it.

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;

use serde::{Deserialize, Serialize};

use crate::camera::{Camera, Point};
use crate::consts::EDGE_HIT_SLOP_PX;
use crate::doc::{DocStore, ObjectId, Props, Shape, ShapeKind};
use crate::group;

/// Axis-aligned rectangle with non-negative size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Build a rectangle, flipping negative extents so the size is non-negative.
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        let (x, width) = if width < 0.0 { (x + width, -width) } else { (x, width) };
        let (y, height) = if height < 0.0 { (y + height, -height) } else { (y, height) };
        Self { x, y, width, height }
    }

    /// Rectangle spanning two arbitrary corners (e.g. marquee drag start/end).
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x - a.x, b.y - a.y)
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Closed-interval overlap test; touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right() && other.x <= self.right() && self.y <= other.bottom() && other.y <= self.bottom()
    }

    #[must_use]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x && other.y >= self.y && other.right() <= self.right() && other.bottom() <= self.bottom()
    }

    #[must_use]
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect { x, y, width: self.right().max(other.right()) - x, height: self.bottom().max(other.bottom()) - y }
    }

    /// Smallest rectangle containing every point. `None` for an empty slice.
    #[must_use]
    pub fn enclosing(points: &[Point]) -> Option<Rect> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect { x: min_x, y: min_y, width: max_x - min_x, height: max_y - min_y })
    }
}

/// How a marquee decides membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectMode {
    /// Any overlap with the shape's bounds selects it.
    #[default]
    Intersect,
    /// Only shapes entirely inside the marquee are selected.
    Contain,
}

fn rotate_about(p: Point, center: Point, degrees: f64) -> Point {
    if degrees == 0.0 {
        return p;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    Point::new(center.x + dx * cos - dy * sin, center.y + dx * sin + dy * cos)
}

fn local_box(shape: &Shape) -> Rect {
    Rect::new(shape.x, shape.y, shape.width, shape.height)
}

/// World-space endpoints of an edge shape, with rotation applied.
#[must_use]
pub fn edge_endpoints(shape: &Shape) -> (Point, Point) {
    let (a, b) = match Props::new(&shape.props).endpoints() {
        Some((x1, y1, x2, y2)) => (Point::new(shape.x + x1, shape.y + y1), Point::new(shape.x + x2, shape.y + y2)),
        None => (Point::new(shape.x, shape.y), Point::new(shape.x + shape.width, shape.y + shape.height)),
    };
    let center = local_box(shape).center();
    (rotate_about(a, center, shape.rotation), rotate_about(b, center, shape.rotation))
}

/// Axis-aligned world bounds of a shape, accounting for rotation.
#[must_use]
pub fn shape_bounds(shape: &Shape) -> Rect {
    if shape.kind.is_edge() {
        let (a, b) = edge_endpoints(shape);
        return Rect::from_corners(a, b);
    }
    let local = local_box(shape);
    if shape.rotation == 0.0 {
        return local;
    }
    let center = local.center();
    let corners = [
        Point::new(local.x, local.y),
        Point::new(local.right(), local.y),
        Point::new(local.right(), local.bottom()),
        Point::new(local.x, local.bottom()),
    ]
    .map(|p| rotate_about(p, center, shape.rotation));
    Rect::enclosing(&corners).unwrap_or(local)
}

/// Union of the bounds of every shape. `None` when the iterator is empty.
pub fn selection_bounds<'a>(shapes: impl IntoIterator<Item = &'a Shape>) -> Option<Rect> {
    shapes
        .into_iter()
        .map(shape_bounds)
        .reduce(|acc, r| acc.union(&r))
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 { 0.0 } else { (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0) };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

fn point_in_body(shape: &Shape, world_pt: Point) -> bool {
    let local = local_box(shape);
    // Undo the shape's rotation so the test runs against the unrotated box.
    let p = rotate_about(world_pt, local.center(), -shape.rotation);
    if !local.contains_point(p) {
        return false;
    }
    let c = local.center();
    let (rx, ry) = (local.width * 0.5, local.height * 0.5);
    if rx == 0.0 || ry == 0.0 {
        return true;
    }
    let nx = (p.x - c.x) / rx;
    let ny = (p.y - c.y) / ry;
    match shape.kind {
        ShapeKind::Ellipse => nx * nx + ny * ny <= 1.0,
        ShapeKind::Diamond => nx.abs() + ny.abs() <= 1.0,
        _ => true,
    }
}

/// Whether `world_pt` lies on `shape`. Edges use a screen-space slop so thin
/// lines stay clickable at any zoom.
#[must_use]
pub fn shape_contains(shape: &Shape, world_pt: Point, camera: &Camera) -> bool {
    if shape.kind.is_edge() {
        let (a, b) = edge_endpoints(shape);
        let half_stroke = Props::new(&shape.props).stroke_width() * 0.5;
        let tolerance = half_stroke.max(camera.screen_dist_to_world(EDGE_HIT_SLOP_PX));
        return distance_to_segment(world_pt, a, b) <= tolerance;
    }
    point_in_body(shape, world_pt)
}

/// Topmost shape under `world_pt`, if any.
#[must_use]
pub fn hit_test(world_pt: Point, doc: &DocStore, camera: &Camera) -> Option<ObjectId> {
    doc.sorted()
        .into_iter()
        .rev()
        .find(|shape| shape_contains(shape, world_pt, camera))
        .map(|shape| shape.id)
}

/// Shapes selected by a marquee, in draw order. Touching any member of a
/// group selects the whole group.
#[must_use]
pub fn box_select(doc: &DocStore, marquee: Rect, mode: SelectMode) -> Vec<ObjectId> {
    let hits: Vec<ObjectId> = doc
        .sorted()
        .into_iter()
        .filter(|shape| {
            let bounds = shape_bounds(shape);
            match mode {
                SelectMode::Intersect => marquee.intersects(&bounds),
                SelectMode::Contain => marquee.contains_rect(&bounds),
            }
        })
        .map(|shape| shape.id)
        .collect();
    group::expand_to_groups(doc, &hits)
}
