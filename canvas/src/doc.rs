//! Document model: shapes, their properties, and the in-memory store.
//!
//! This module defines what lives on a canvas (`Shape`, `ShapeKind`), a
//! sparse-update type for incremental edits (`PartialShape`), a typed accessor
//! for the open-ended `props` JSON bag (`Props`), and the store that owns all
//! live shapes (`DocStore`).
//!
//! The server keeps one `DocStore` per live board as the authoritative copy.
//! Clients keep one as the confirmed base of their optimistic view (see
//! [`crate::sync`]).

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a shape, board, group, client, or user.
pub type ObjectId = Uuid;

/// The kind of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Axis-aligned rectangle.
    Rect,
    /// Ellipse inscribed within the bounding box.
    Ellipse,
    /// Diamond with vertices at bounding-box edge midpoints.
    Diamond,
    /// Five-point star inscribed within the bounding box.
    Star,
    /// Straight segment; endpoints live in `props` or span the box diagonal.
    Line,
    /// Line with an arrowhead at its second endpoint.
    Arrow,
    /// Free text block.
    Text,
    /// Titled container region.
    Frame,
}

impl ShapeKind {
    /// Edge kinds are hit-tested against their segment, not their box.
    #[must_use]
    pub fn is_edge(self) -> bool {
        matches!(self, Self::Line | Self::Arrow)
    }

    /// Wire and storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Ellipse => "ellipse",
            Self::Diamond => "diamond",
            Self::Star => "star",
            Self::Line => "line",
            Self::Arrow => "arrow",
            Self::Text => "text",
            Self::Frame => "frame",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown shape kind: {0}")]
pub struct UnknownShapeKind(pub String);

impl std::str::FromStr for ShapeKind {
    type Err = UnknownShapeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rect" => Ok(Self::Rect),
            "ellipse" => Ok(Self::Ellipse),
            "diamond" => Ok(Self::Diamond),
            "star" => Ok(Self::Star),
            "line" => Ok(Self::Line),
            "arrow" => Ok(Self::Arrow),
            "text" => Ok(Self::Text),
            "frame" => Ok(Self::Frame),
            other => Err(UnknownShapeKind(other.to_owned())),
        }
    }
}

/// A shape as stored in the document and sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ObjectId,
    pub board_id: ObjectId,
    pub kind: ShapeKind,
    /// Left edge of the bounding box in world coordinates.
    pub x: f64,
    /// Top edge of the bounding box in world coordinates.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Clockwise rotation in degrees around the bounding-box center.
    pub rotation: f64,
    /// Stacking order; lower values are drawn beneath higher values.
    pub z_index: i64,
    /// Open-ended style bag (fill, stroke, text, endpoints...).
    #[serde(default = "empty_props")]
    pub props: serde_json::Value,
    #[serde(default)]
    pub group_id: Option<ObjectId>,
    #[serde(default)]
    pub created_by: Option<ObjectId>,
    /// Server-assigned edit counter. Strictly increases on every accepted write.
    pub version: i64,
}

fn empty_props() -> serde_json::Value {
    serde_json::json!({})
}

/// Sparse update for a shape. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialShape {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Props keys to merge or remove (null values delete keys).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<serde_json::Value>,
    /// `Some(None)` clears the group, `Some(Some(id))` sets it.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub group_id: Option<Option<ObjectId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl PartialShape {
    /// True when the update carries no field at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Build a partial from a flat JSON map, picking only known geometry and
    /// style keys. Unknown keys are ignored.
    #[must_use]
    pub fn from_map(map: &HashMap<String, serde_json::Value>) -> Self {
        let f = |key: &str| map.get(key).and_then(serde_json::Value::as_f64);
        let group_id = match map.get("group_id") {
            None => None,
            Some(v) if v.is_null() => Some(None),
            Some(v) => parse_id(v).map(Some),
        };
        Self {
            x: f("x"),
            y: f("y"),
            width: f("width"),
            height: f("height"),
            rotation: f("rotation"),
            z_index: map.get("z_index").and_then(serde_json::Value::as_i64),
            props: map.get("props").cloned(),
            group_id,
            version: None,
        }
    }
}

/// Parse a JSON string holding a UUID.
#[must_use]
pub fn parse_id(value: &serde_json::Value) -> Option<ObjectId> {
    match value.as_str()?.parse::<ObjectId>() {
        Ok(id) => Some(id),
        Err(_) => None,
    }
}

/// Distinguishes an absent `group_id` from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Typed access to common props fields from a `Shape.props` JSON value.
pub struct Props<'a> {
    value: &'a serde_json::Value,
}

impl<'a> Props<'a> {
    #[must_use]
    pub fn new(value: &'a serde_json::Value) -> Self {
        Self { value }
    }

    /// Fill color as a CSS color string. Defaults to `"#D94B4B"`.
    #[must_use]
    pub fn fill(&self) -> &str {
        self.value
            .get("fill")
            .and_then(|v| v.as_str())
            .unwrap_or("#D94B4B")
    }

    /// Stroke color as a CSS color string. Defaults to `"#1F1A17"`.
    #[must_use]
    pub fn stroke(&self) -> &str {
        self.value
            .get("stroke")
            .and_then(|v| v.as_str())
            .unwrap_or("#1F1A17")
    }

    /// Stroke width in world units. Defaults to `1.0`.
    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        self.value
            .get("stroke_width")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0)
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.value
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// Font size in world units. Defaults to `16.0`.
    #[must_use]
    pub fn font_size(&self) -> f64 {
        self.value
            .get("font_size")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(16.0)
    }

    /// Edge endpoints `(x1, y1, x2, y2)` relative to the shape origin, if all
    /// four are present.
    #[must_use]
    pub fn endpoints(&self) -> Option<(f64, f64, f64, f64)> {
        let get = |key: &str| self.value.get(key).and_then(serde_json::Value::as_f64);
        Some((get("x1")?, get("y1")?, get("x2")?, get("y2")?))
    }
}

/// Merge a props patch into an existing props object. Null values delete keys.
/// Returns false if the patch is not a JSON object.
pub fn merge_props(target: &mut serde_json::Value, patch: &serde_json::Value) -> bool {
    let Some(incoming) = patch.as_object() else {
        return false;
    };
    if !target.is_object() {
        *target = empty_props();
    }
    if let Some(existing) = target.as_object_mut() {
        for (k, v) in incoming {
            if v.is_null() {
                existing.remove(k);
            } else {
                existing.insert(k.clone(), v.clone());
            }
        }
    }
    true
}

/// Apply a partial update to a shape in place. Returns false (and leaves the
/// shape untouched) when the props patch is not an object.
pub fn apply_partial_to(shape: &mut Shape, partial: &PartialShape) -> bool {
    if let Some(props) = &partial.props {
        if !props.is_object() {
            return false;
        }
    }
    if let Some(x) = partial.x {
        shape.x = x;
    }
    if let Some(y) = partial.y {
        shape.y = y;
    }
    if let Some(w) = partial.width {
        shape.width = w;
    }
    if let Some(h) = partial.height {
        shape.height = h;
    }
    if let Some(r) = partial.rotation {
        shape.rotation = r;
    }
    if let Some(z) = partial.z_index {
        shape.z_index = z;
    }
    if let Some(group_id) = partial.group_id {
        shape.group_id = group_id;
    }
    if let Some(v) = partial.version {
        shape.version = v;
    }
    if let Some(props) = &partial.props {
        merge_props(&mut shape.props, props);
    }
    true
}

/// In-memory store of shapes.
#[derive(Debug, Clone, Default)]
pub struct DocStore {
    shapes: HashMap<ObjectId, Shape>,
}

impl DocStore {
    #[must_use]
    pub fn new() -> Self {
        Self { shapes: HashMap::new() }
    }

    /// Insert or replace a shape.
    pub fn insert(&mut self, shape: Shape) {
        self.shapes.insert(shape.id, shape);
    }

    pub fn remove(&mut self, id: &ObjectId) -> Option<Shape> {
        self.shapes.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.shapes.contains_key(id)
    }

    /// Apply a partial update to an existing shape. Returns false if the shape
    /// doesn't exist or the props patch is malformed.
    pub fn apply_partial(&mut self, id: &ObjectId, partial: &PartialShape) -> bool {
        let Some(shape) = self.shapes.get_mut(id) else {
            return false;
        };
        apply_partial_to(shape, partial)
    }

    /// Replace all shapes with a full snapshot.
    pub fn load_snapshot(&mut self, shapes: Vec<Shape>) {
        self.shapes.clear();
        for shape in shapes {
            self.shapes.insert(shape.id, shape);
        }
    }

    /// All shapes sorted by `(z_index, id)` for draw order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&Shape> {
        let mut shapes: Vec<&Shape> = self.shapes.values().collect();
        shapes.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        shapes
    }

    /// Ids of every shape carrying `group_id`, in draw order.
    #[must_use]
    pub fn ids_in_group(&self, group_id: ObjectId) -> Vec<ObjectId> {
        self.sorted()
            .into_iter()
            .filter(|s| s.group_id == Some(group_id))
            .map(|s| s.id)
            .collect()
    }

    /// Highest z-index in the store, or `None` when empty.
    #[must_use]
    pub fn max_z_index(&self) -> Option<i64> {
        self.shapes.values().map(|s| s.z_index).max()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}
