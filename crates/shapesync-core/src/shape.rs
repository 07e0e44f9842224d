//! Shape rows and geometry helpers.

use serde::{Deserialize, Serialize};

use crate::identity::{Identity, Timestamp};

/// Unique identifier for shapes. Assigned at creation, never reused.
pub type ShapeId = u64;

/// The closed set of shape kinds the canvas understands.
///
/// Unknown kinds are unrepresentable; they are rejected wherever JSON is
/// parsed, before a request can reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
}

/// One row of the shape table.
///
/// Geometry is always stored as an axis-aligned bounding box regardless of
/// kind; circles derive their visual center and radius from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Display color, e.g. a hex code like `#ff0000`.
    pub color: String,
    pub rotation: f64,
    /// Identity of the creator. Immutable.
    pub created_by: Identity,
    /// Server-assigned creation time. Immutable.
    pub created_at: Timestamp,
}

impl Shape {
    /// Visual center of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Visual radius for circle rendering: half the smaller box dimension.
    pub fn radius(&self) -> f64 {
        self.width.min(self.height) / 2.0
    }
}

/// A partial update to a shape.
///
/// Each field is independently optional; fields left as `None` keep their
/// prior value when the patch is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

impl ShapePatch {
    /// True when no field is set; applying it would change nothing.
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.color.is_none()
            && self.rotation.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle() -> Shape {
        Shape {
            id: 1,
            kind: ShapeKind::Circle,
            x: 100.0,
            y: 100.0,
            width: 50.0,
            height: 50.0,
            color: "#ff0000".to_string(),
            rotation: 0.0,
            created_by: Identity::generate(),
            created_at: Timestamp(0),
        }
    }

    #[test]
    fn test_circle_derivation() {
        let shape = circle();
        assert_eq!(shape.center(), (125.0, 125.0));
        assert_eq!(shape.radius(), 25.0);
    }

    #[test]
    fn test_radius_uses_smaller_dimension() {
        let mut shape = circle();
        shape.width = 80.0;
        assert_eq!(shape.radius(), 25.0);
        shape.height = 40.0;
        assert_eq!(shape.radius(), 20.0);
    }

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ShapeKind::Rectangle).unwrap(),
            "\"rectangle\""
        );
        assert_eq!(serde_json::to_string(&ShapeKind::Circle).unwrap(), "\"circle\"");
        assert!(serde_json::from_str::<ShapeKind>("\"triangle\"").is_err());
    }

    #[test]
    fn test_patch_default_is_empty() {
        assert!(ShapePatch::default().is_empty());
        let patch = ShapePatch {
            color: Some("#00ff00".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
