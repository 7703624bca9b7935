//! Axis-aligned rectangle on the terrain (XZ) plane

use crate::core::types::Vec2;

/// Rectangle defined by min and max corners in world XZ
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Square centred on `center` with the given half-size
    pub fn from_center_half_size(center: Vec2, half_size: f32) -> Self {
        Self {
            min: center - Vec2::splat(half_size),
            max: center + Vec2::splat(half_size),
        }
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Closed-interval overlap test: touching edges count as intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }
}
