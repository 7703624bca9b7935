//! Geometry used by LOD selection and culling

pub mod aabb;
pub mod rect;
pub mod frustum;

pub use aabb::Aabb;
pub use rect::Rect;
pub use frustum::{Plane, Frustum};
