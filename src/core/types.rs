//! Core type aliases and re-exports

pub use glam::{
    Vec2, Vec3, Vec4,
    Mat4,
    UVec2,
};

/// Standard Result type for terrain streaming
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
