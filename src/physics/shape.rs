//! Collision heightfields fed by the physics streamer

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::{Mat4, Vec2, Vec3};

/// Heightfield shared with a physics world
pub type SharedHeightfield = Arc<RwLock<HeightfieldShape>>;

/// Square grid of heights for one LOD-0 chunk
#[derive(Clone, Debug)]
pub struct HeightfieldShape {
    /// Samples per edge
    pub size: u32,
    /// Row-major heights (rows along +Z), world units
    pub heights: Vec<f32>,
    /// Places sample (0, 0) at the chunk's world corner
    pub transform: Mat4,
    /// Distance between adjacent samples
    pub cell_size: f32,
    /// Chunk currently held, if any
    pub chunk_index: Option<u32>,
    pub enabled: bool,
}

impl HeightfieldShape {
    pub fn new(size: u32, cell_size: f32) -> Self {
        Self {
            size,
            heights: vec![0.0; (size * size) as usize],
            transform: Mat4::IDENTITY,
            cell_size,
            chunk_index: None,
            enabled: false,
        }
    }

    pub fn shared(size: u32, cell_size: f32) -> SharedHeightfield {
        Arc::new(RwLock::new(Self::new(size, cell_size)))
    }

    /// Height of sample `(x, z)`
    pub fn height_at(&self, x: u32, z: u32) -> Option<f32> {
        if x >= self.size || z >= self.size {
            return None;
        }
        self.heights.get((z * self.size + x) as usize).copied()
    }

    /// Bilinear height at world XZ, if the point lies on this shape
    pub fn sample_world(&self, world_xz: Vec2) -> Option<f32> {
        if !self.enabled || self.size < 2 {
            return None;
        }
        let corner = self.transform.transform_point3(Vec3::ZERO);
        let local = (world_xz - Vec2::new(corner.x, corner.z)) / self.cell_size;
        let max = (self.size - 1) as f32;
        if local.x < 0.0 || local.y < 0.0 || local.x > max || local.y > max {
            return None;
        }

        let x0 = (local.x.floor() as u32).min(self.size - 2);
        let z0 = (local.y.floor() as u32).min(self.size - 2);
        let tx = local.x - x0 as f32;
        let tz = local.y - z0 as f32;

        let h00 = self.height_at(x0, z0)?;
        let h10 = self.height_at(x0 + 1, z0)?;
        let h01 = self.height_at(x0, z0 + 1)?;
        let h11 = self.height_at(x0 + 1, z0 + 1)?;
        let top = h00 + (h10 - h00) * tx;
        let bottom = h01 + (h11 - h01) * tx;
        Some(corner.y + top + (bottom - top) * tz)
    }
}

/// Read lock that survives a panicked writer
pub fn read_shape(shape: &SharedHeightfield) -> RwLockReadGuard<'_, HeightfieldShape> {
    shape.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write lock that survives a panicked writer
pub fn write_shape(shape: &SharedHeightfield) -> RwLockWriteGuard<'_, HeightfieldShape> {
    shape.write().unwrap_or_else(PoisonError::into_inner)
}
