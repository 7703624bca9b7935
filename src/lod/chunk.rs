//! Per-frame leaf records

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};

use crate::math::Aabb;

/// Edge of a leaf, in the order neighbor differences are stored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborDir {
    /// Toward -Z
    North = 0,
    /// Toward +Z
    South = 1,
    /// Toward +X
    East = 2,
    /// Toward -X
    West = 3,
}

impl NeighborDir {
    pub const ALL: [NeighborDir; 4] = [
        NeighborDir::North,
        NeighborDir::South,
        NeighborDir::East,
        NeighborDir::West,
    ];
}

/// A chunk selected for rendering this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafChunk {
    pub lod: u32,
    /// Chunk coordinate within its LOD grid (x, z)
    pub x: u32,
    pub z: u32,
    pub chunk_index: u32,
    /// Atlas grid coordinate holding the chunk's textures
    pub atlas_slot: UVec2,
    /// World XZ of the chunk's minimum corner
    pub world_origin: Vec2,
    pub world_size: f32,
    /// World height range of the chunk, terrain origin included
    pub min_height: f32,
    pub max_height: f32,
    /// How many LODs coarser each neighbor is (0 when finer, equal or at the terrain edge)
    pub neighbor_lod_diff: [u8; 4],
}

impl LeafChunk {
    pub fn bounds(&self) -> Aabb {
        Aabb::from_footprint(self.world_origin, self.world_size, self.min_height, self.max_height)
    }

    pub fn neighbor_diff(&self, dir: NeighborDir) -> u8 {
        self.neighbor_lod_diff[dir as usize]
    }

    pub fn to_gpu(&self) -> GpuChunkData {
        let [n, s, e, w] = self.neighbor_lod_diff;
        GpuChunkData {
            world_offset: self.world_origin.to_array(),
            world_size: self.world_size,
            lod: self.lod,
            atlas_slot: (self.atlas_slot.x & 0xFFFF) | (self.atlas_slot.y << 16),
            neighbor_lod_diff: n as u32 | (s as u32) << 8 | (e as u32) << 16 | (w as u32) << 24,
            min_height: self.min_height,
            max_height: self.max_height,
        }
    }
}

/// Leaf record as read by the terrain shaders (32 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuChunkData {
    pub world_offset: [f32; 2],
    pub world_size: f32,
    pub lod: u32,
    /// Atlas slot x (low 16 bits) and y (high 16 bits)
    pub atlas_slot: u32,
    /// North, south, east, west differences, 8 bits each from the low byte
    pub neighbor_lod_diff: u32,
    pub min_height: f32,
    pub max_height: f32,
}
