//! Quadtree LOD selection and per-frame leaf output

pub mod chunk;
pub mod quadtree;
pub mod culling;
pub mod buffers;

pub use chunk::{GpuChunkData, LeafChunk, NeighborDir};
pub use quadtree::{ChunkResidency, TerrainLodManager};
pub use culling::LeafCuller;
pub use buffers::TerrainGpuBuffers;
