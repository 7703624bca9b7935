//! Terrastream - heightfield terrain streaming
//!
//! Chunked multi-LOD terrain assets are streamed from disk on background
//! threads into a GPU texture atlas and into collision heightfields, while a
//! quadtree picks the resident chunks to draw each frame.

pub mod core;
pub mod math;
pub mod terrain;
pub mod streaming;
pub mod atlas;
pub mod lod;
pub mod physics;
pub mod system;

pub use system::TerrainSystem;
