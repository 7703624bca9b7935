//! GPU texture atlas for streamed terrain chunks

pub mod backend;
pub mod manager;

pub use backend::{atlas_extent, atlas_format, AtlasBackend, DeviceLostFlag, MemoryAtlasBackend, WgpuAtlasBackend};
pub use manager::{slot_coord, AtlasChunkSlot, AtlasManager, AtlasStats, SlotState, NO_ENTRY};
