//! Terrain asset format, providers and offline baking

pub mod data;
pub mod provider;
pub mod bake;
pub mod generator;

pub use data::{
    TerrainData, TerrainHeader, ChunkRecord, PayloadKind,
    TERRAIN_DATA_VERSION,
};
pub use provider::{
    TerrainDataProvider, FileTerrainProvider, PackedTerrainProvider,
    BlobStream, ReadSeek, open_provider,
};
pub use bake::{BakeSettings, TerrainAsset, TerrainBaker};
pub use generator::{NoiseHeightfield, NoiseParams};
