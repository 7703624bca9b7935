//! Per-frame orchestration of atlas, LOD selection and physics streaming

use std::path::Path;

use glam::Vec3;

use crate::atlas::{AtlasBackend, AtlasManager};
use crate::core::{Result, TerrainStreamingConfig};
use crate::lod::{LeafChunk, TerrainLodManager};
use crate::physics::PhysicsStreamer;
use crate::terrain::{open_provider, TerrainDataProvider};

/// Everything needed to stream and draw one terrain
pub struct TerrainSystem<B: AtlasBackend> {
    atlas: AtlasManager<B>,
    lod: TerrainLodManager,
    physics: Option<PhysicsStreamer>,
}

impl<B: AtlasBackend> TerrainSystem<B> {
    /// Build the system over `provider`. `origin` is the world position of
    /// terrain texel (0, 0) at height 0.
    pub fn new(
        provider: &dyn TerrainDataProvider,
        backend: B,
        config: &TerrainStreamingConfig,
        origin: Vec3,
    ) -> Result<Self> {
        config.validate()?;

        let atlas = AtlasManager::new(provider, backend, config.atlas.clone())?;
        let lod = TerrainLodManager::new(provider.terrain_data().clone(), config.lod.clone(), origin);
        let physics = if config.physics.enabled {
            Some(PhysicsStreamer::new(provider, config.physics.clone(), origin)?)
        } else {
            None
        };

        log::info!(
            "Terrain system ready: {} chunks, {} LODs, physics {}",
            provider.terrain_data().chunk_count(),
            provider.terrain_data().max_lod() + 1,
            if physics.is_some() { "on" } else { "off" }
        );
        Ok(Self { atlas, lod, physics })
    }

    /// Open the terrain asset at `path` and build the system over it.
    pub fn load(path: &Path, backend: B, config: &TerrainStreamingConfig, origin: Vec3) -> Result<Self> {
        let provider = open_provider(path)?;
        Self::new(provider.as_ref(), backend, config, origin)
    }

    /// Run one frame.
    ///
    /// Selection runs first so its requests are serviced by this frame's
    /// atlas update; newly resident chunks are picked up next frame.
    pub fn update(&mut self, camera: Vec3) {
        self.lod.update(camera, &mut self.atlas);
        self.atlas.update();
        if let Some(physics) = &mut self.physics {
            physics.update(camera);
        }
    }

    pub fn leaves(&self) -> &[LeafChunk] {
        self.lod.leaves()
    }

    pub fn atlas(&self) -> &AtlasManager<B> {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut AtlasManager<B> {
        &mut self.atlas
    }

    pub fn lod(&self) -> &TerrainLodManager {
        &self.lod
    }

    pub fn lod_mut(&mut self) -> &mut TerrainLodManager {
        &mut self.lod
    }

    pub fn physics(&self) -> Option<&PhysicsStreamer> {
        self.physics.as_ref()
    }

    /// Stop both streaming workers.
    pub fn dispose(&mut self) {
        self.atlas.dispose();
        if let Some(physics) = &mut self.physics {
            physics.dispose();
        }
    }
}
