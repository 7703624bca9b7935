//! Collision chunk window around the camera.
//!
//! Keeps an N×N block of LOD-0 heightfields centred on the camera chunk.
//! Each window cell owns one shape; when the camera moves to a new chunk the
//! cells retarget and stream the new chunk's heightmap on a separate engine.
//! A completion that arrives after its cell moved on is dropped.

use std::sync::Arc;

use glam::{IVec2, Mat4, Vec3};

use crate::core::{PhysicsConfig, Result};
use crate::streaming::{PayloadKinds, StreamingEngine};
use crate::terrain::{TerrainData, TerrainDataProvider};
use super::shape::{read_shape, write_shape, HeightfieldShape, SharedHeightfield};

struct WindowCell {
    /// Chunk this cell should hold
    desired: Option<u32>,
    /// Chunk whose heights are in the shape
    loaded: Option<u32>,
    shape: SharedHeightfield,
}

/// Physics streaming counters
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhysicsStats {
    pub requests: u64,
    pub applied: u64,
    pub stale: u64,
    pub failed_reads: u64,
}

/// Streams collision heightfields for the chunks around the camera
pub struct PhysicsStreamer {
    config: PhysicsConfig,
    terrain: Arc<TerrainData>,
    engine: StreamingEngine<usize>,
    origin: Vec3,
    cells: Vec<WindowCell>,
    center: Option<IVec2>,
    scratch: Vec<f32>,
    stats: PhysicsStats,
}

impl PhysicsStreamer {
    pub fn new(provider: &dyn TerrainDataProvider, config: PhysicsConfig, origin: Vec3) -> Result<Self> {
        let engine = StreamingEngine::from_provider("physics", provider, config.request_pool_capacity)?;
        Ok(Self::with_engine(engine, config, origin))
    }

    pub fn with_engine(engine: StreamingEngine<usize>, config: PhysicsConfig, origin: Vec3) -> Self {
        let terrain = engine.terrain().clone();
        let header = *terrain.header();
        let cell_count = (config.window_size * config.window_size) as usize;
        let cells = (0..cell_count)
            .map(|_| WindowCell {
                desired: None,
                loaded: None,
                shape: HeightfieldShape::shared(header.chunk_texture_size, header.units_per_texel),
            })
            .collect();

        Self {
            config,
            terrain,
            engine,
            origin,
            cells,
            center: None,
            scratch: Vec::new(),
            stats: PhysicsStats::default(),
        }
    }

    /// Retarget the window to `camera` and apply finished chunks.
    pub fn update(&mut self, camera: Vec3) {
        if !self.config.enabled {
            return;
        }
        self.retarget(camera);
        self.apply_completions();
    }

    /// LOD-0 chunk coordinate under `camera` (may lie outside the terrain)
    pub fn camera_chunk(&self, camera: Vec3) -> IVec2 {
        let chunk_size = self.terrain.chunk_world_size(0);
        IVec2::new(
            ((camera.x - self.origin.x) / chunk_size).floor() as i32,
            ((camera.z - self.origin.z) / chunk_size).floor() as i32,
        )
    }

    /// Point every window cell at its chunk and request the ones that changed.
    pub fn retarget(&mut self, camera: Vec3) {
        let center = self.camera_chunk(camera);
        if self.center != Some(center) {
            log::debug!("Physics window centred on chunk ({}, {})", center.x, center.y);
            self.center = Some(center);
        }

        let n = self.config.window_size as i32;
        let half = n / 2;
        let per_row = self.terrain.chunks_per_row(0) as i32;

        for (cell_index, cell) in self.cells.iter_mut().enumerate() {
            let x = center.x + (cell_index as i32 % n) - half;
            let z = center.y + (cell_index as i32 / n) - half;
            let target = (x >= 0 && z >= 0 && x < per_row && z < per_row)
                .then(|| self.terrain.chunk_index(0, x as u32, z as u32));

            let Some(chunk_index) = target else {
                cell.desired = None;
                if cell.loaded.take().is_some() {
                    let mut shape = write_shape(&cell.shape);
                    shape.enabled = false;
                    shape.chunk_index = None;
                }
                continue;
            };

            if cell.loaded == Some(chunk_index) {
                // Back on a chunk we still hold; any in-flight read is stale now
                cell.desired = target;
            } else if cell.desired != target {
                if self.engine.request(PayloadKinds::HEIGHTMAP, chunk_index, cell_index) {
                    cell.desired = target;
                    self.stats.requests += 1;
                }
            }
        }
    }

    /// Convert finished heightmaps into their shapes. Returns how many were processed.
    pub fn apply_completions(&mut self) -> usize {
        let Self {
            config,
            terrain,
            engine,
            origin,
            cells,
            scratch,
            stats,
            ..
        } = self;
        let header = *terrain.header();
        let chunk_world_size = terrain.chunk_world_size(0);
        let texel_count = (header.chunk_texture_size * header.chunk_texture_size) as usize;

        engine.process_pending_completions(config.max_completions_per_frame, |completion, cell_index| {
            let chunk_index = completion.chunk_index();
            let Some(cell) = cells.get_mut(cell_index) else {
                return;
            };
            if cell.desired != Some(chunk_index) {
                log::trace!("Discarding stale physics chunk {} for cell {}", chunk_index, cell_index);
                stats.stale += 1;
                return;
            }

            let Some(bytes) = completion.try_get_heightmap() else {
                // Clearing `desired` makes the next retarget ask again
                log::warn!("Physics chunk {} failed to stream", chunk_index);
                cell.desired = None;
                stats.failed_reads += 1;
                return;
            };

            scratch.clear();
            scratch.extend(
                bytes
                    .chunks_exact(2)
                    .take(texel_count)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32 / u16::MAX as f32 * header.max_height),
            );

            let Some((_, x, z)) = terrain.chunk_coord(chunk_index) else {
                return;
            };
            let corner = *origin + Vec3::new(x as f32 * chunk_world_size, 0.0, z as f32 * chunk_world_size);

            {
                let mut shape = write_shape(&cell.shape);
                std::mem::swap(&mut shape.heights, scratch);
                shape.transform = Mat4::from_translation(corner);
                shape.chunk_index = Some(chunk_index);
                shape.enabled = true;
            }
            cell.loaded = Some(chunk_index);
            stats.applied += 1;
        })
    }

    /// Shapes of all window cells, row-major from the window's -X/-Z corner
    pub fn shapes(&self) -> impl Iterator<Item = &SharedHeightfield> {
        self.cells.iter().map(|cell| &cell.shape)
    }

    /// Chunks whose heights are currently in a shape
    pub fn loaded_chunks(&self) -> Vec<u32> {
        self.cells.iter().filter_map(|cell| cell.loaded).collect()
    }

    /// True when every cell holds the chunk it wants
    pub fn is_settled(&self) -> bool {
        self.cells.iter().all(|cell| cell.desired == cell.loaded)
    }

    /// Bilinear terrain height at world XZ from any loaded shape
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let point = glam::Vec2::new(x, z);
        self.shapes().find_map(|shape| read_shape(shape).sample_world(point))
    }

    pub fn center(&self) -> Option<IVec2> {
        self.center
    }

    pub fn in_flight(&self) -> usize {
        self.engine.in_flight()
    }

    pub fn stats(&self) -> PhysicsStats {
        self.stats
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Stop the streaming worker.
    pub fn dispose(&mut self) {
        self.engine.dispose();
    }
}
