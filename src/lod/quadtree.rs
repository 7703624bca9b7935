//! Quadtree LOD selection.
//!
//! Each frame the tree is walked breadth-first from the single root chunk.
//! A chunk splits when the camera square for its LOD overlaps its footprint,
//! but only if all four children are already resident. Otherwise the chunk
//! itself is drawn, so the selected leaves always tile the whole terrain
//! with resident data.

use std::sync::Arc;

use glam::{UVec2, Vec2, Vec3};

use crate::core::LodConfig;
use crate::math::Rect;
use crate::terrain::TerrainData;
use super::chunk::{GpuChunkData, LeafChunk, NeighborDir};

/// Where chunk textures live, as seen by LOD selection
pub trait ChunkResidency {
    /// Report whether the chunk is resident, asking for it if not.
    fn request_chunk(&mut self, chunk_index: u32) -> bool;

    /// Atlas grid coordinate of a resident chunk
    fn slot_coord(&self, chunk_index: u32) -> Option<UVec2>;
}

/// Selects the leaf chunks to draw each frame
pub struct TerrainLodManager {
    terrain: Arc<TerrainData>,
    config: LodConfig,
    /// World position of terrain texel (0, 0) at height 0
    origin: Vec3,
    leaves: Vec<LeafChunk>,
    chunk_data: Vec<GpuChunkData>,
    /// Leaf index per LOD-0 cell, -1 when uncovered
    sector_map: Vec<i32>,
    sectors_per_row: u32,
    current: Vec<(u32, u32)>,
    next: Vec<(u32, u32)>,
}

impl TerrainLodManager {
    pub fn new(terrain: Arc<TerrainData>, config: LodConfig, origin: Vec3) -> Self {
        let sectors_per_row = terrain.chunks_per_row(0);
        Self {
            sector_map: vec![-1; (sectors_per_row * sectors_per_row) as usize],
            sectors_per_row,
            leaves: Vec::new(),
            chunk_data: Vec::new(),
            current: Vec::new(),
            next: Vec::new(),
            terrain,
            config,
            origin,
        }
    }

    /// Rebuild the leaf set for `camera`.
    ///
    /// Requests every chunk it would like to draw from `residency`; chunks
    /// that are not resident yet are replaced by their resident parent.
    pub fn update<R: ChunkResidency + ?Sized>(&mut self, camera: Vec3, residency: &mut R) {
        self.leaves.clear();
        self.chunk_data.clear();
        self.sector_map.fill(-1);

        let max_lod = self.terrain.max_lod();
        let root = self.terrain.chunk_index(max_lod, 0, 0);
        if !residency.request_chunk(root) {
            log::trace!("Terrain root chunk not resident yet");
            return;
        }

        let camera_xz = Vec2::new(camera.x, camera.z);
        self.current.clear();
        self.current.push((0, 0));

        for lod in (0..=max_lod).rev() {
            self.next.clear();
            let mut current = std::mem::take(&mut self.current);

            for &(x, z) in &current {
                let mut split = self.should_split(lod, x, z, camera_xz);
                if split {
                    // Every child is requested, even after one turns out missing
                    for (cx, cz) in children(x, z) {
                        let child = self.terrain.chunk_index(lod - 1, cx, cz);
                        split &= residency.request_chunk(child);
                    }
                }

                if split {
                    self.next.extend(children(x, z));
                } else {
                    self.emit_leaf(lod, x, z, residency);
                }
            }

            current.clear();
            self.current = current;
            std::mem::swap(&mut self.current, &mut self.next);
            if self.current.is_empty() {
                break;
            }
        }

        self.compute_neighbor_diffs();
        self.chunk_data.extend(self.leaves.iter().map(LeafChunk::to_gpu));
        log::trace!("Selected {} terrain leaves", self.leaves.len());
    }

    fn should_split(&self, lod: u32, x: u32, z: u32, camera_xz: Vec2) -> bool {
        if lod == 0 || lod <= self.config.min_lod {
            return false;
        }
        if self.config.max_lod.is_some_and(|ceiling| lod > ceiling) {
            return true;
        }
        let camera_square = Rect::from_center_half_size(camera_xz, self.config.lod_distance(lod));
        self.footprint(lod, x, z).intersects(&camera_square)
    }

    /// World XZ rectangle covered by a chunk
    pub fn footprint(&self, lod: u32, x: u32, z: u32) -> Rect {
        let size = self.terrain.chunk_world_size(lod);
        let min = Vec2::new(self.origin.x, self.origin.z) + Vec2::new(x as f32, z as f32) * size;
        Rect::new(min, min + Vec2::splat(size))
    }

    fn emit_leaf<R: ChunkResidency + ?Sized>(&mut self, lod: u32, x: u32, z: u32, residency: &R) {
        let chunk_index = self.terrain.chunk_index(lod, x, z);
        let Some(atlas_slot) = residency.slot_coord(chunk_index) else {
            log::error!("Leaf chunk {} (lod {}) has no atlas slot", chunk_index, lod);
            return;
        };
        let (min_height, max_height) = self
            .terrain
            .chunk(chunk_index)
            .map(|record| (record.min_height, record.max_height))
            .unwrap_or((0.0, self.terrain.header().max_height));

        let footprint = self.footprint(lod, x, z);
        let leaf_index = self.leaves.len() as i32;
        self.leaves.push(LeafChunk {
            lod,
            x,
            z,
            chunk_index,
            atlas_slot,
            world_origin: footprint.min,
            world_size: footprint.size().x,
            min_height: min_height + self.origin.y,
            max_height: max_height + self.origin.y,
            neighbor_lod_diff: [0; 4],
        });

        let span = 1u32 << lod;
        for sz in (z << lod)..((z << lod) + span) {
            let row = (sz * self.sectors_per_row) as usize;
            for sx in (x << lod)..((x << lod) + span) {
                self.sector_map[row + sx as usize] = leaf_index;
            }
        }
    }

    fn compute_neighbor_diffs(&mut self) {
        let row = self.sectors_per_row as i64;
        for i in 0..self.leaves.len() {
            let leaf = self.leaves[i];
            let span = 1i64 << leaf.lod;
            let x0 = (leaf.x as i64) << leaf.lod;
            let z0 = (leaf.z as i64) << leaf.lod;

            // A coarser neighbor spans the whole edge, so one cell decides
            let mut diffs = [0u8; 4];
            for dir in NeighborDir::ALL {
                let (sx, sz) = match dir {
                    NeighborDir::North => (x0, z0 - 1),
                    NeighborDir::South => (x0, z0 + span),
                    NeighborDir::East => (x0 + span, z0),
                    NeighborDir::West => (x0 - 1, z0),
                };
                if sx < 0 || sz < 0 || sx >= row || sz >= row {
                    continue;
                }
                let neighbor = self.sector_map[(sz * row + sx) as usize];
                if neighbor < 0 {
                    continue;
                }
                let neighbor_lod = self.leaves[neighbor as usize].lod;
                diffs[dir as usize] = neighbor_lod.saturating_sub(leaf.lod) as u8;
            }
            self.leaves[i].neighbor_lod_diff = diffs;
        }
    }

    pub fn leaves(&self) -> &[LeafChunk] {
        &self.leaves
    }

    /// GPU records parallel to [`TerrainLodManager::leaves`]
    pub fn chunk_data(&self) -> &[GpuChunkData] {
        &self.chunk_data
    }

    pub fn sector_map(&self) -> &[i32] {
        &self.sector_map
    }

    pub fn sectors_per_row(&self) -> u32 {
        self.sectors_per_row
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: LodConfig) {
        self.config = config;
    }

    pub fn terrain(&self) -> &Arc<TerrainData> {
        &self.terrain
    }
}

fn children(x: u32, z: u32) -> [(u32, u32); 4] {
    [
        (x * 2, z * 2),
        (x * 2 + 1, z * 2),
        (x * 2, z * 2 + 1),
        (x * 2 + 1, z * 2 + 1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::TerrainHeader;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    /// Residency backed by a set, recording every request
    #[derive(Default)]
    struct FakeResidency {
        resident: HashSet<u32>,
        requested: Vec<u32>,
        all: bool,
    }

    impl FakeResidency {
        fn everything() -> Self {
            Self {
                all: true,
                ..Default::default()
            }
        }

        fn with(chunks: impl IntoIterator<Item = u32>) -> Self {
            Self {
                resident: chunks.into_iter().collect(),
                ..Default::default()
            }
        }

        fn has(&self, chunk: u32) -> bool {
            self.all || self.resident.contains(&chunk)
        }
    }

    impl ChunkResidency for FakeResidency {
        fn request_chunk(&mut self, chunk_index: u32) -> bool {
            self.requested.push(chunk_index);
            self.has(chunk_index)
        }

        fn slot_coord(&self, chunk_index: u32) -> Option<UVec2> {
            self.has(chunk_index).then_some(UVec2::new(chunk_index, 0))
        }
    }

    /// 1024 texels, 256-texel chunks: 4x4, 2x2, 1x1
    fn terrain() -> Arc<TerrainData> {
        let header = TerrainHeader::new(256, 257, 1024, 1.0, 100.0, 2);
        Arc::new(TerrainData::with_contiguous_layout(header).expect("layout"))
    }

    fn config(distances: &[f32]) -> LodConfig {
        LodConfig {
            lod_distances: distances.to_vec(),
            min_lod: 0,
            max_lod: None,
        }
    }

    fn assert_no_gaps(manager: &TerrainLodManager) {
        let mut covered = vec![false; manager.sector_map().len()];
        let row = manager.sectors_per_row();
        for leaf in manager.leaves() {
            let span = 1 << leaf.lod;
            for sz in (leaf.z << leaf.lod)..(leaf.z << leaf.lod) + span {
                for sx in (leaf.x << leaf.lod)..(leaf.x << leaf.lod) + span {
                    let cell = (sz * row + sx) as usize;
                    assert!(!covered[cell], "cell ({}, {}) covered twice", sx, sz);
                    covered[cell] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c), "terrain has uncovered cells");
        assert!(manager.sector_map().iter().all(|&s| s >= 0));
    }

    #[test]
    fn test_nothing_emitted_without_root() {
        let terrain = terrain();
        let mut manager = TerrainLodManager::new(terrain.clone(), config(&[128.0]), Vec3::ZERO);
        let mut residency = FakeResidency::default();

        manager.update(Vec3::new(512.0, 0.0, 512.0), &mut residency);
        assert!(manager.leaves().is_empty());
        assert_eq!(residency.requested, vec![terrain.chunk_index(2, 0, 0)]);
        assert!(manager.sector_map().iter().all(|&s| s == -1));
    }

    #[test]
    fn test_single_root_leaf_until_children_resident() {
        let terrain = terrain();
        let root = terrain.chunk_index(2, 0, 0);
        let mut manager = TerrainLodManager::new(terrain.clone(), config(&[128.0, 256.0, 512.0]), Vec3::ZERO);
        let mut residency = FakeResidency::with([root]);

        manager.update(Vec3::new(512.0, 0.0, 512.0), &mut residency);

        assert_eq!(manager.leaves().len(), 1);
        let leaf = manager.leaves()[0];
        assert_eq!((leaf.lod, leaf.x, leaf.z), (2, 0, 0));
        assert_eq!(leaf.world_size, 1024.0);
        assert_eq!(leaf.neighbor_lod_diff, [0; 4]);

        // All four children were asked for
        let children: HashSet<u32> = (0..4).map(|i| terrain.chunk_index_linear(1, i)).collect();
        let requested: HashSet<u32> = residency.requested.iter().copied().collect();
        assert!(children.is_subset(&requested));
        assert_no_gaps(&manager);
    }

    #[test]
    fn test_min_lod_keeps_root() {
        let terrain = terrain();
        let mut lod_config = config(&[128.0, 256.0, 4096.0]);
        lod_config.min_lod = 2;
        let mut manager = TerrainLodManager::new(terrain, lod_config, Vec3::ZERO);
        let mut residency = FakeResidency::everything();

        manager.update(Vec3::new(512.0, 0.0, 512.0), &mut residency);

        assert_eq!(manager.leaves().len(), 1);
        assert_eq!(manager.leaves()[0].lod, 2);
        assert_eq!(residency.requested.len(), 1);
    }

    #[test]
    fn test_partial_children_block_split() {
        let terrain = terrain();
        let root = terrain.chunk_index(2, 0, 0);
        // Three of four children resident
        let resident = [root, terrain.chunk_index(1, 0, 0), terrain.chunk_index(1, 1, 0), terrain.chunk_index(1, 0, 1)];
        let mut manager = TerrainLodManager::new(terrain, config(&[2048.0]), Vec3::ZERO);
        let mut residency = FakeResidency::with(resident);

        manager.update(Vec3::new(100.0, 0.0, 100.0), &mut residency);
        assert_eq!(manager.leaves().len(), 1);
        assert_eq!(manager.leaves()[0].lod, 2);
    }

    #[test]
    fn test_far_camera_keeps_root() {
        let terrain = terrain();
        let mut manager = TerrainLodManager::new(terrain, config(&[64.0]), Vec3::ZERO);
        let mut residency = FakeResidency::everything();

        manager.update(Vec3::new(-5000.0, 0.0, -5000.0), &mut residency);
        assert_eq!(manager.leaves().len(), 1);
        assert_eq!(manager.leaves()[0].lod, 2);
    }

    #[test]
    fn test_max_lod_ceiling_forces_split() {
        let terrain = terrain();
        let mut lod_config = config(&[64.0]);
        lod_config.max_lod = Some(1);
        let mut manager = TerrainLodManager::new(terrain, lod_config, Vec3::ZERO);
        let mut residency = FakeResidency::everything();

        manager.update(Vec3::new(-5000.0, 0.0, -5000.0), &mut residency);
        assert_eq!(manager.leaves().len(), 4);
        assert!(manager.leaves().iter().all(|leaf| leaf.lod == 1));
        assert_no_gaps(&manager);
    }

    #[test]
    fn test_neighbor_lod_differences() {
        let terrain = terrain();
        let mut manager = TerrainLodManager::new(terrain, config(&[1.0]), Vec3::ZERO);
        let mut residency = FakeResidency::everything();

        // Only the (0, 0) quadrant refines to LOD 0
        manager.update(Vec3::new(10.0, 0.0, 10.0), &mut residency);
        assert_eq!(manager.leaves().len(), 7);
        assert_no_gaps(&manager);

        let find = |lod: u32, x: u32, z: u32| {
            *manager
                .leaves()
                .iter()
                .find(|l| (l.lod, l.x, l.z) == (lod, x, z))
                .expect("leaf")
        };

        // [north, south, east, west]
        assert_eq!(find(0, 0, 0).neighbor_lod_diff, [0, 0, 0, 0]);
        assert_eq!(find(0, 1, 0).neighbor_lod_diff, [0, 0, 1, 0]);
        assert_eq!(find(0, 0, 1).neighbor_lod_diff, [0, 1, 0, 0]);
        assert_eq!(find(0, 1, 1).neighbor_lod_diff, [0, 1, 1, 0]);
        // Finer neighbors never produce a difference
        assert_eq!(find(1, 1, 0).neighbor_lod_diff, [0, 0, 0, 0]);
        assert_eq!(find(1, 0, 1).neighbor_lod_diff, [0, 0, 0, 0]);
        assert_eq!(find(1, 1, 1).neighbor_lod_diff, [0, 0, 0, 0]);
    }

    #[test]
    fn test_origin_offsets_footprints() {
        let terrain = terrain();
        let origin = Vec3::new(-512.0, 10.0, -512.0);
        let mut manager = TerrainLodManager::new(terrain, config(&[64.0]), origin);
        let mut residency = FakeResidency::everything();

        manager.update(Vec3::new(-5000.0, 0.0, -5000.0), &mut residency);
        let leaf = manager.leaves()[0];
        assert_eq!(leaf.world_origin, Vec2::new(-512.0, -512.0));
        assert_eq!(leaf.min_height, 10.0);
        assert_eq!(manager.footprint(1, 1, 1).min, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_chunk_data_parallel_to_leaves() {
        let terrain = terrain();
        let mut manager = TerrainLodManager::new(terrain, config(&[1.0]), Vec3::ZERO);
        let mut residency = FakeResidency::everything();
        manager.update(Vec3::new(10.0, 0.0, 10.0), &mut residency);

        assert_eq!(manager.chunk_data().len(), manager.leaves().len());
        for (leaf, gpu) in manager.leaves().iter().zip(manager.chunk_data()) {
            assert_eq!(*gpu, leaf.to_gpu());
        }
    }

    #[test]
    fn test_no_gaps_under_random_cameras_and_residency() {
        let header = TerrainHeader::new(16, 17, 256, 2.0, 100.0, 4);
        let terrain = Arc::new(TerrainData::with_contiguous_layout(header).expect("layout"));
        let mut manager = TerrainLodManager::new(terrain.clone(), config(&[40.0, 80.0, 160.0]), Vec3::ZERO);
        let mut rng = StdRng::seed_from_u64(42);
        let world = terrain.world_size();
        let mut camera = Vec3::new(world * 0.5, 0.0, world * 0.5);

        for _ in 0..200 {
            camera.x = (camera.x + rng.random_range(-40.0..40.0)).clamp(-100.0, world + 100.0);
            camera.z = (camera.z + rng.random_range(-40.0..40.0)).clamp(-100.0, world + 100.0);

            let mut residency = FakeResidency::default();
            residency.resident.insert(terrain.chunk_index(terrain.max_lod(), 0, 0));
            for index in 0..terrain.chunk_count() as u32 {
                if rng.random_bool(0.7) {
                    residency.resident.insert(index);
                }
            }

            manager.update(camera, &mut residency);
            assert_no_gaps(&manager);
            for leaf in manager.leaves() {
                assert!(residency.has(leaf.chunk_index));
                assert!(leaf.neighbor_lod_diff.iter().all(|&d| d <= 4));
            }
        }
    }
}
