//! Atlas slot residency
//!
//! Fixed grid of slots shared by the three atlas textures. A chunk is
//! requested by the quadtree, gets a slot when one is free, streams in on
//! the worker, and becomes resident once all payloads are uploaded:
//!
//! ```text
//! Free --(pending pass)--> Loading --(completion uploaded)--> Resident
//!   ^                         |                                  |
//!   +------(read error)-------+------(stale, below low water)----+
//! ```

use std::sync::Arc;

use glam::UVec2;

use crate::core::{AtlasConfig, Result};
use crate::lod::ChunkResidency;
use crate::streaming::{PayloadKinds, StreamingEngine};
use crate::terrain::{PayloadKind, TerrainData, TerrainDataProvider};
use super::backend::AtlasBackend;

/// Sentinel for "no chunk" / "no slot"
pub const NO_ENTRY: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Loading,
    Resident,
}

/// One atlas slot
#[derive(Clone, Copy, Debug)]
pub struct AtlasChunkSlot {
    /// Chunk index held by this slot, or [`NO_ENTRY`]
    pub chunk: i32,
    /// Frame the chunk was last requested (or uploaded)
    pub last_active_frame: u64,
    pub state: SlotState,
}

impl Default for AtlasChunkSlot {
    fn default() -> Self {
        Self {
            chunk: NO_ENTRY,
            last_active_frame: 0,
            state: SlotState::Free,
        }
    }
}

/// Atlas counters, cumulative since creation or the last reset
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AtlasStats {
    pub requests: u64,
    pub hits: u64,
    pub uploads: u64,
    pub evictions: u64,
    pub discarded: u64,
    pub failed_reads: u64,
}

impl AtlasStats {
    pub fn hit_rate(&self) -> f32 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f32 / self.requests as f32
        }
    }
}

/// Maps terrain chunks to atlas slots and streams them in
pub struct AtlasManager<B: AtlasBackend> {
    config: AtlasConfig,
    terrain: Arc<TerrainData>,
    backend: B,
    engine: StreamingEngine<u32>,
    slots: Vec<AtlasChunkSlot>,
    /// Chunk index -> slot index, or [`NO_ENTRY`]
    chunk_to_slot: Vec<i32>,
    free_slots: Vec<u32>,
    /// Chunk indices waiting for a slot (LIFO)
    pending: Vec<u32>,
    current_frame: u64,
    stats: AtlasStats,
}

impl<B: AtlasBackend> AtlasManager<B> {
    /// Create a manager streaming from its own stream over `provider`.
    pub fn new(provider: &dyn TerrainDataProvider, backend: B, config: AtlasConfig) -> Result<Self> {
        let engine = StreamingEngine::from_provider("atlas", provider, config.request_pool_capacity)?;
        Ok(Self::with_engine(engine, backend, config))
    }

    /// Create a manager around an existing engine.
    pub fn with_engine(engine: StreamingEngine<u32>, backend: B, config: AtlasConfig) -> Self {
        let terrain = engine.terrain().clone();
        let capacity = config.capacity();
        log::info!(
            "Atlas manager: {} slots for {} chunks",
            capacity,
            terrain.chunk_count()
        );

        Self {
            slots: vec![AtlasChunkSlot::default(); capacity as usize],
            chunk_to_slot: vec![NO_ENTRY; terrain.chunk_count()],
            // Popped from the back, so slot 0 is handed out first
            free_slots: (0..capacity).rev().collect(),
            pending: Vec::new(),
            current_frame: 0,
            stats: AtlasStats::default(),
            config,
            terrain,
            backend,
            engine,
        }
    }

    /// Ask for `chunk_index` to be resident.
    ///
    /// Returns true if it already is. Otherwise the chunk is queued for the
    /// next [`AtlasManager::update`] (unless it is already loading) and the
    /// caller should fall back to coarser data this frame.
    pub fn request_chunk(&mut self, chunk_index: u32) -> bool {
        self.stats.requests += 1;
        let Some(&mapped) = self.chunk_to_slot.get(chunk_index as usize) else {
            log::error!("Atlas request for unknown chunk {}", chunk_index);
            return false;
        };

        if mapped != NO_ENTRY {
            let slot = &mut self.slots[mapped as usize];
            match slot.state {
                SlotState::Resident => {
                    slot.last_active_frame = self.current_frame;
                    self.stats.hits += 1;
                    return true;
                }
                SlotState::Loading => return false,
                SlotState::Free => {
                    log::error!("Chunk {} maps to free slot {}", chunk_index, mapped);
                }
            }
        }

        self.pending.push(chunk_index);
        false
    }

    /// Advance one frame: evict, start pending loads, upload completions.
    pub fn update(&mut self) {
        self.current_frame += 1;
        self.evict_stale();
        self.issue_pending();
        self.upload_completions();
    }

    fn evict_stale(&mut self) {
        let low_water_mark = self.config.low_water_mark as usize;
        if self.free_slots.len() >= low_water_mark {
            return;
        }

        let window = self.config.eviction_window_frames as u64;
        let mut evicted = 0;
        for index in 0..self.slots.len() {
            if self.free_slots.len() >= low_water_mark {
                break;
            }
            let slot = self.slots[index];
            if slot.state == SlotState::Resident && self.current_frame.saturating_sub(slot.last_active_frame) > window {
                log::trace!("Evicting chunk {} from atlas slot {}", slot.chunk, index);
                release_slot(&mut self.slots, &mut self.chunk_to_slot, &mut self.free_slots, index as u32);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.stats.evictions += evicted;
            log::debug!(
                "Evicted {} atlas slots ({} free of {})",
                evicted,
                self.free_slots.len(),
                self.slots.len()
            );
        }
    }

    fn issue_pending(&mut self) {
        while let Some(chunk_index) = self.pending.pop() {
            let mapped = self.chunk_to_slot[chunk_index as usize];
            if mapped != NO_ENTRY {
                if self.slots[mapped as usize].chunk != chunk_index as i32 {
                    log::error!(
                        "Atlas map inconsistent: chunk {} -> slot {} holding chunk {}",
                        chunk_index,
                        mapped,
                        self.slots[mapped as usize].chunk
                    );
                }
                continue;
            }

            let Some(slot_index) = self.free_slots.pop() else {
                // Callers re-request every frame, so dropping is enough
                log::debug!("Atlas full, dropping {} pending requests", self.pending.len() + 1);
                self.pending.clear();
                break;
            };

            if !self.engine.request(PayloadKinds::all(), chunk_index, slot_index) {
                self.free_slots.push(slot_index);
                continue;
            }

            self.slots[slot_index as usize] = AtlasChunkSlot {
                chunk: chunk_index as i32,
                last_active_frame: self.current_frame,
                state: SlotState::Loading,
            };
            self.chunk_to_slot[chunk_index as usize] = slot_index as i32;
            log::trace!("Loading chunk {} into atlas slot {}", chunk_index, slot_index);
        }
    }

    fn upload_completions(&mut self) {
        let Self {
            config,
            backend,
            engine,
            slots,
            chunk_to_slot,
            free_slots,
            current_frame,
            stats,
            ..
        } = self;
        let slots_per_row = config.slots_per_row;

        engine.process_pending_completions(config.max_completions_per_frame, |completion, slot_index| {
            let chunk_index = completion.chunk_index();
            let slot = slots[slot_index as usize];
            if backend.is_lost() || slot.state != SlotState::Loading || slot.chunk != chunk_index as i32 {
                log::trace!("Dropping completion for chunk {} (slot {})", chunk_index, slot_index);
                stats.discarded += 1;
                return;
            }

            if !completion.is_complete() {
                log::warn!("Chunk {} failed to stream, releasing slot {}", chunk_index, slot_index);
                release_slot(slots, chunk_to_slot, free_slots, slot_index);
                stats.failed_reads += 1;
                return;
            }

            let coord = slot_coord(slot_index, slots_per_row);
            for kind in PayloadKind::ALL {
                if let Some(bytes) = completion.try_get(kind) {
                    backend.upload(kind, coord, bytes);
                }
            }

            let slot = &mut slots[slot_index as usize];
            slot.state = SlotState::Resident;
            slot.last_active_frame = *current_frame;
            stats.uploads += 1;
        });
    }

    /// Slot index holding `chunk_index` in any non-free state
    pub fn slot_of(&self, chunk_index: u32) -> Option<u32> {
        match self.chunk_to_slot.get(chunk_index as usize) {
            Some(&slot) if slot != NO_ENTRY => Some(slot as u32),
            _ => None,
        }
    }

    /// Atlas grid coordinate of `chunk_index`, if resident
    pub fn resident_slot_coord(&self, chunk_index: u32) -> Option<UVec2> {
        let slot = self.slot_of(chunk_index)?;
        (self.slots[slot as usize].state == SlotState::Resident)
            .then(|| slot_coord(slot, self.config.slots_per_row))
    }

    pub fn is_resident(&self, chunk_index: u32) -> bool {
        self.resident_slot_coord(chunk_index).is_some()
    }

    pub fn resident_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state == SlotState::Resident).count()
    }

    pub fn loading_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state == SlotState::Loading).count()
    }

    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slots(&self) -> &[AtlasChunkSlot] {
        &self.slots
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn stats(&self) -> AtlasStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = AtlasStats::default();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn terrain(&self) -> &Arc<TerrainData> {
        &self.terrain
    }

    /// Stop the streaming worker.
    pub fn dispose(&mut self) {
        self.engine.dispose();
    }

    /// Verify slot table, inverse map and free list agree.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.state {
                SlotState::Free => {
                    if slot.chunk != NO_ENTRY {
                        return Err(format!("free slot {} still names chunk {}", index, slot.chunk));
                    }
                }
                SlotState::Loading | SlotState::Resident => {
                    let mapped = self.chunk_to_slot.get(slot.chunk as usize).copied();
                    if mapped != Some(index as i32) {
                        return Err(format!(
                            "slot {} holds chunk {} but the chunk maps to {:?}",
                            index, slot.chunk, mapped
                        ));
                    }
                }
            }
        }

        for (chunk, &slot) in self.chunk_to_slot.iter().enumerate() {
            if slot == NO_ENTRY {
                continue;
            }
            let held = self.slots.get(slot as usize).map(|s| s.chunk);
            if held != Some(chunk as i32) {
                return Err(format!("chunk {} maps to slot {} holding {:?}", chunk, slot, held));
            }
        }

        let mut seen = vec![false; self.slots.len()];
        for &slot in &self.free_slots {
            let Some(flag) = seen.get_mut(slot as usize) else {
                return Err(format!("free list names slot {} out of range", slot));
            };
            if *flag {
                return Err(format!("slot {} is on the free list twice", slot));
            }
            *flag = true;
            if self.slots[slot as usize].state != SlotState::Free {
                return Err(format!("slot {} is on the free list but not free", slot));
            }
        }

        let free_states = self.slots.iter().filter(|s| s.state == SlotState::Free).count();
        if free_states != self.free_slots.len() {
            return Err(format!(
                "{} free slots but {} on the free list",
                free_states,
                self.free_slots.len()
            ));
        }
        Ok(())
    }
}

impl<B: AtlasBackend> ChunkResidency for AtlasManager<B> {
    fn request_chunk(&mut self, chunk_index: u32) -> bool {
        AtlasManager::request_chunk(self, chunk_index)
    }

    fn slot_coord(&self, chunk_index: u32) -> Option<UVec2> {
        self.resident_slot_coord(chunk_index)
    }
}

/// Grid coordinate of a slot index
pub fn slot_coord(slot_index: u32, slots_per_row: u32) -> UVec2 {
    UVec2::new(slot_index % slots_per_row, slot_index / slots_per_row)
}

fn release_slot(slots: &mut [AtlasChunkSlot], chunk_to_slot: &mut [i32], free_slots: &mut Vec<u32>, slot_index: u32) {
    let slot = &mut slots[slot_index as usize];
    if let Some(mapped) = chunk_to_slot.get_mut(slot.chunk as usize) {
        *mapped = NO_ENTRY;
    }
    *slot = AtlasChunkSlot::default();
    free_slots.push(slot_index);
}
