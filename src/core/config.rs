//! Streaming configuration.
//!
//! All sections have working defaults, so a config file only needs the keys
//! it wants to override:
//!
//! ```json
//! { "lod": { "lod_distances": [96.0, 192.0], "min_lod": 0 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Full terrain streaming configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainStreamingConfig {
    /// GPU atlas residency settings.
    pub atlas: AtlasConfig,
    /// Quadtree LOD selection settings.
    pub lod: LodConfig,
    /// Collision chunk window settings.
    pub physics: PhysicsConfig,
}

impl TerrainStreamingConfig {
    /// Parse a config from a JSON string and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded terrain streaming config from {}", path.display());
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check all sections for values the streaming core cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.atlas.validate()?;
        self.lod.validate()?;
        self.physics.validate()
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Atlas residency settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Slots along one edge of each atlas texture (capacity = slots_per_row²).
    pub slots_per_row: u32,
    /// Eviction only runs while fewer slots than this are free.
    pub low_water_mark: u32,
    /// A resident slot not requested for this many frames may be evicted.
    pub eviction_window_frames: u32,
    /// Completions uploaded per frame. 0 = unbounded.
    pub max_completions_per_frame: usize,
    /// Request objects kept in the streaming free list.
    pub request_pool_capacity: usize,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            slots_per_row: 16,
            low_water_mark: 16,
            eviction_window_frames: 30,
            max_completions_per_frame: 1,
            request_pool_capacity: 32,
        }
    }
}

impl AtlasConfig {
    /// Total slot count.
    pub fn capacity(&self) -> u32 {
        self.slots_per_row * self.slots_per_row
    }

    fn validate(&self) -> Result<()> {
        if self.slots_per_row == 0 {
            return Err(Error::Config("atlas.slots_per_row must be > 0".into()));
        }
        if self.slots_per_row > u16::MAX as u32 {
            return Err(Error::Config(format!(
                "atlas.slots_per_row {} does not fit the packed slot coordinate",
                self.slots_per_row
            )));
        }
        Ok(())
    }
}

/// Quadtree LOD selection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Half-size of the camera square per LOD level, in world units.
    /// Levels past the end of the list double the last entry per level.
    pub lod_distances: Vec<f32>,
    /// Never split a chunk at or below this LOD.
    pub min_lod: u32,
    /// Always split chunks above this LOD. `None` = no ceiling.
    pub max_lod: Option<u32>,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            lod_distances: vec![128.0, 256.0, 512.0],
            min_lod: 0,
            max_lod: None,
        }
    }
}

impl LodConfig {
    /// Camera square half-size used when deciding whether to split a chunk at `lod`.
    ///
    /// # Examples
    /// ```
    /// use terrastream::core::LodConfig;
    ///
    /// let config = LodConfig { lod_distances: vec![100.0, 150.0], ..Default::default() };
    /// assert_eq!(config.lod_distance(0), 100.0);
    /// assert_eq!(config.lod_distance(1), 150.0);
    /// assert_eq!(config.lod_distance(2), 300.0);
    /// assert_eq!(config.lod_distance(4), 1200.0);
    /// ```
    pub fn lod_distance(&self, lod: u32) -> f32 {
        let Some(&last) = self.lod_distances.last() else {
            return 0.0;
        };
        let last_index = self.lod_distances.len() as u32 - 1;
        if lod <= last_index {
            self.lod_distances[lod as usize]
        } else {
            last * (1u64 << (lod - last_index).min(63)) as f32
        }
    }

    fn validate(&self) -> Result<()> {
        if self.lod_distances.is_empty() {
            return Err(Error::Config("lod.lod_distances must not be empty".into()));
        }
        if self.lod_distances.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(Error::Config("lod.lod_distances must be finite and >= 0".into()));
        }
        if let Some(max_lod) = self.max_lod {
            if max_lod < self.min_lod {
                return Err(Error::Config(format!(
                    "lod.max_lod {} is below lod.min_lod {}",
                    max_lod, self.min_lod
                )));
            }
        }
        Ok(())
    }
}

/// Collision chunk window settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Whether collision chunks are streamed at all.
    pub enabled: bool,
    /// Edge length of the chunk window around the camera. Must be odd.
    pub window_size: u32,
    /// Completions converted per frame. 0 = unbounded.
    pub max_completions_per_frame: usize,
    /// Request objects kept in the streaming free list.
    pub request_pool_capacity: usize,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 7,
            max_completions_per_frame: 0,
            request_pool_capacity: 16,
        }
    }
}

impl PhysicsConfig {
    fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return Err(Error::Config(format!(
                "physics.window_size must be odd, got {}",
                self.window_size
            )));
        }
        Ok(())
    }
}
