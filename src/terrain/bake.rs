//! Offline terrain baking.
//!
//! Turns a height function into a complete terrain asset: every LOD level
//! is resampled from LOD 0, and each chunk gets heightmap, normal and
//! control payloads plus min/max height bounds.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use glam::Vec3;
use rayon::prelude::*;

use crate::core::Result;
use super::data::{PayloadKind, TerrainData, TerrainHeader};
use super::provider::PACKED_PREFIX_BYTES;

/// Terrain dimensions for a bake
#[derive(Clone, Copy, Debug)]
pub struct BakeSettings {
    /// Chunk edge length in LOD-0 texels
    pub chunk_size: u32,
    /// Terrain edge length in LOD-0 texels
    pub size: u32,
    pub units_per_texel: f32,
    pub max_height: f32,
    pub max_lod: u32,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64,
            size: 1024,
            units_per_texel: 1.0,
            max_height: 200.0,
            max_lod: 4,
        }
    }
}

/// Baked terrain data and the payload blob it addresses
#[derive(Clone, Debug)]
pub struct TerrainAsset {
    pub data: TerrainData,
    pub blob: Vec<u8>,
}

impl TerrainAsset {
    /// Payload bytes of `kind` for chunk `index`
    pub fn payload(&self, index: u32, kind: PayloadKind) -> &[u8] {
        let offset = self.data.chunks()[index as usize].offset(kind) as usize;
        &self.blob[offset..offset + self.data.payload_size(kind) as usize]
    }

    /// Write a `.terrain` data file and its `.blob`
    pub fn write_files(&self, data_path: &Path, blob_path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(data_path)?);
        self.data.write(&mut writer)?;
        writer.flush()?;

        std::fs::write(blob_path, &self.blob)?;
        log::info!(
            "Wrote {} ({} chunks) and {} ({} bytes)",
            data_path.display(),
            self.data.chunk_count(),
            blob_path.display(),
            self.blob.len()
        );
        Ok(())
    }

    /// Single-file package bytes: blob offset, data section, blob
    pub fn to_packed_bytes(&self) -> Result<Vec<u8>> {
        let blob_offset = PACKED_PREFIX_BYTES + self.data.serialized_len();
        let mut bytes = Vec::with_capacity(blob_offset as usize + self.blob.len());
        bytes.extend_from_slice(&blob_offset.to_le_bytes());
        self.data.write(&mut bytes)?;
        bytes.extend_from_slice(&self.blob);
        Ok(bytes)
    }

    /// Write a `.tpak` package
    pub fn write_packed(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_packed_bytes()?)?;
        log::info!("Wrote package {} ({} chunks)", path.display(), self.data.chunk_count());
        Ok(())
    }
}

/// Encoded payloads of one chunk
struct EncodedChunk {
    min_height: f32,
    max_height: f32,
    payloads: [Vec<u8>; 3],
}

/// Bakes terrain assets from a height function
pub struct TerrainBaker {
    header: TerrainHeader,
}

impl TerrainBaker {
    /// Chunk textures carry one extra texel row/column shared with the neighbor.
    pub fn new(settings: BakeSettings) -> Result<Self> {
        let header = TerrainHeader::new(
            settings.chunk_size,
            settings.chunk_size + 1,
            settings.size,
            settings.units_per_texel,
            settings.max_height,
            settings.max_lod,
        );
        // Validates the header before any work is done
        TerrainData::with_contiguous_layout(header)?;
        Ok(Self { header })
    }

    pub fn header(&self) -> &TerrainHeader {
        &self.header
    }

    /// Bake every chunk of every LOD.
    ///
    /// `height_at(x, y)` returns the normalized height (0..=1) at LOD-0 texel
    /// `(x, y)`; coordinates range over `0..=size`.
    pub fn bake<F>(&self, height_at: F) -> Result<TerrainAsset>
    where
        F: Fn(u32, u32) -> f32 + Sync,
    {
        let mut data = TerrainData::with_contiguous_layout(self.header)?;
        let count = data.chunk_count() as u32;

        let coords: Vec<(u32, u32, u32)> = (0..count)
            .filter_map(|index| data.chunk_coord(index))
            .collect();

        let encoded: Vec<EncodedChunk> = coords
            .par_iter()
            .map(|&(lod, x, y)| self.encode_chunk(&height_at, lod, x, y))
            .collect();

        let mut blob = Vec::new();
        for (index, chunk) in encoded.into_iter().enumerate() {
            let Some(record) = data.chunk_mut(index as u32) else {
                continue;
            };
            record.min_height = chunk.min_height;
            record.max_height = chunk.max_height;
            debug_assert_eq!(record.offset(PayloadKind::Heightmap), blob.len() as u64);
            for payload in &chunk.payloads {
                blob.extend_from_slice(payload);
            }
        }

        log::debug!("Baked {} chunks into {} blob bytes", count, blob.len());
        Ok(TerrainAsset { data, blob })
    }

    fn encode_chunk<F>(&self, height_at: &F, lod: u32, cx: u32, cy: u32) -> EncodedChunk
    where
        F: Fn(u32, u32) -> f32,
    {
        let header = &self.header;
        let tex = header.chunk_texture_size;
        let step = 1u32 << lod;
        let origin_x = cx * header.chunk_size * step;
        let origin_y = cy * header.chunk_size * step;
        let world_step = step as f32 * header.units_per_texel;

        // Samples clamp to the terrain, so edge chunks repeat their last texel
        let sample = |tx: i64, ty: i64| -> f32 {
            let x = (origin_x as i64 + tx * step as i64).clamp(0, header.size as i64) as u32;
            let y = (origin_y as i64 + ty * step as i64).clamp(0, header.size as i64) as u32;
            height_at(x, y).clamp(0.0, 1.0)
        };

        let texels = (tex * tex) as usize;
        let mut heights = Vec::with_capacity(texels * 2);
        let mut normals = Vec::with_capacity(texels * 2);
        let mut control = Vec::with_capacity(texels * 4);
        let mut min_height = f32::INFINITY;
        let mut max_height = f32::NEG_INFINITY;

        for j in 0..tex as i64 {
            for i in 0..tex as i64 {
                let h = sample(i, j);
                let fixed = (h * u16::MAX as f32).round() as u16;
                heights.extend_from_slice(&fixed.to_le_bytes());

                let world_h = h * header.max_height;
                min_height = min_height.min(world_h);
                max_height = max_height.max(world_h);

                let dx = (sample(i + 1, j) - sample(i - 1, j)) * header.max_height / (2.0 * world_step);
                let dz = (sample(i, j + 1) - sample(i, j - 1)) * header.max_height / (2.0 * world_step);
                let normal = Vec3::new(-dx, 1.0, -dz).normalize();
                normals.push(((normal.x * 127.0).round() as i8) as u8);
                normals.push(((normal.z * 127.0).round() as i8) as u8);

                control.extend_from_slice(&control_weights(h, normal.y));
            }
        }

        EncodedChunk {
            min_height,
            max_height,
            payloads: [heights, normals, control],
        }
    }
}

/// Layer weights: grass on flat ground, rock on slopes, snow up high
fn control_weights(height: f32, normal_y: f32) -> [u8; 4] {
    let rock = ((1.0 - normal_y) * 4.0).clamp(0.0, 1.0);
    let snow = ((height - 0.8) * 5.0).clamp(0.0, 1.0) * (1.0 - rock);
    let grass = (1.0 - rock - snow).max(0.0);
    [
        (grass * 255.0).round() as u8,
        (rock * 255.0).round() as u8,
        (snow * 255.0).round() as u8,
        0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BakeSettings {
        BakeSettings {
            chunk_size: 4,
            size: 16,
            units_per_texel: 2.0,
            max_height: 100.0,
            max_lod: 2,
        }
    }

    #[test]
    fn test_bake_sizes() {
        let baker = TerrainBaker::new(settings()).expect("baker");
        let asset = baker.bake(|_, _| 0.5).expect("bake");

        assert_eq!(asset.data.chunk_count(), 16 + 4 + 1);
        assert_eq!(asset.data.header().chunk_texture_size, 5);
        let stride: u64 = PayloadKind::ALL
            .iter()
            .map(|&k| asset.data.payload_size(k) as u64)
            .sum();
        assert_eq!(asset.blob.len() as u64, stride * 21);
        assert!(asset.data.validate_blob(asset.blob.len() as u64).is_ok());
    }

    #[test]
    fn test_flat_terrain_payloads() {
        let baker = TerrainBaker::new(settings()).expect("baker");
        let asset = baker.bake(|_, _| 0.5).expect("bake");

        for index in 0..asset.data.chunk_count() as u32 {
            let record = asset.data.chunk(index).expect("record");
            assert!((record.min_height - 50.0).abs() < 1e-3);
            assert!((record.max_height - 50.0).abs() < 1e-3);

            let heights = asset.payload(index, PayloadKind::Heightmap);
            assert_eq!(u16::from_le_bytes([heights[0], heights[1]]), 32768);

            // Flat ground: normal x/z are zero, all grass
            assert!(asset.payload(index, PayloadKind::NormalMap).iter().all(|&b| b == 0));
            assert_eq!(&asset.payload(index, PayloadKind::ControlMap)[..4], &[255, 0, 0, 0]);
        }
    }

    #[test]
    fn test_lod_resampling_picks_strided_texels() {
        let baker = TerrainBaker::new(settings()).expect("baker");
        // Height encodes the x coordinate so strides are visible
        let asset = baker.bake(|x, _| x as f32 / 16.0).expect("bake");

        let root = asset.data.chunk_index(2, 0, 0);
        let heights = asset.payload(root, PayloadKind::Heightmap);
        // Root texel 1 samples LOD-0 x = 4
        let texel1 = u16::from_le_bytes([heights[2], heights[3]]);
        assert_eq!(texel1, (0.25 * u16::MAX as f32).round() as u16);

        let record = asset.data.chunk(root).expect("record");
        assert_eq!(record.min_height, 0.0);
        assert!((record.max_height - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_packed_bytes_prefix() {
        let baker = TerrainBaker::new(settings()).expect("baker");
        let asset = baker.bake(|_, _| 0.0).expect("bake");
        let bytes = asset.to_packed_bytes().expect("pack");

        let blob_offset = u64::from_le_bytes(bytes[0..8].try_into().expect("prefix"));
        assert_eq!(blob_offset, 8 + asset.data.serialized_len());
        assert_eq!(&bytes[blob_offset as usize..], &asset.blob[..]);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let bad = BakeSettings {
            size: 15,
            ..settings()
        };
        assert!(TerrainBaker::new(bad).is_err());
    }
}
