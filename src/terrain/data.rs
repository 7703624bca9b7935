//! Terrain data file: header, LOD offset table and chunk records.
//!
//! Layout (little-endian, 4-byte packed):
//!
//! ```text
//! header      version chunkSize chunkTextureSize size unitsPerTexel maxHeight
//!             heightmapSize normalMapSize controlMapSize maxLod      (10 x 4 bytes)
//! lod table   (maxLod + 1) x i32   first chunk record of each LOD
//! count       i32
//! records     count x { minHeight f32, maxHeight f32,
//!                       heightmapOffset i64, normalMapOffset i64, controlMapOffset i64 }
//! ```
//!
//! Offsets point into the separate streaming blob (see [`super::provider`]).

use std::io::{Read, Write};

use crate::core::{Error, Result};

/// Version written by [`TerrainData::write`] and required by [`TerrainData::read`].
pub const TERRAIN_DATA_VERSION: u32 = 1;

/// Serialized header size in bytes
pub const HEADER_BYTES: usize = 40;

/// Serialized chunk record size in bytes
pub const CHUNK_RECORD_BYTES: usize = 32;

/// Deepest LOD chain accepted (keeps `chunk_size << max_lod` in range)
pub const MAX_SUPPORTED_LOD: u32 = 15;

/// One of the three per-chunk payloads stored in the streaming blob
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// `u16` fixed-point height per texel
    Heightmap,
    /// Two `i8` normal components (x, z) per texel
    NormalMap,
    /// RGBA8 material layer weights per texel
    ControlMap,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 3] = [
        PayloadKind::Heightmap,
        PayloadKind::NormalMap,
        PayloadKind::ControlMap,
    ];

    /// Position in per-kind arrays
    pub fn index(self) -> usize {
        match self {
            PayloadKind::Heightmap => 0,
            PayloadKind::NormalMap => 1,
            PayloadKind::ControlMap => 2,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            PayloadKind::Heightmap => 2,
            PayloadKind::NormalMap => 2,
            PayloadKind::ControlMap => 4,
        }
    }
}

/// Fixed-layout terrain description
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainHeader {
    pub version: u32,
    /// Chunk edge length in LOD-0 texels
    pub chunk_size: u32,
    /// Edge length of every chunk payload texture
    pub chunk_texture_size: u32,
    /// Terrain edge length in LOD-0 texels
    pub size: u32,
    pub units_per_texel: f32,
    pub max_height: f32,
    pub heightmap_size: u32,
    pub normal_map_size: u32,
    pub control_map_size: u32,
    pub max_lod: u32,
}

impl TerrainHeader {
    /// Header for the current version with payload sizes derived from the texel formats.
    pub fn new(
        chunk_size: u32,
        chunk_texture_size: u32,
        size: u32,
        units_per_texel: f32,
        max_height: f32,
        max_lod: u32,
    ) -> Self {
        let texels = chunk_texture_size * chunk_texture_size;
        Self {
            version: TERRAIN_DATA_VERSION,
            chunk_size,
            chunk_texture_size,
            size,
            units_per_texel,
            max_height,
            heightmap_size: texels * PayloadKind::Heightmap.bytes_per_texel(),
            normal_map_size: texels * PayloadKind::NormalMap.bytes_per_texel(),
            control_map_size: texels * PayloadKind::ControlMap.bytes_per_texel(),
            max_lod,
        }
    }

    /// Declared byte size of one payload of `kind`
    pub fn payload_size(&self, kind: PayloadKind) -> u32 {
        match kind {
            PayloadKind::Heightmap => self.heightmap_size,
            PayloadKind::NormalMap => self.normal_map_size,
            PayloadKind::ControlMap => self.control_map_size,
        }
    }

    /// Chunks along one edge of the terrain at `lod`
    pub fn chunks_per_row(&self, lod: u32) -> u32 {
        self.size / (self.chunk_size << lod)
    }

    /// Total chunk count over all LODs
    pub fn total_chunks(&self) -> u64 {
        (0..=self.max_lod)
            .map(|lod| {
                let row = self.chunks_per_row(lod) as u64;
                row * row
            })
            .sum()
    }

    fn validate(&self) -> Result<()> {
        if self.version != TERRAIN_DATA_VERSION {
            return Err(Error::Format(format!(
                "unsupported terrain data version {} (expected {})",
                self.version, TERRAIN_DATA_VERSION
            )));
        }
        if self.chunk_size == 0 || self.chunk_texture_size == 0 || self.size == 0 {
            return Err(Error::Format(format!(
                "chunk_size {}, chunk_texture_size {} and size {} must be non-zero",
                self.chunk_size, self.chunk_texture_size, self.size
            )));
        }
        if self.max_lod > MAX_SUPPORTED_LOD {
            return Err(Error::Format(format!(
                "max_lod {} exceeds supported maximum {}",
                self.max_lod, MAX_SUPPORTED_LOD
            )));
        }
        let root_texels = (self.chunk_size as u64) << self.max_lod;
        if self.size as u64 % root_texels != 0 {
            return Err(Error::Format(format!(
                "size {} is not a multiple of chunk_size {} * 2^{}",
                self.size, self.chunk_size, self.max_lod
            )));
        }
        if !(self.units_per_texel.is_finite() && self.units_per_texel > 0.0) {
            return Err(Error::Format(format!(
                "units_per_texel must be positive, got {}",
                self.units_per_texel
            )));
        }
        let texels = self.chunk_texture_size as u64 * self.chunk_texture_size as u64;
        for kind in PayloadKind::ALL {
            let required = texels * kind.bytes_per_texel() as u64;
            if (self.payload_size(kind) as u64) < required {
                return Err(Error::Format(format!(
                    "{:?} payload size {} is smaller than {} texels of {} bytes",
                    kind,
                    self.payload_size(kind),
                    texels,
                    kind.bytes_per_texel()
                )));
            }
        }
        if self.total_chunks() > i32::MAX as u64 {
            return Err(Error::Format(format!(
                "{} chunks exceed the format limit",
                self.total_chunks()
            )));
        }
        Ok(())
    }

    fn to_bytes(&self) -> [u8; HEADER_BYTES] {
        let mut bytes = [0u8; HEADER_BYTES];
        let words = [
            self.version.to_le_bytes(),
            self.chunk_size.to_le_bytes(),
            self.chunk_texture_size.to_le_bytes(),
            self.size.to_le_bytes(),
            self.units_per_texel.to_le_bytes(),
            self.max_height.to_le_bytes(),
            self.heightmap_size.to_le_bytes(),
            self.normal_map_size.to_le_bytes(),
            self.control_map_size.to_le_bytes(),
            self.max_lod.to_le_bytes(),
        ];
        for (dst, word) in bytes.chunks_exact_mut(4).zip(words) {
            dst.copy_from_slice(&word);
        }
        bytes
    }

    fn from_bytes(bytes: &[u8; HEADER_BYTES]) -> Self {
        let word = |i: usize| -> [u8; 4] { [bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]] };
        Self {
            version: u32::from_le_bytes(word(0)),
            chunk_size: u32::from_le_bytes(word(1)),
            chunk_texture_size: u32::from_le_bytes(word(2)),
            size: u32::from_le_bytes(word(3)),
            units_per_texel: f32::from_le_bytes(word(4)),
            max_height: f32::from_le_bytes(word(5)),
            heightmap_size: u32::from_le_bytes(word(6)),
            normal_map_size: u32::from_le_bytes(word(7)),
            control_map_size: u32::from_le_bytes(word(8)),
            max_lod: u32::from_le_bytes(word(9)),
        }
    }
}

/// Per-chunk bounds and blob offsets
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChunkRecord {
    /// Lowest height in the chunk (world units)
    pub min_height: f32,
    /// Highest height in the chunk (world units)
    pub max_height: f32,
    /// Byte offsets into the streaming blob, indexed by [`PayloadKind::index`]
    pub offsets: [u64; 3],
}

impl ChunkRecord {
    pub fn offset(&self, kind: PayloadKind) -> u64 {
        self.offsets[kind.index()]
    }

    fn to_bytes(&self) -> [u8; CHUNK_RECORD_BYTES] {
        let mut bytes = [0u8; CHUNK_RECORD_BYTES];
        bytes[0..4].copy_from_slice(&self.min_height.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.max_height.to_le_bytes());
        for (i, offset) in self.offsets.iter().enumerate() {
            let start = 8 + i * 8;
            bytes[start..start + 8].copy_from_slice(&offset.to_le_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let f32_at = |at: usize| f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let u64_at = |at: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(word)
        };
        Self {
            min_height: f32_at(0),
            max_height: f32_at(4),
            offsets: [u64_at(8), u64_at(16), u64_at(24)],
        }
    }
}

/// Parsed terrain data file. Read-only after load.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainData {
    header: TerrainHeader,
    lod_offsets: Vec<u32>,
    chunks: Vec<ChunkRecord>,
}

impl TerrainData {
    /// Build terrain data for `header` with the canonical LOD table and
    /// payloads laid out back to back (heightmap, normal, control per chunk).
    pub fn with_contiguous_layout(header: TerrainHeader) -> Result<Self> {
        header.validate()?;

        let lod_offsets = canonical_lod_offsets(&header);
        let count = header.total_chunks() as usize;
        let stride: u64 = PayloadKind::ALL
            .iter()
            .map(|&kind| header.payload_size(kind) as u64)
            .sum();

        let chunks = (0..count as u64)
            .map(|i| {
                let base = i * stride;
                let height_end = base + header.heightmap_size as u64;
                ChunkRecord {
                    min_height: 0.0,
                    max_height: 0.0,
                    offsets: [base, height_end, height_end + header.normal_map_size as u64],
                }
            })
            .collect();

        Ok(Self { header, lod_offsets, chunks })
    }

    /// Parse header, LOD offset table and chunk records.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header_bytes = [0u8; HEADER_BYTES];
        reader.read_exact(&mut header_bytes)?;
        let header = TerrainHeader::from_bytes(&header_bytes);
        header.validate()?;

        let mut lod_offsets = Vec::with_capacity(header.max_lod as usize + 1);
        for _ in 0..=header.max_lod {
            lod_offsets.push(read_u32(reader)?);
        }
        validate_lod_offsets(&header, &lod_offsets)?;

        let count = read_u32(reader)? as u64;
        if count != header.total_chunks() {
            return Err(Error::Format(format!(
                "chunk count {} does not match expected {}",
                count,
                header.total_chunks()
            )));
        }

        let mut record_bytes = vec![0u8; count as usize * CHUNK_RECORD_BYTES];
        reader.read_exact(&mut record_bytes)?;
        let chunks = record_bytes
            .chunks_exact(CHUNK_RECORD_BYTES)
            .map(ChunkRecord::from_bytes)
            .collect();

        log::debug!(
            "Read terrain data: size {}, chunk size {}, max LOD {}, {} chunks",
            header.size, header.chunk_size, header.max_lod, count
        );

        Ok(Self { header, lod_offsets, chunks })
    }

    /// Byte-compatible inverse of [`TerrainData::read`].
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.header.to_bytes())?;
        for offset in &self.lod_offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        writer.write_all(&(self.chunks.len() as u32).to_le_bytes())?;
        for chunk in &self.chunks {
            writer.write_all(&chunk.to_bytes())?;
        }
        Ok(())
    }

    /// Serialized size of this terrain data in bytes
    pub fn serialized_len(&self) -> u64 {
        (HEADER_BYTES + self.lod_offsets.len() * 4 + 4 + self.chunks.len() * CHUNK_RECORD_BYTES) as u64
    }

    /// Check that every payload range lies inside a blob of `blob_len` bytes.
    pub fn validate_blob(&self, blob_len: u64) -> Result<()> {
        for (index, chunk) in self.chunks.iter().enumerate() {
            for kind in PayloadKind::ALL {
                let end = chunk.offset(kind).checked_add(self.header.payload_size(kind) as u64);
                if end.is_none_or(|end| end > blob_len) {
                    return Err(Error::Format(format!(
                        "chunk {} {:?} payload at offset {} exceeds blob length {}",
                        index,
                        kind,
                        chunk.offset(kind),
                        blob_len
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn header(&self) -> &TerrainHeader {
        &self.header
    }

    pub fn lod_offsets(&self) -> &[u32] {
        &self.lod_offsets
    }

    pub fn max_lod(&self) -> u32 {
        self.header.max_lod
    }

    pub fn chunks_per_row(&self, lod: u32) -> u32 {
        self.header.chunks_per_row(lod)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Linear chunk index of chunk `(x, y)` at `lod`
    ///
    /// # Examples
    /// ```
    /// use terrastream::terrain::{TerrainData, TerrainHeader};
    ///
    /// let data = TerrainData::with_contiguous_layout(
    ///     TerrainHeader::new(256, 257, 1024, 1.0, 100.0, 2),
    /// ).unwrap();
    /// assert_eq!(data.chunk_index(0, 3, 1), 7);
    /// assert_eq!(data.chunk_index(1, 0, 0), 16);
    /// assert_eq!(data.chunk_index(2, 0, 0), 20);
    /// ```
    pub fn chunk_index(&self, lod: u32, x: u32, y: u32) -> u32 {
        self.chunk_index_linear(lod, y * self.chunks_per_row(lod) + x)
    }

    /// Linear chunk index of the `linear`-th chunk (row-major) at `lod`
    pub fn chunk_index_linear(&self, lod: u32, linear: u32) -> u32 {
        self.lod_offsets[lod as usize] + linear
    }

    /// Inverse of [`TerrainData::chunk_index`]: `(lod, x, y)`
    pub fn chunk_coord(&self, index: u32) -> Option<(u32, u32, u32)> {
        if index as usize >= self.chunks.len() {
            return None;
        }
        // Offsets may come in any order, so search each LOD's range
        self.lod_offsets.iter().enumerate().find_map(|(lod, &start)| {
            let row = self.chunks_per_row(lod as u32);
            let linear = index.checked_sub(start)?;
            (linear < row * row).then(|| (lod as u32, linear % row, linear / row))
        })
    }

    pub fn chunk(&self, index: u32) -> Option<&ChunkRecord> {
        self.chunks.get(index as usize)
    }

    pub fn chunk_mut(&mut self, index: u32) -> Option<&mut ChunkRecord> {
        self.chunks.get_mut(index as usize)
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn payload_size(&self, kind: PayloadKind) -> u32 {
        self.header.payload_size(kind)
    }

    /// World-space edge length of one chunk at `lod`
    pub fn chunk_world_size(&self, lod: u32) -> f32 {
        (self.header.chunk_size << lod) as f32 * self.header.units_per_texel
    }

    /// World-space edge length of the whole terrain
    pub fn world_size(&self) -> f32 {
        self.header.size as f32 * self.header.units_per_texel
    }
}

fn canonical_lod_offsets(header: &TerrainHeader) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(header.max_lod as usize + 1);
    let mut next = 0u32;
    for lod in 0..=header.max_lod {
        offsets.push(next);
        let row = header.chunks_per_row(lod);
        next += row * row;
    }
    offsets
}

/// Per-LOD chunk ranges `[offset, offset + row²)` must tile `0..total_chunks`.
fn validate_lod_offsets(header: &TerrainHeader, offsets: &[u32]) -> Result<()> {
    let mut ranges: Vec<(u64, u64)> = offsets
        .iter()
        .enumerate()
        .map(|(lod, &start)| {
            let row = header.chunks_per_row(lod as u32) as u64;
            (start as u64, start as u64 + row * row)
        })
        .collect();
    ranges.sort_unstable();

    let mut next = 0u64;
    for (start, end) in ranges {
        if start != next {
            return Err(Error::Format(format!(
                "LOD offset table {:?} leaves a gap or overlap at chunk {}",
                offsets, next
            )));
        }
        next = end;
    }
    if next != header.total_chunks() {
        return Err(Error::Format(format!(
            "LOD offset table {:?} covers {} chunks, expected {}",
            offsets,
            next,
            header.total_chunks()
        )));
    }
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    Ok(u32::from_le_bytes(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn scenario_header() -> TerrainHeader {
        TerrainHeader::new(256, 257, 1024, 0.5, 320.0, 2)
    }

    fn write_to_vec(data: &TerrainData) -> Vec<u8> {
        let mut bytes = Vec::new();
        data.write(&mut bytes).expect("write failed");
        bytes
    }

    #[test]
    fn test_chunks_per_row_scenario() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        assert_eq!(data.chunks_per_row(0), 4);
        assert_eq!(data.chunks_per_row(1), 2);
        assert_eq!(data.chunks_per_row(2), 1);
        assert_eq!(data.lod_offsets(), &[0, 16, 20]);
        assert_eq!(data.chunk_count(), 21);
    }

    #[test]
    fn test_roundtrip_is_bit_identical() {
        let mut data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        for i in 0..data.chunk_count() as u32 {
            let chunk = data.chunk_mut(i).expect("chunk");
            chunk.min_height = -1.5 + i as f32 * 0.1;
            chunk.max_height = f32::from_bits(0x4049_0fdb) + i as f32;
            chunk.offsets[2] = u64::MAX - i as u64;
        }

        let bytes = write_to_vec(&data);
        assert_eq!(bytes.len() as u64, data.serialized_len());

        let parsed = TerrainData::read(&mut Cursor::new(&bytes)).expect("read failed");
        assert_eq!(parsed.header(), data.header());
        assert_eq!(parsed.lod_offsets(), data.lod_offsets());
        for (a, b) in parsed.chunks().iter().zip(data.chunks()) {
            assert_eq!(a.min_height.to_bits(), b.min_height.to_bits());
            assert_eq!(a.max_height.to_bits(), b.max_height.to_bits());
            assert_eq!(a.offsets, b.offsets);
        }

        // Writing the parsed data again produces the same bytes
        assert_eq!(write_to_vec(&parsed), bytes);
    }

    #[test]
    fn test_header_layout_on_disk() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let bytes = write_to_vec(&data);

        assert_eq!(&bytes[0..4], &TERRAIN_DATA_VERSION.to_le_bytes());
        assert_eq!(&bytes[4..8], &256i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1024i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[36..40], &2i32.to_le_bytes());
        // LOD table then chunk count
        assert_eq!(&bytes[40..44], &0i32.to_le_bytes());
        assert_eq!(&bytes[44..48], &16i32.to_le_bytes());
        assert_eq!(&bytes[48..52], &20i32.to_le_bytes());
        assert_eq!(&bytes[52..56], &21i32.to_le_bytes());
    }

    #[test]
    fn test_version_mismatch_is_format_error() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let mut bytes = write_to_vec(&data);
        bytes[0..4].copy_from_slice(&(TERRAIN_DATA_VERSION + 1).to_le_bytes());

        let result = TerrainData::read(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(Error::Format(msg)) if msg.contains("version")));
    }

    #[test]
    fn test_undersized_payload_is_format_error() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let mut bytes = write_to_vec(&data);
        // heightmap_size is header word 6
        bytes[24..28].copy_from_slice(&2u32.to_le_bytes());

        let result = TerrainData::read(&mut Cursor::new(&bytes));
        assert!(matches!(result, Err(Error::Format(msg)) if msg.contains("Heightmap")));
    }

    #[test]
    fn test_oversized_payload_accepted() {
        let mut header = scenario_header();
        header.control_map_size += 16;
        let data = TerrainData::with_contiguous_layout(header).expect("layout");
        let parsed = TerrainData::read(&mut Cursor::new(write_to_vec(&data))).expect("read failed");
        assert_eq!(parsed.payload_size(PayloadKind::ControlMap), header.control_map_size);
    }

    #[test]
    fn test_coarsest_first_lod_table() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let mut bytes = write_to_vec(&data);
        for (lod, offset) in [5u32, 1, 0].into_iter().enumerate() {
            let at = 40 + lod * 4;
            bytes[at..at + 4].copy_from_slice(&offset.to_le_bytes());
        }

        let parsed = TerrainData::read(&mut Cursor::new(&bytes)).expect("read failed");
        assert_eq!(parsed.lod_offsets(), &[5, 1, 0]);
        assert_eq!(parsed.chunk_index(2, 0, 0), 0);
        assert_eq!(parsed.chunk_index(1, 1, 1), 4);
        assert_eq!(parsed.chunk_index(0, 3, 3), 20);

        let mut seen = std::collections::HashSet::new();
        for lod in 0..=parsed.max_lod() {
            let row = parsed.chunks_per_row(lod);
            for y in 0..row {
                for x in 0..row {
                    let index = parsed.chunk_index(lod, x, y);
                    assert_eq!(parsed.chunk_coord(index), Some((lod, x, y)));
                    assert!(seen.insert(index));
                }
            }
        }
        assert_eq!(seen.len(), parsed.chunk_count());
        assert_eq!(write_to_vec(&parsed), bytes);
    }

    #[test]
    fn test_overlapping_lod_table_rejected() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let mut bytes = write_to_vec(&data);
        // LOD 1 overlaps LOD 0 and leaves chunks 16..20 unowned
        bytes[44..48].copy_from_slice(&14u32.to_le_bytes());

        assert!(matches!(
            TerrainData::read(&mut Cursor::new(&bytes)),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_size_not_multiple_rejected() {
        let header = TerrainHeader::new(256, 257, 1000, 1.0, 100.0, 2);
        assert!(matches!(
            TerrainData::with_contiguous_layout(header),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let bytes = write_to_vec(&data);
        let truncated = &bytes[..bytes.len() - 5];

        assert!(matches!(
            TerrainData::read(&mut Cursor::new(truncated)),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_bad_chunk_count_rejected() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        let mut bytes = write_to_vec(&data);
        bytes[52..56].copy_from_slice(&20u32.to_le_bytes());

        assert!(matches!(
            TerrainData::read(&mut Cursor::new(&bytes)),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_chunk_index_invariant() {
        let header = TerrainHeader::new(32, 33, 512, 1.0, 50.0, 4);
        let data = TerrainData::with_contiguous_layout(header).expect("layout");
        let mut seen = std::collections::HashSet::new();

        for lod in 0..=data.max_lod() {
            let row = data.chunks_per_row(lod);
            for y in 0..row {
                for x in 0..row {
                    let index = data.chunk_index(lod, x, y);
                    assert_eq!(index, data.lod_offsets()[lod as usize] + y * row + x);
                    assert_eq!(index, data.chunk_index_linear(lod, y * row + x));
                    assert_eq!(data.chunk_coord(index), Some((lod, x, y)));
                    assert!(seen.insert(index), "index {} collides across LODs", index);
                }
            }
        }
        assert_eq!(seen.len(), data.chunk_count());
        assert_eq!(data.chunk_coord(data.chunk_count() as u32), None);
    }

    #[test]
    fn test_contiguous_layout_fits_blob() {
        let header = scenario_header();
        let data = TerrainData::with_contiguous_layout(header).expect("layout");
        let stride = (header.heightmap_size + header.normal_map_size + header.control_map_size) as u64;
        let blob_len = stride * data.chunk_count() as u64;

        assert!(data.validate_blob(blob_len).is_ok());
        assert!(matches!(data.validate_blob(blob_len - 1), Err(Error::Format(_))));
    }

    #[test]
    fn test_world_sizes() {
        let data = TerrainData::with_contiguous_layout(scenario_header()).expect("layout");
        assert_eq!(data.world_size(), 512.0);
        assert_eq!(data.chunk_world_size(0), 128.0);
        assert_eq!(data.chunk_world_size(2), 512.0);
    }
}
