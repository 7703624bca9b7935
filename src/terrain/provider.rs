//! Terrain data providers.
//!
//! A provider hands out the parsed [`TerrainData`] and opens independent
//! streams over the payload blob, one per streaming engine. The concrete
//! variant is picked once by [`open_provider`]; nothing downstream branches
//! on it.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{Error, Result};
use super::data::TerrainData;

/// Extension of a terrain data file whose blob sits next to it
pub const DATA_EXTENSION: &str = "terrain";
/// Extension of the blob belonging to a `.terrain` file
pub const BLOB_EXTENSION: &str = "blob";
/// Extension of a single-file package (data section followed by blob)
pub const PACKED_EXTENSION: &str = "tpak";

/// Size of the package prefix holding the blob offset
pub const PACKED_PREFIX_BYTES: u64 = 8;

/// Seekable byte source that can move to the streaming thread
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// An open stream over the payload blob
pub struct BlobStream {
    pub reader: Box<dyn ReadSeek>,
    /// Position of blob byte 0 within `reader`
    pub base_offset: u64,
}

impl std::fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("reader", &"<dyn ReadSeek>")
            .field("base_offset", &self.base_offset)
            .finish()
    }
}

/// Source of terrain metadata and payload streams
pub trait TerrainDataProvider: Send + Sync {
    /// Parsed header and chunk table
    fn terrain_data(&self) -> &Arc<TerrainData>;

    /// Open a fresh stream over the payload blob
    fn open_stream(&self) -> Result<BlobStream>;

    /// Human-readable origin for log messages
    fn describe(&self) -> String;
}

/// Open the provider matching the file extension of `path`.
///
/// `*.tpak` opens a [`PackedTerrainProvider`]; `*.terrain` opens a
/// [`FileTerrainProvider`] with the blob at the same path with `.blob`.
pub fn open_provider(path: &Path) -> Result<Box<dyn TerrainDataProvider>> {
    let provider: Box<dyn TerrainDataProvider> = match path.extension().and_then(|e| e.to_str()) {
        Some(PACKED_EXTENSION) => Box::new(PackedTerrainProvider::open(path)?),
        Some(DATA_EXTENSION) => {
            let blob_path = path.with_extension(BLOB_EXTENSION);
            Box::new(FileTerrainProvider::open(path, &blob_path)?)
        }
        _ => {
            return Err(Error::Format(format!(
                "unrecognized terrain asset '{}' (expected .{} or .{})",
                path.display(),
                DATA_EXTENSION,
                PACKED_EXTENSION
            )));
        }
    };
    log::info!("Opened terrain provider {}", provider.describe());
    Ok(provider)
}

// ---------------------------------------------------------------------------
// Raw file pair
// ---------------------------------------------------------------------------

/// Terrain data file plus a separate blob file
pub struct FileTerrainProvider {
    data: Arc<TerrainData>,
    data_path: PathBuf,
    blob_path: PathBuf,
}

impl FileTerrainProvider {
    /// Parse `data_path` and check its offsets against the size of `blob_path`.
    pub fn open(data_path: &Path, blob_path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(data_path)?);
        let data = TerrainData::read(&mut reader)?;

        let blob_len = std::fs::metadata(blob_path)?.len();
        data.validate_blob(blob_len)?;

        Ok(Self {
            data: Arc::new(data),
            data_path: data_path.to_path_buf(),
            blob_path: blob_path.to_path_buf(),
        })
    }
}

impl TerrainDataProvider for FileTerrainProvider {
    fn terrain_data(&self) -> &Arc<TerrainData> {
        &self.data
    }

    fn open_stream(&self) -> Result<BlobStream> {
        Ok(BlobStream {
            reader: Box::new(File::open(&self.blob_path)?),
            base_offset: 0,
        })
    }

    fn describe(&self) -> String {
        format!("{} + {}", self.data_path.display(), self.blob_path.display())
    }
}

// ---------------------------------------------------------------------------
// Single-file package
// ---------------------------------------------------------------------------

enum PackedSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

/// Package with the blob stored after the data section.
///
/// ```text
/// blob_offset u64 | terrain data | ... | blob (from blob_offset to end)
/// ```
pub struct PackedTerrainProvider {
    data: Arc<TerrainData>,
    source: PackedSource,
    blob_offset: u64,
}

impl PackedTerrainProvider {
    /// Open a package file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let (data, blob_offset) = Self::parse(&mut reader, total_len)?;

        Ok(Self {
            data: Arc::new(data),
            source: PackedSource::File(path.to_path_buf()),
            blob_offset,
        })
    }

    /// Use an in-memory package (e.g. bytes from an asset database).
    pub fn from_bytes(bytes: Arc<[u8]>) -> Result<Self> {
        let total_len = bytes.len() as u64;
        let (data, blob_offset) = Self::parse(&mut Cursor::new(&bytes[..]), total_len)?;

        Ok(Self {
            data: Arc::new(data),
            source: PackedSource::Memory(bytes),
            blob_offset,
        })
    }

    fn parse<R: Read>(reader: &mut R, total_len: u64) -> Result<(TerrainData, u64)> {
        let mut prefix = [0u8; PACKED_PREFIX_BYTES as usize];
        reader.read_exact(&mut prefix)?;
        let blob_offset = u64::from_le_bytes(prefix);

        let data = TerrainData::read(reader)?;
        let data_end = PACKED_PREFIX_BYTES + data.serialized_len();
        if blob_offset < data_end || blob_offset > total_len {
            return Err(Error::Format(format!(
                "package blob offset {} outside [{}, {}]",
                blob_offset, data_end, total_len
            )));
        }
        data.validate_blob(total_len - blob_offset)?;

        Ok((data, blob_offset))
    }

    pub fn blob_offset(&self) -> u64 {
        self.blob_offset
    }
}

impl TerrainDataProvider for PackedTerrainProvider {
    fn terrain_data(&self) -> &Arc<TerrainData> {
        &self.data
    }

    fn open_stream(&self) -> Result<BlobStream> {
        let reader: Box<dyn ReadSeek> = match &self.source {
            PackedSource::File(path) => Box::new(File::open(path)?),
            PackedSource::Memory(bytes) => Box::new(Cursor::new(bytes.clone())),
        };
        Ok(BlobStream {
            reader,
            base_offset: self.blob_offset,
        })
    }

    fn describe(&self) -> String {
        match &self.source {
            PackedSource::File(path) => path.display().to_string(),
            PackedSource::Memory(bytes) => format!("<memory package, {} bytes>", bytes.len()),
        }
    }
}
