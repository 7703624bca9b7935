//! Atlas texture backends
//!
//! The manager only decides which slot holds which chunk; a backend owns the
//! three atlas textures and copies payload bytes into slot regions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::UVec2;

use crate::core::{Error, Result};
use crate::terrain::{PayloadKind, TerrainHeader};

/// Destination for chunk payload uploads
pub trait AtlasBackend {
    /// Copy one payload into the region of `slot` in the atlas for `kind`.
    /// `bytes` holds at least one chunk texture of that kind; extra bytes are ignored.
    fn upload(&mut self, kind: PayloadKind, slot: UVec2, bytes: &[u8]);

    /// True once the underlying device is gone; uploads are skipped from then on.
    fn is_lost(&self) -> bool;
}

/// Texture format of the atlas for each payload kind
pub fn atlas_format(kind: PayloadKind) -> wgpu::TextureFormat {
    match kind {
        PayloadKind::Heightmap => wgpu::TextureFormat::R16Uint,
        PayloadKind::NormalMap => wgpu::TextureFormat::Rg8Snorm,
        PayloadKind::ControlMap => wgpu::TextureFormat::Rgba8Unorm,
    }
}

/// Atlas edge length in texels
pub fn atlas_extent(header: &TerrainHeader, slots_per_row: u32) -> u32 {
    header.chunk_texture_size * slots_per_row
}

/// Shared "device lost" state, set by whoever owns the device's lost callback
#[derive(Clone, Debug, Default)]
pub struct DeviceLostFlag(Arc<AtomicBool>);

impl DeviceLostFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a device-lost callback that sets a new flag.
    ///
    /// wgpu keeps a single lost callback per device, so this replaces any
    /// callback already set. Hosts with their own handler should create a
    /// flag with [`DeviceLostFlag::new`] and call [`DeviceLostFlag::mark_lost`]
    /// from it instead.
    pub fn watch(device: &wgpu::Device) -> Self {
        let flag = Self::new();
        let setter = flag.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Terrain atlas device lost ({:?}): {}", reason, message);
            setter.mark_lost();
        });
        flag
    }

    pub fn mark_lost(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// wgpu
// ---------------------------------------------------------------------------

struct AtlasTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Three GPU atlas textures written through the queue
pub struct WgpuAtlasBackend {
    queue: wgpu::Queue,
    textures: [AtlasTexture; 3],
    chunk_texture_size: u32,
    lost: DeviceLostFlag,
}

impl WgpuAtlasBackend {
    /// Create the atlas textures. Uploads stop once `lost` is marked; the
    /// device's lost callback is left to the caller.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        header: &TerrainHeader,
        slots_per_row: u32,
        lost: DeviceLostFlag,
    ) -> Result<Self> {
        let extent = atlas_extent(header, slots_per_row);
        let max_dimension = device.limits().max_texture_dimension_2d;
        if extent > max_dimension {
            return Err(Error::Gpu(format!(
                "atlas of {} slots per row needs {}px textures, device limit is {}px",
                slots_per_row, extent, max_dimension
            )));
        }

        let textures = PayloadKind::ALL.map(|kind| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(match kind {
                    PayloadKind::Heightmap => "terrain_heightmap_atlas",
                    PayloadKind::NormalMap => "terrain_normal_atlas",
                    PayloadKind::ControlMap => "terrain_control_atlas",
                }),
                size: wgpu::Extent3d {
                    width: extent,
                    height: extent,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: atlas_format(kind),
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            AtlasTexture { texture, view }
        });

        let bytes: u64 = PayloadKind::ALL
            .iter()
            .map(|&kind| extent as u64 * extent as u64 * kind.bytes_per_texel() as u64)
            .sum();
        log::info!(
            "Created terrain atlas: {}x{} slots, {}px, {}MB",
            slots_per_row,
            slots_per_row,
            extent,
            bytes / 1024 / 1024
        );

        Ok(Self {
            queue: queue.clone(),
            textures,
            chunk_texture_size: header.chunk_texture_size,
            lost,
        })
    }

    pub fn texture(&self, kind: PayloadKind) -> &wgpu::Texture {
        &self.textures[kind.index()].texture
    }

    pub fn view(&self, kind: PayloadKind) -> &wgpu::TextureView {
        &self.textures[kind.index()].view
    }
}

impl AtlasBackend for WgpuAtlasBackend {
    fn upload(&mut self, kind: PayloadKind, slot: UVec2, bytes: &[u8]) {
        let tex = self.chunk_texture_size;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.textures[kind.index()].texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: slot.x * tex,
                    y: slot.y * tex,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(tex * kind.bytes_per_texel()),
                rows_per_image: Some(tex),
            },
            wgpu::Extent3d {
                width: tex,
                height: tex,
                depth_or_array_layers: 1,
            },
        );
    }

    fn is_lost(&self) -> bool {
        self.lost.is_lost()
    }
}

// ---------------------------------------------------------------------------
// CPU memory
// ---------------------------------------------------------------------------

/// CPU-side atlas images, for headless tools and tests
pub struct MemoryAtlasBackend {
    images: [Vec<u8>; 3],
    extent: u32,
    chunk_texture_size: u32,
    uploads: usize,
    lost: bool,
}

impl MemoryAtlasBackend {
    pub fn new(header: &TerrainHeader, slots_per_row: u32) -> Self {
        let extent = atlas_extent(header, slots_per_row);
        let images = PayloadKind::ALL
            .map(|kind| vec![0u8; (extent * extent * kind.bytes_per_texel()) as usize]);
        Self {
            images,
            extent,
            chunk_texture_size: header.chunk_texture_size,
            uploads: 0,
            lost: false,
        }
    }

    /// Bytes of texel `(x, y)` within `slot`
    pub fn texel(&self, kind: PayloadKind, slot: UVec2, x: u32, y: u32) -> &[u8] {
        let bpt = kind.bytes_per_texel() as usize;
        let tex = self.chunk_texture_size;
        let ax = (slot.x * tex + x) as usize;
        let ay = (slot.y * tex + y) as usize;
        let start = (ay * self.extent as usize + ax) * bpt;
        &self.images[kind.index()][start..start + bpt]
    }

    /// Copy the full chunk texture held by `slot`
    pub fn read_slot(&self, kind: PayloadKind, slot: UVec2) -> Vec<u8> {
        let tex = self.chunk_texture_size;
        let mut bytes = Vec::with_capacity((tex * tex * kind.bytes_per_texel()) as usize);
        for y in 0..tex {
            for x in 0..tex {
                bytes.extend_from_slice(self.texel(kind, slot, x, y));
            }
        }
        bytes
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn set_lost(&mut self, lost: bool) {
        self.lost = lost;
    }
}

impl AtlasBackend for MemoryAtlasBackend {
    fn upload(&mut self, kind: PayloadKind, slot: UVec2, bytes: &[u8]) {
        let bpt = kind.bytes_per_texel() as usize;
        let tex = self.chunk_texture_size as usize;
        let row_bytes = tex * bpt;
        let image = &mut self.images[kind.index()];

        for (row, src) in bytes.chunks_exact(row_bytes).take(tex).enumerate() {
            let ay = slot.y as usize * tex + row;
            let start = (ay * self.extent as usize + slot.x as usize * tex) * bpt;
            image[start..start + row_bytes].copy_from_slice(src);
        }
        self.uploads += 1;
    }

    fn is_lost(&self) -> bool {
        self.lost
    }
}
