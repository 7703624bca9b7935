//! GPU storage buffers for the selected leaves

use crate::lod::chunk::GpuChunkData;

/// Smallest buffer ever created; keeps bindings valid before the first upload
const MIN_BUFFER_BYTES: u64 = 256;

/// Storage buffer that is recreated larger when an upload does not fit
struct GrowableBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl GrowableBuffer {
    fn new(device: &wgpu::Device, label: &'static str, capacity: u64) -> Self {
        let capacity = capacity.max(MIN_BUFFER_BYTES);
        Self {
            label,
            buffer: create_storage_buffer(device, label, capacity),
            capacity,
        }
    }

    /// Write `bytes` at offset 0. Returns true if the buffer was recreated.
    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, bytes: &[u8]) -> bool {
        let needed = bytes.len() as u64;
        let mut grown = false;
        if needed > self.capacity {
            let capacity = needed.next_power_of_two().max(MIN_BUFFER_BYTES);
            log::debug!("Growing {} buffer: {} -> {} bytes", self.label, self.capacity, capacity);
            self.buffer = create_storage_buffer(device, self.label, capacity);
            self.capacity = capacity;
            grown = true;
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytes);
        }
        grown
    }
}

fn create_storage_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn read_only_storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Chunk data, sector map and visible-index buffers plus their bind group
pub struct TerrainGpuBuffers {
    chunk_data: GrowableBuffer,
    sector_map: GrowableBuffer,
    visible: GrowableBuffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl TerrainGpuBuffers {
    /// Buffers sized for `expected_leaves` leaves and a sector map of `sectors` cells.
    pub fn new(device: &wgpu::Device, expected_leaves: usize, sectors: usize) -> Self {
        let chunk_bytes = (expected_leaves * std::mem::size_of::<GpuChunkData>()) as u64;
        let chunk_data = GrowableBuffer::new(device, "terrain_chunk_data", chunk_bytes);
        let sector_map = GrowableBuffer::new(device, "terrain_sector_map", (sectors * 4) as u64);
        let visible = GrowableBuffer::new(device, "terrain_visible_chunks", (expected_leaves * 4) as u64);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("terrain_chunks_bind_group_layout"),
            entries: &[
                // binding 0: chunk data
                read_only_storage_entry(0),
                // binding 1: sector map
                read_only_storage_entry(1),
                // binding 2: visible leaf indices
                read_only_storage_entry(2),
            ],
        });
        let bind_group = create_bind_group(device, &bind_group_layout, &chunk_data, &sector_map, &visible);

        Self {
            chunk_data,
            sector_map,
            visible,
            bind_group_layout,
            bind_group,
        }
    }

    /// Upload one frame's leaf data. Returns true if the bind group was rebuilt.
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        chunk_data: &[GpuChunkData],
        sector_map: &[i32],
        visible: &[u32],
    ) -> bool {
        let mut rebuilt = self.chunk_data.write(device, queue, bytemuck::cast_slice(chunk_data));
        rebuilt |= self.sector_map.write(device, queue, bytemuck::cast_slice(sector_map));
        rebuilt |= self.visible.write(device, queue, bytemuck::cast_slice(visible));

        if rebuilt {
            self.bind_group = create_bind_group(
                device,
                &self.bind_group_layout,
                &self.chunk_data,
                &self.sector_map,
                &self.visible,
            );
        }
        rebuilt
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn chunk_data_buffer(&self) -> &wgpu::Buffer {
        &self.chunk_data.buffer
    }

    pub fn sector_map_buffer(&self) -> &wgpu::Buffer {
        &self.sector_map.buffer
    }

    pub fn visible_buffer(&self) -> &wgpu::Buffer {
        &self.visible.buffer
    }
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    chunk_data: &GrowableBuffer,
    sector_map: &GrowableBuffer,
    visible: &GrowableBuffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("terrain_chunks_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: chunk_data.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: sector_map.buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: visible.buffer.as_entire_binding(),
            },
        ],
    })
}
