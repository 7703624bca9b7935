use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, black_box};
use glam::{UVec2, Vec3};

use terrastream::core::LodConfig;
use terrastream::lod::{ChunkResidency, TerrainLodManager};
use terrastream::streaming::{PayloadKinds, StreamingEngine};
use terrastream::terrain::{
    BakeSettings, NoiseHeightfield, NoiseParams, PackedTerrainProvider, TerrainBaker, TerrainData,
    TerrainDataProvider, TerrainHeader,
};

/// Every chunk resident, slot derived from the index
struct AllResident;

impl ChunkResidency for AllResident {
    fn request_chunk(&mut self, _chunk_index: u32) -> bool {
        true
    }

    fn slot_coord(&self, chunk_index: u32) -> Option<UVec2> {
        Some(UVec2::new(chunk_index % 64, chunk_index / 64))
    }
}

fn bench_quadtree_update(c: &mut Criterion) {
    // 16k texels, 64-texel chunks, 9 LODs
    let header = TerrainHeader::new(64, 65, 16384, 1.0, 500.0, 8);
    let terrain = Arc::new(TerrainData::with_contiguous_layout(header).expect("layout"));
    let config = LodConfig {
        lod_distances: vec![96.0, 192.0, 384.0],
        ..Default::default()
    };
    let mut manager = TerrainLodManager::new(terrain, config, Vec3::ZERO);
    let mut residency = AllResident;

    c.bench_function("quadtree_update_moving_camera", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame += 1;
            let camera = Vec3::new(
                8192.0 + (frame as f32 * 0.01).sin() * 4000.0,
                100.0,
                8192.0 + (frame as f32 * 0.01).cos() * 4000.0,
            );
            manager.update(black_box(camera), &mut residency);
            manager.leaves().len()
        });
    });
}

fn bench_streaming_throughput(c: &mut Criterion) {
    let settings = BakeSettings {
        chunk_size: 64,
        size: 1024,
        units_per_texel: 1.0,
        max_height: 200.0,
        max_lod: 4,
    };
    let field = NoiseHeightfield::new(NoiseParams::default());
    let asset = TerrainBaker::new(settings)
        .expect("baker")
        .bake(|x, y| field.height_at(x, y))
        .expect("bake");
    let bytes: Arc<[u8]> = asset.to_packed_bytes().expect("pack").into();
    let provider = PackedTerrainProvider::from_bytes(bytes).expect("provider");
    let chunk_count = provider.terrain_data().chunk_count() as u32;
    let mut engine = StreamingEngine::<u32>::from_provider("bench", &provider, 64).expect("engine");

    c.bench_function("stream_64_chunks_all_payloads", |b| {
        b.iter(|| {
            for i in 0..64 {
                engine.request(PayloadKinds::all(), i % chunk_count, i);
            }
            let mut done = 0;
            while done < 64 {
                done += engine.process_pending_completions(0, |completion, _| {
                    black_box(completion.try_get_heightmap());
                });
            }
            done
        });
    });
}

criterion_group!(benches, bench_quadtree_update, bench_streaming_throughput);
criterion_main!(benches);
