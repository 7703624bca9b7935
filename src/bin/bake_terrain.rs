//! Terrain baker binary: writes a procedural terrain asset to disk.
//!
//! Usage: cargo run --release --bin bake_terrain -- [OPTIONS]
//!
//! Options:
//!   --size <TEXELS>        Terrain edge in LOD-0 texels (default: 2048)
//!   --chunk-size <TEXELS>  Chunk edge in LOD-0 texels (default: 64)
//!   --max-lod <N>          Coarsest LOD, a single root chunk (default: 5)
//!   --seed <SEED>          Noise seed (default: 12345)
//!   --scale <SCALE>        Noise scale in texels (default: 300.0)
//!   --height <H>           Maximum height in world units (default: 250.0)
//!   --units <U>            World units per texel (default: 1.0)
//!   --out <PATH>           Output path without extension (default: "assets/terrain/world")
//!   --packed               Write a single .tpak instead of .terrain + .blob
//!   --jobs <N>             Max parallel chunk encoders (default: all cores)
//!
//! Output:
//!   <out>.terrain + <out>.blob    (default)
//!   <out>.tpak                    (with --packed)

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use terrastream::core::{logging, Result};
use terrastream::terrain::provider::{BLOB_EXTENSION, DATA_EXTENSION, PACKED_EXTENSION};
use terrastream::terrain::{BakeSettings, NoiseHeightfield, NoiseParams, TerrainBaker};

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Bake failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let settings = BakeSettings {
        size: parse_u32_arg(&args, "--size").unwrap_or(2048),
        chunk_size: parse_u32_arg(&args, "--chunk-size").unwrap_or(64),
        max_lod: parse_u32_arg(&args, "--max-lod").unwrap_or(5),
        max_height: parse_f32_arg(&args, "--height").unwrap_or(250.0),
        units_per_texel: parse_f32_arg(&args, "--units").unwrap_or(1.0),
    };
    let noise_params = NoiseParams {
        seed: parse_u32_arg(&args, "--seed").unwrap_or(12345),
        scale: parse_f32_arg(&args, "--scale").unwrap_or(300.0),
        ..Default::default()
    };
    let out = PathBuf::from(parse_str_arg(&args, "--out").unwrap_or_else(|| "assets/terrain/world".to_string()));
    let packed = args.iter().any(|a| a == "--packed");

    if let Some(jobs) = parse_usize_arg(&args, "--jobs") {
        // Caps peak memory on large terrains
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            log::warn!("Could not configure thread pool: {}", e);
        }
    }

    println!("=== Terrastream Terrain Baker ===");
    println!("Size:   {} texels, chunk {} texels, max LOD {}", settings.size, settings.chunk_size, settings.max_lod);
    println!("Height: {} units, {} units/texel", settings.max_height, settings.units_per_texel);
    println!("Noise:  seed {}, scale {}", noise_params.seed, noise_params.scale);
    println!();

    let start = Instant::now();
    let baker = TerrainBaker::new(settings)?;
    let field = NoiseHeightfield::new(noise_params);
    let asset = baker.bake(|x, y| field.height_at(x, y))?;
    let bake_time = start.elapsed();

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if packed {
        asset.write_packed(&out.with_extension(PACKED_EXTENSION))?;
    } else {
        asset.write_files(&out.with_extension(DATA_EXTENSION), &out.with_extension(BLOB_EXTENSION))?;
    }

    println!();
    println!("=== Bake Complete ===");
    println!("Chunks: {}", asset.data.chunk_count());
    println!("Blob:   {:.1} MB", asset.blob.len() as f64 / (1024.0 * 1024.0));
    println!("Time:   {:.2}s bake, {:.2}s total", bake_time.as_secs_f64(), start.elapsed().as_secs_f64());
    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
