//! Noise-based procedural heightfields for baking

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

/// Parameters controlling the height function
#[derive(Clone, Debug)]
pub struct NoiseParams {
    pub seed: u32,
    pub scale: f32,       // Horizontal scale in texels (larger = smoother)
    pub octaves: u32,     // FBM octaves (detail levels)
    pub persistence: f32, // FBM persistence (0.5 typical)
    pub lacunarity: f32,  // FBM lacunarity (2.0 typical)
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 150.0,
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Fractal Brownian motion height function over texel coordinates
pub struct NoiseHeightfield {
    params: NoiseParams,
    noise: Fbm<Perlin>,
}

impl NoiseHeightfield {
    pub fn new(params: NoiseParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Normalized height (0..=1) at texel `(x, y)`
    pub fn height_at(&self, x: u32, y: u32) -> f32 {
        let nx = (x as f32 / self.params.scale) as f64;
        let ny = (y as f32 / self.params.scale) as f64;
        // Fbm output is roughly [-1, 1]
        let value = (self.noise.get([nx, ny]) + 1.0) * 0.5;
        value.clamp(0.0, 1.0) as f32
    }
}
