// src/world/generator.rs

use noise::NoiseFn;

use crate::config::GeneratorConfig;
use crate::error::ConfigError;
use crate::world::gradient::GradientNoise;

/// Fractal (fBm) height field over gradient noise.
///
/// Octave `i` samples at frequency `2^i / 2^(octaves-1)` with amplitude
/// `roughness^i * amplitude`, so octave 0 is the broadest, tallest layer and
/// the last octave samples at unit frequency.
#[derive(Clone)]
pub struct HeightFieldGenerator {
    noise: GradientNoise,
    octaves: u32,
    offset: f32,
    freqs: Vec<f32>,
    amps: Vec<f32>,
    // Σ amps; |sample - offset| never exceeds this.
    extent: f32,
}

impl HeightFieldGenerator {
    pub fn new(cfg: &GeneratorConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;

        let noise = match cfg.seed {
            Some(seed) => GradientNoise::seeded(seed),
            None => GradientNoise::canonical(),
        };

        let top = (1u64 << (cfg.octaves - 1).min(63)) as f32;
        let mut freqs = Vec::with_capacity(cfg.octaves as usize);
        let mut amps = Vec::with_capacity(cfg.octaves as usize);
        let mut amp = cfg.amplitude;
        for i in 0..cfg.octaves {
            freqs.push((1u64 << i.min(63)) as f32 / top);
            amps.push(amp);
            amp *= cfg.roughness;
        }
        let extent = amps.iter().sum();

        Ok(Self {
            noise,
            octaves: cfg.octaves,
            offset: cfg.height_offset,
            freqs,
            amps,
            extent,
        })
    }

    pub fn octaves(&self) -> u32 {
        self.octaves
    }

    /// Inclusive range every sample falls into.
    pub fn bounds(&self) -> (f32, f32) {
        (self.offset - self.extent, self.offset + self.extent)
    }

    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let mut h = 0.0;
        for (f, a) in self.freqs.iter().zip(&self.amps) {
            h += self.noise.noise2(x * f, y * f) * a;
        }
        h + self.offset
    }

    #[inline]
    pub fn sample3(&self, x: f32, y: f32, z: f32) -> f32 {
        let mut h = 0.0;
        for (f, a) in self.freqs.iter().zip(&self.amps) {
            h += self.noise.noise3(x * f, y * f, z * f) * a;
        }
        h + self.offset
    }
}

impl NoiseFn<f64, 2> for HeightFieldGenerator {
    fn get(&self, point: [f64; 2]) -> f64 {
        self.sample(point[0] as f32, point[1] as f32) as f64
    }
}

impl NoiseFn<f64, 3> for HeightFieldGenerator {
    fn get(&self, point: [f64; 3]) -> f64 {
        self.sample3(point[0] as f32, point[1] as f32, point[2] as f32) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen(octaves: u32, amplitude: f32, roughness: f32, seed: Option<u64>) -> HeightFieldGenerator {
        HeightFieldGenerator::new(&GeneratorConfig {
            octaves,
            amplitude,
            roughness,
            seed,
            height_offset: 0.0,
        })
        .unwrap()
    }

    #[test]
    fn single_octave_is_scaled_noise() {
        let g = gen(1, 10.0, 0.5, None);
        let n = GradientNoise::canonical();
        assert_eq!(g.sample(0.3, 0.7), n.noise2(0.3, 0.7) * 10.0);
        assert_eq!(g.bounds(), (-10.0, 10.0));
    }

    #[test]
    fn bounds_sum_the_octave_amplitudes() {
        let g = gen(3, 8.0, 0.5, Some(3));
        assert_eq!(g.bounds(), (-14.0, 14.0));
        for i in 0..2000 {
            let x = i as f32 * 1.37 - 900.0;
            let h = g.sample(x, x * 0.71 + 4.0);
            assert!(h >= -14.0 && h <= 14.0);
        }
    }

    #[test]
    fn offset_shifts_samples_and_bounds() {
        let base = gen(4, 5.0, 0.6, Some(11));
        let shifted = HeightFieldGenerator::new(&GeneratorConfig {
            octaves: 4,
            amplitude: 5.0,
            roughness: 0.6,
            seed: Some(11),
            height_offset: 3.0,
        })
        .unwrap();
        assert_eq!(shifted.sample(12.5, -3.25), base.sample(12.5, -3.25) + 3.0);
        assert_eq!(shifted.bounds().0, base.bounds().0 + 3.0);
    }

    #[test]
    fn invalid_parameters_fail() {
        let cfg = GeneratorConfig { octaves: 0, ..Default::default() };
        assert_eq!(HeightFieldGenerator::new(&cfg).err(), Some(ConfigError::ZeroOctaves));
        let cfg = GeneratorConfig { roughness: 1.5, ..Default::default() };
        assert!(HeightFieldGenerator::new(&cfg).is_err());
    }
}
