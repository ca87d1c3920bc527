//! Per-call read-path noise for canvas, audio and draw calls.
//!
//! All noise here comes from [`FreshNoise`], so two exports of the same canvas
//! differ. The profile only fixes the amplitude and the distribution.

use crate::fingerprint::{FreshNoise, NoiseAlgorithm};

/// Maximum sub-pixel offset added to text and rect draw coordinates.
pub const DRAW_JITTER: f64 = 0.05;

/// Audio samples are floats in [-1, 1]; the profile amplitude is scaled down to this.
pub const AUDIO_NOISE_SCALE: f64 = 1e-4;

/// Canvas amplitude is expressed in tenths of one 8-bit channel step.
const CANVAS_CHANNEL_SCALE: f64 = 10.0;

/// Lattice spacing, in channel samples, of the smooth noise variant.
const LATTICE_PERIOD: f64 = 8.0;

/// Canvas export perturbation.
#[derive(Debug, Clone)]
pub struct CanvasNoise {
    amplitude: f64,
    algorithm: NoiseAlgorithm,
    noise: FreshNoise,
}

impl CanvasNoise {
    pub fn new(amplitude: f64, algorithm: NoiseAlgorithm) -> Self {
        Self {
            amplitude,
            algorithm,
            noise: FreshNoise,
        }
    }

    pub fn algorithm(&self) -> NoiseAlgorithm {
        self.algorithm
    }

    /// Largest change any one color channel can receive in a single export.
    pub fn max_channel_delta(&self) -> i32 {
        if !(self.amplitude > 0.0) {
            return 0;
        }
        ((self.amplitude * CANVAS_CHANNEL_SCALE).round() as i32).clamp(1, 255)
    }

    /// Perturb RGBA pixel data in place. Alpha is left alone.
    pub fn perturb(&self, rgba: &mut [u8]) {
        let bound = self.max_channel_delta();
        if bound == 0 {
            return;
        }
        let bound_f = f64::from(bound);
        let lattice_seed = self.noise.next_u64();

        for (pixel, chunk) in rgba.chunks_mut(4).enumerate() {
            for (channel, value) in chunk.iter_mut().take(3).enumerate() {
                let delta = match self.algorithm {
                    NoiseAlgorithm::Uniform => self.noise.uniform(bound_f),
                    NoiseAlgorithm::Gaussian => self.noise.gaussian(bound_f),
                    NoiseAlgorithm::Perlin => {
                        let x = (pixel * 3 + channel) as f64 / LATTICE_PERIOD;
                        bound_f * (2.0 * value_noise(lattice_seed, x) - 1.0)
                    }
                };
                let delta = (delta.round() as i32).clamp(-bound, bound);
                *value = (i32::from(*value) + delta).clamp(0, 255) as u8;
            }
        }
    }
}

/// Audio read-path perturbation.
#[derive(Debug, Clone)]
pub struct AudioNoise {
    amplitude: f64,
    noise: FreshNoise,
}

impl AudioNoise {
    pub fn new(amplitude: f64) -> Self {
        Self {
            amplitude,
            noise: FreshNoise,
        }
    }

    /// Largest absolute change to any sample.
    pub fn max_sample_delta(&self) -> f64 {
        self.amplitude.max(0.0) * AUDIO_NOISE_SCALE
    }

    pub fn perturb(&self, samples: &mut [f32]) {
        let bound = self.max_sample_delta();
        for sample in samples.iter_mut() {
            *sample += self.noise.uniform(bound) as f32;
        }
    }
}

/// Sub-pixel jitter on draw coordinates.
#[derive(Debug, Clone, Default)]
pub struct DrawJitter {
    noise: FreshNoise,
}

impl DrawJitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x + self.noise.uniform(DRAW_JITTER),
            y + self.noise.uniform(DRAW_JITTER),
        )
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn lattice(seed: u64, i: u64) -> f64 {
    (splitmix64(seed ^ i.wrapping_mul(0xD6E8_FEB8_6659_FD93)) >> 11) as f64 / (1u64 << 53) as f64
}

/// Smoothly interpolated 1-D value noise in `[0, 1)`.
fn value_noise(seed: u64, x: f64) -> f64 {
    let i0 = x.floor();
    let t = x - i0;
    let s = t * t * (3.0 - 2.0 * t);
    let a = lattice(seed, i0 as u64);
    let b = lattice(seed, i0 as u64 + 1);
    a + (b - a) * s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey(pixels: usize) -> Vec<u8> {
        std::iter::repeat([128u8, 128, 128, 255])
            .take(pixels)
            .flatten()
            .collect()
    }

    #[test]
    fn test_channel_delta_scaling() {
        assert_eq!(CanvasNoise::new(0.0, NoiseAlgorithm::Uniform).max_channel_delta(), 0);
        assert_eq!(CanvasNoise::new(0.01, NoiseAlgorithm::Uniform).max_channel_delta(), 1);
        assert_eq!(CanvasNoise::new(0.3, NoiseAlgorithm::Uniform).max_channel_delta(), 3);
        assert_eq!(CanvasNoise::new(99.0, NoiseAlgorithm::Uniform).max_channel_delta(), 255);
    }

    #[test]
    fn test_canvas_noise_stays_in_bound_for_every_algorithm() {
        for algorithm in [
            NoiseAlgorithm::Uniform,
            NoiseAlgorithm::Gaussian,
            NoiseAlgorithm::Perlin,
        ] {
            let noise = CanvasNoise::new(0.25, algorithm);
            let bound = noise.max_channel_delta();
            let original = grey(256);
            let mut pixels = original.clone();
            noise.perturb(&mut pixels);

            for (i, (a, b)) in original.iter().zip(&pixels).enumerate() {
                let delta = (i32::from(*a) - i32::from(*b)).abs();
                if i % 4 == 3 {
                    assert_eq!(delta, 0, "alpha changed");
                } else {
                    assert!(delta <= bound, "{} exceeds {} with {}", delta, bound, algorithm);
                }
            }
        }
    }

    #[test]
    fn test_canvas_noise_is_fresh_per_call() {
        let noise = CanvasNoise::new(0.4, NoiseAlgorithm::Uniform);
        let mut a = grey(1024);
        let mut b = grey(1024);
        noise.perturb(&mut a);
        noise.perturb(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_canvas_noise_clamps_at_channel_edges() {
        let noise = CanvasNoise::new(0.4, NoiseAlgorithm::Uniform);
        let mut pixels = vec![0u8, 255, 0, 255, 255, 0, 255, 255];
        noise.perturb(&mut pixels);
        assert_eq!(pixels[3], 255);
        assert_eq!(pixels[7], 255);
    }

    #[test]
    fn test_audio_noise_bound() {
        let noise = AudioNoise::new(0.2);
        let mut samples = vec![0.5f32; 512];
        noise.perturb(&mut samples);
        let bound = noise.max_sample_delta() as f32 + f32::EPSILON;
        assert!(samples.iter().all(|s| (s - 0.5).abs() <= bound));
    }

    #[test]
    fn test_draw_jitter_bound() {
        let jitter = DrawJitter::new();
        for _ in 0..1000 {
            let (x, y) = jitter.offset(10.0, 20.0);
            assert!((x - 10.0).abs() <= DRAW_JITTER);
            assert!((y - 20.0).abs() <= DRAW_JITTER);
        }
    }

    #[test]
    fn test_value_noise_range() {
        for i in 0..1000 {
            let v = value_noise(42, i as f64 / 7.0);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
