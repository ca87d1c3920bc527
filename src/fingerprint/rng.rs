//! Random sources for the fingerprint subsystem.
//!
//! There are two of them and they must never be mixed up:
//!
//! - [`SeededLcg`] is fully reproducible. The same seed string always yields the
//!   same sequence, so a profile generated for an account is stable across restarts.
//! - [`FreshNoise`] draws from the thread-local OS-seeded generator on every call.
//!   It drives per-call canvas, audio and draw jitter. If it were reproducible the
//!   "noise" would itself become a stable fingerprint.

use rand::Rng;

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT: u64 = 49297;
const LCG_MODULUS: u64 = 233_280;

/// Hash a seed string to a non-negative 32-bit integer.
///
/// Rolling `hash * 31 + unit` over UTF-16 code units with 32-bit wraparound,
/// then the absolute value. The empty string hashes to 0.
pub fn hash_seed(seed: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in seed.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

/// Reproducible linear-congruential generator used for profile generation.
#[derive(Debug, Clone)]
pub struct SeededLcg {
    state: u64,
}

impl SeededLcg {
    /// Create a generator from an already-hashed seed.
    pub fn new(seed: u32) -> Self {
        Self {
            state: u64::from(seed),
        }
    }

    /// Create a generator from a seed string.
    pub fn from_seed_str(seed: &str) -> Self {
        Self::new(hash_seed(seed))
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }

    /// Uniform index into a table of `len` entries. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        let scaled = (self.next_f64() * len as f64).floor() as usize;
        scaled.min(len.saturating_sub(1))
    }

    /// Integer in `[0, n)`.
    pub fn below(&mut self, n: u32) -> u32 {
        self.index(n as usize) as u32
    }

    /// `base + r * span` for the next draw `r`.
    pub fn scaled(&mut self, base: f64, span: f64) -> f64 {
        base + self.next_f64() * span
    }

    /// Pick one entry of a non-empty table.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.index(items.len())]
    }

    /// In-place Fisher–Yates shuffle driven by this generator.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }
}

/// Non-reproducible noise for per-call perturbation.
///
/// Holds no state; each draw goes to `rand::thread_rng()`, so the type is freely
/// shareable across threads and across overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshNoise;

impl FreshNoise {
    /// Uniform value in `[0, 1)`.
    pub fn unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    /// Uniform value in `[-amplitude, amplitude]`.
    pub fn uniform(&self, amplitude: f64) -> f64 {
        if !(amplitude > 0.0) {
            return 0.0;
        }
        rand::thread_rng().gen_range(-amplitude..=amplitude)
    }

    /// Normal value with sigma `amplitude / 2`, clamped to `[-amplitude, amplitude]`.
    pub fn gaussian(&self, amplitude: f64) -> f64 {
        if !(amplitude > 0.0) {
            return 0.0;
        }
        let mut rng = rand::thread_rng();
        // Box-Muller; u1 is kept away from zero so ln() stays finite.
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen::<f64>();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        (z * amplitude / 2.0).clamp(-amplitude, amplitude)
    }

    /// Fresh 64-bit value, used to seed per-call lattice noise.
    pub fn next_u64(&self) -> u64 {
        rand::thread_rng().gen::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_seed_known_values() {
        assert_eq!(hash_seed(""), 0);
        assert_eq!(hash_seed("a"), 97);
        // 97 * 31 + 98
        assert_eq!(hash_seed("ab"), 3105);
    }

    #[test]
    fn test_hash_seed_wraps_and_stays_non_negative() {
        let long = "x".repeat(200);
        let _ = hash_seed(&long);
        assert_eq!(hash_seed(&long), hash_seed(&long));
    }

    #[test]
    fn test_lcg_sequence_matches_recurrence() {
        let mut lcg = SeededLcg::new(0);
        let first = lcg.next_f64();
        assert!((first - 49297.0 / 233280.0).abs() < 1e-12);

        let second_state = (49297u64 * 9301 + 49297) % 233280;
        let second = lcg.next_f64();
        assert!((second - second_state as f64 / 233280.0).abs() < 1e-12);
    }

    #[test]
    fn test_lcg_is_reproducible() {
        let mut a = SeededLcg::from_seed_str("account-1");
        let mut b = SeededLcg::from_seed_str("account-1");
        for _ in 0..100 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn test_index_stays_in_bounds() {
        let mut lcg = SeededLcg::new(12345);
        for _ in 0..1000 {
            assert!(lcg.index(7) < 7);
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut lcg = SeededLcg::new(99);
        let mut items: Vec<u32> = (0..16).collect();
        lcg.shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_fresh_noise_bounds() {
        let noise = FreshNoise;
        for _ in 0..1000 {
            assert!(noise.uniform(3.0).abs() <= 3.0);
            assert!(noise.gaussian(3.0).abs() <= 3.0);
        }
        assert_eq!(noise.uniform(0.0), 0.0);
        assert_eq!(noise.gaussian(f64::NAN), 0.0);
    }
}
