//! Seeded fingerprint profile generation.
//!
//! Every choice is driven by one [`SeededLcg`] in a fixed draw order, so a seed string
//! fully determines the resulting profile. The platform is drawn first and selects
//! the GPU, resolution and timezone pools, which keeps every profile inside one
//! plausibility cluster.

use super::profile::{
    AudioProfile, CanvasProfile, FingerprintProfile, FontProfile, MeasurementMethod,
    NavigatorProfile, NoiseAlgorithm, PlatformFamily, ScreenProfile, TimezoneProfile,
    WebGlProfile,
};
use super::rng::{hash_seed, SeededLcg};
use super::tables;
use std::collections::BTreeSet;

/// Chrome build used when deriving user agents.
pub const DEFAULT_CHROME_VERSION: &str = "120.0.6099.109";

/// Generator for complete, internally consistent fingerprint profiles.
#[derive(Debug, Clone, Default)]
pub struct FingerprintGenerator;

impl FingerprintGenerator {
    /// Create a new fingerprint generator
    pub fn new() -> Self {
        Self
    }

    /// Generate a profile. `None` draws a process-random seed; `Some` is fully deterministic.
    pub fn generate(&self, seed: Option<&str>) -> FingerprintProfile {
        match seed {
            Some(seed) => self.generate_consistent(seed),
            None => self.generate_random(),
        }
    }

    /// Generate a profile that is identical for identical seed strings, `""` included.
    pub fn generate_consistent(&self, seed: &str) -> FingerprintProfile {
        self.generate_with_seed(hash_seed(seed))
    }

    /// Generate a profile from a fresh random seed.
    pub fn generate_random(&self) -> FingerprintProfile {
        self.generate_with_seed(rand::random::<u32>() >> 1)
    }

    fn generate_with_seed(&self, seed: u32) -> FingerprintProfile {
        let mut rng = SeededLcg::new(seed);

        let platform = *rng.pick(&tables::PLATFORMS);
        let family = PlatformFamily::from_platform(platform);
        let gpu = *rng.pick(tables::gpu_pool(family));
        let languages: Vec<String> = rng
            .pick(&tables::LANGUAGE_PAIRS)
            .iter()
            .map(|l| l.to_string())
            .collect();
        let (width, height) = *rng.pick(tables::resolution_pool(family));

        let canvas_noise = rng.scaled(0.1, 0.3);
        let canvas_seed = (rng.next_f64() * 1_000_000.0).floor() as u32;
        let audio_noise = rng.scaled(0.05, 0.15);
        let audio_seed = (rng.next_f64() * 1_000_000.0).floor() as u32;

        let hardware_concurrency = *rng.pick(&tables::HARDWARE_CONCURRENCY);
        // Desktop Windows Chrome reports no touch points.
        let max_touch_points = match family {
            PlatformFamily::Windows => 0,
            _ => rng.below(5),
        };
        let device_memory = *rng.pick(&tables::DEVICE_MEMORY_GB);
        let pixel_ratio = 1 + rng.below(2);

        let available_fonts = self.pick_fonts(&mut rng);
        let timezone = *rng.pick(tables::timezone_pool(platform));

        FingerprintProfile {
            canvas: CanvasProfile {
                noise_amplitude: canvas_noise,
                seed: canvas_seed,
                algorithm: NoiseAlgorithm::Gaussian,
                enabled: true,
            },
            webgl: WebGlProfile {
                vendor: gpu.vendor.to_string(),
                renderer: gpu.renderer.to_string(),
                unmasked_vendor: gpu.vendor.to_string(),
                unmasked_renderer: gpu.renderer.to_string(),
                enabled: true,
            },
            audio: AudioProfile {
                noise_amplitude: audio_noise,
                seed: audio_seed,
                enabled: true,
            },
            navigator: NavigatorProfile {
                platform: platform.to_string(),
                language: languages[0].clone(),
                languages,
                hardware_concurrency,
                max_touch_points,
                device_memory,
                enabled: true,
            },
            screen: ScreenProfile {
                width,
                height,
                pixel_ratio,
                color_depth: tables::COLOR_DEPTH,
                enabled: true,
            },
            fonts: FontProfile {
                available_fonts,
                measurement_method: MeasurementMethod::Canvas,
                enabled: true,
            },
            timezone: TimezoneProfile {
                name: timezone.name.to_string(),
                utc_offset_minutes: timezone.utc_offset_minutes,
                enabled: true,
            },
        }
    }

    fn pick_fonts(&self, rng: &mut SeededLcg) -> BTreeSet<String> {
        let span = (tables::MAX_FONTS - tables::MIN_FONTS + 1) as u32;
        let count = tables::MIN_FONTS + rng.below(span) as usize;

        let mut pool = tables::FONT_POOL;
        rng.shuffle(&mut pool);
        pool.iter().take(count).map(|f| f.to_string()).collect()
    }
}

/// Generate a profile with the default generator.
pub fn generate(seed: Option<&str>) -> FingerprintProfile {
    FingerprintGenerator::new().generate(seed)
}

/// Derive a Chrome user agent matching `navigator.platform`.
///
/// Unknown platforms get the Windows string.
pub fn user_agent_for(platform: &str, chrome_version: &str) -> String {
    let os = match platform {
        "MacIntel" => "Macintosh; Intel Mac OS X 10_15_7",
        "Linux x86_64" => "X11; Linux x86_64",
        "Linux i686" => "X11; Linux i686",
        _ => "Windows NT 10.0; Win64; x64",
    };
    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        os, chrome_version
    )
}
