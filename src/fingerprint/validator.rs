//! Consistency and detectability scoring.
//!
//! The validator is advisory. It never mutates a profile and never blocks a context
//! from starting; callers log low scores and carry on.

use super::profile::FingerprintProfile;
use super::tables::COMMON_RESOLUTIONS;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const CANVAS_NOISE_PENALTY: u8 = 10;
pub const GPU_COMBINATION_PENALTY: u8 = 20;
pub const TOUCH_POINTS_PENALTY: u8 = 15;
pub const RESOLUTION_PENALTY: u8 = 5;

/// Canvas noise amplitudes outside this range are considered detectable.
pub const CANVAS_NOISE_MIN: f64 = 0.05;
pub const CANVAS_NOISE_MAX: f64 = 0.5;

// Cardinality estimates per surface, used for the entropy figure.
const CANVAS_CARDINALITY: f64 = 100.0;
const WEBGL_CARDINALITY: f64 = 50.0;
const AUDIO_CARDINALITY: f64 = 20.0;
const NAVIGATOR_CARDINALITY: f64 = 200.0;
const SCREEN_CARDINALITY: f64 = 20.0;
const FONTS_CARDINALITY: f64 = 64.0;
const TIMEZONE_CARDINALITY: f64 = 24.0;

/// Vendor/renderer regex pairs. A GPU is plausible when any one pair matches both.
static GPU_FAMILIES: Lazy<Vec<(Regex, Regex)>> = Lazy::new(|| {
    [
        (r"(?i)NVIDIA", r"(?i)GeForce|Quadro|Tesla"),
        (r"(?i)AMD|ATI Technologies", r"(?i)Radeon|FirePro"),
        (r"(?i)Intel", r"(?i)Intel.*Graphics"),
        (r"(?i)Apple", r"(?i)Apple (M\d|GPU)"),
        (r"(?i)Google Inc\.", r"(?i)ANGLE"),
    ]
    .iter()
    .filter_map(|(vendor, renderer)| Some((Regex::new(vendor).ok()?, Regex::new(renderer).ok()?)))
    .collect()
});

/// Advisory finding about a profile.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    DetectableCanvasNoise { amplitude: f64 },
    InvalidGpuCombination { vendor: String, renderer: String },
    InconsistentTouchPoints { platform: String, max_touch_points: u32 },
    UncommonResolution { width: u32, height: u32 },
}

impl ValidationWarning {
    /// Points deducted from the score for this finding.
    pub fn penalty(&self) -> u8 {
        match self {
            ValidationWarning::DetectableCanvasNoise { .. } => CANVAS_NOISE_PENALTY,
            ValidationWarning::InvalidGpuCombination { .. } => GPU_COMBINATION_PENALTY,
            ValidationWarning::InconsistentTouchPoints { .. } => TOUCH_POINTS_PENALTY,
            ValidationWarning::UncommonResolution { .. } => RESOLUTION_PENALTY,
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::DetectableCanvasNoise { amplitude } => write!(
                f,
                "Canvas: detectable noise level {:.3} (expected {}-{})",
                amplitude, CANVAS_NOISE_MIN, CANVAS_NOISE_MAX
            ),
            ValidationWarning::InvalidGpuCombination { vendor, renderer } => write!(
                f,
                "WebGL: invalid GPU combination \"{}\" / \"{}\"",
                vendor, renderer
            ),
            ValidationWarning::InconsistentTouchPoints {
                platform,
                max_touch_points,
            } => write!(
                f,
                "Navigator: {} touch points inconsistent with platform {}",
                max_touch_points, platform
            ),
            ValidationWarning::UncommonResolution { width, height } => {
                write!(f, "Screen: uncommon resolution {}x{}", width, height)
            }
        }
    }
}

/// Result of scoring a profile. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    /// 0-100, higher is better.
    pub score: u8,
    pub issues: Vec<String>,
    /// True exactly when `issues` is empty.
    pub is_consistent: bool,
    pub entropy_bits: f64,
}

/// Scores profiles for internal consistency and estimates their entropy.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyValidator;

impl ConsistencyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Score a profile. Starts at 100, subtracts each finding's penalty, floors at 0.
    pub fn validate(&self, profile: &FingerprintProfile) -> QualityReport {
        let warnings = self.warnings(profile);

        let deducted: u32 = warnings.iter().map(|w| u32::from(w.penalty())).sum();
        let score = 100u32.saturating_sub(deducted) as u8;
        let issues: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();

        QualityReport {
            score,
            is_consistent: issues.is_empty(),
            issues,
            entropy_bits: self.entropy_bits(profile),
        }
    }

    /// Findings in check order: canvas, WebGL, touch points, resolution.
    /// Disabled surfaces are never injected and are not checked.
    pub fn warnings(&self, profile: &FingerprintProfile) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let amplitude = profile.canvas.noise_amplitude;
        if profile.canvas.enabled && !(CANVAS_NOISE_MIN..=CANVAS_NOISE_MAX).contains(&amplitude) {
            warnings.push(ValidationWarning::DetectableCanvasNoise { amplitude });
        }

        if profile.webgl.enabled && !is_valid_gpu(&profile.webgl.vendor, &profile.webgl.renderer) {
            warnings.push(ValidationWarning::InvalidGpuCombination {
                vendor: profile.webgl.vendor.clone(),
                renderer: profile.webgl.renderer.clone(),
            });
        }

        if profile.navigator.enabled
            && !touch_points_consistent(&profile.navigator.platform, profile.navigator.max_touch_points)
        {
            warnings.push(ValidationWarning::InconsistentTouchPoints {
                platform: profile.navigator.platform.clone(),
                max_touch_points: profile.navigator.max_touch_points,
            });
        }

        if profile.screen.enabled && !is_common_resolution(profile.screen.width, profile.screen.height) {
            warnings.push(ValidationWarning::UncommonResolution {
                width: profile.screen.width,
                height: profile.screen.height,
            });
        }

        warnings
    }

    /// Sum of `log2(cardinality)` over enabled surfaces.
    pub fn entropy_bits(&self, profile: &FingerprintProfile) -> f64 {
        [
            (profile.canvas.enabled, CANVAS_CARDINALITY),
            (profile.webgl.enabled, WEBGL_CARDINALITY),
            (profile.audio.enabled, AUDIO_CARDINALITY),
            (profile.navigator.enabled, NAVIGATOR_CARDINALITY),
            (profile.screen.enabled, SCREEN_CARDINALITY),
            (profile.fonts.enabled, FONTS_CARDINALITY),
            (profile.timezone.enabled, TIMEZONE_CARDINALITY),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, cardinality)| cardinality.log2())
        .sum()
    }
}

/// Score a profile with the default validator.
pub fn validate(profile: &FingerprintProfile) -> QualityReport {
    ConsistencyValidator::new().validate(profile)
}

/// Whether a vendor/renderer pair belongs to a known GPU family.
pub fn is_valid_gpu(vendor: &str, renderer: &str) -> bool {
    GPU_FAMILIES
        .iter()
        .any(|(v, r)| v.is_match(vendor) && r.is_match(renderer))
}

pub fn is_common_resolution(width: u32, height: u32) -> bool {
    COMMON_RESOLUTIONS.contains(&(width, height))
}

/// Platform/touch-point hook. Currently accepts every combination.
fn touch_points_consistent(_platform: &str, _max_touch_points: u32) -> bool {
    true
}
