//! Fingerprint profile data model.
//!
//! A [`FingerprintProfile`] is the complete set of spoofed values presented to one
//! isolated browsing context. Every surface can be switched off independently via
//! its `enabled` flag. Profiles serialize to camelCase JSON so that account records
//! written by other tools can be imported unchanged.
//!
//! # Example
//!
//! ```rust
//! use ki_identity_browser::fingerprint::{generate, FingerprintProfile};
//!
//! let profile = generate(Some("account-1"));
//! let json = profile.to_json().unwrap();
//! let parsed = FingerprintProfile::from_json(&json).unwrap();
//! assert_eq!(profile, parsed);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors produced while generating or importing a fingerprint profile.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The profile JSON could not be parsed.
    #[error("Malformed fingerprint profile: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The profile parsed but one of its fields is unusable.
    #[error("Invalid fingerprint profile field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// Pixel noise distribution used for canvas perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseAlgorithm {
    Uniform,
    Gaussian,
    Perlin,
}

impl Default for NoiseAlgorithm {
    fn default() -> Self {
        Self::Gaussian
    }
}

impl std::fmt::Display for NoiseAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoiseAlgorithm::Uniform => write!(f, "uniform"),
            NoiseAlgorithm::Gaussian => write!(f, "gaussian"),
            NoiseAlgorithm::Perlin => write!(f, "perlin"),
        }
    }
}

/// How font availability is probed by pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMethod {
    Canvas,
    Dom,
}

impl Default for MeasurementMethod {
    fn default() -> Self {
        Self::Canvas
    }
}

/// Coarse operating-system family derived from `navigator.platform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformFamily {
    Windows,
    Mac,
    Linux,
}

impl PlatformFamily {
    /// Classify a `navigator.platform` string. Unknown platforms are treated as Windows.
    pub fn from_platform(platform: &str) -> Self {
        if platform.starts_with("Mac") {
            PlatformFamily::Mac
        } else if platform.starts_with("Linux") {
            PlatformFamily::Linux
        } else {
            PlatformFamily::Windows
        }
    }
}

/// Canvas 2D export perturbation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasProfile {
    /// Upper bound of the per-channel perturbation, as a fraction of one noise unit.
    pub noise_amplitude: f64,
    pub seed: u32,
    #[serde(default)]
    pub algorithm: NoiseAlgorithm,
    pub enabled: bool,
}

/// WebGL vendor and renderer strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebGlProfile {
    pub vendor: String,
    pub renderer: String,
    /// Value returned for `UNMASKED_VENDOR_WEBGL`.
    pub unmasked_vendor: String,
    /// Value returned for `UNMASKED_RENDERER_WEBGL`.
    pub unmasked_renderer: String,
    pub enabled: bool,
}

/// Audio read-path perturbation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProfile {
    pub noise_amplitude: f64,
    pub seed: u32,
    pub enabled: bool,
}

/// Spoofed `navigator` properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorProfile {
    pub platform: String,
    pub language: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    pub max_touch_points: u32,
    /// Device memory in GiB.
    pub device_memory: u32,
    pub enabled: bool,
}

/// Spoofed `screen` properties and device pixel ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenProfile {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: u32,
    pub color_depth: u32,
    pub enabled: bool,
}

impl ScreenProfile {
    /// Height left after an OS taskbar, as reported through `screen.availHeight`.
    pub fn avail_height(&self) -> u32 {
        self.height.saturating_sub(TASKBAR_HEIGHT)
    }
}

/// Pixels reserved for the OS taskbar in `availHeight`.
pub const TASKBAR_HEIGHT: u32 = 40;

/// Fonts a page is allowed to detect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontProfile {
    pub available_fonts: BTreeSet<String>,
    #[serde(default)]
    pub measurement_method: MeasurementMethod,
    pub enabled: bool,
}

/// Spoofed timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneProfile {
    /// IANA zone name, e.g. `America/Chicago`.
    pub name: String,
    /// Minutes east of UTC (New York is -300).
    pub utc_offset_minutes: i32,
    pub enabled: bool,
}

/// Complete synthetic device identity bound to one browsing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintProfile {
    pub canvas: CanvasProfile,
    pub webgl: WebGlProfile,
    pub audio: AudioProfile,
    pub navigator: NavigatorProfile,
    pub screen: ScreenProfile,
    pub fonts: FontProfile,
    pub timezone: TimezoneProfile,
}

impl FingerprintProfile {
    /// Platform family this profile claims to run on.
    pub fn platform_family(&self) -> PlatformFamily {
        PlatformFamily::from_platform(&self.navigator.platform)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, GenerationError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, GenerationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and shape-check a profile supplied from outside the generator.
    pub fn from_json(json: &str) -> Result<Self, GenerationError> {
        let profile: FingerprintProfile = serde_json::from_str(json)?;
        profile.check_shape()?;
        Ok(profile)
    }

    /// Reject profiles the injection engine cannot present coherently.
    ///
    /// This is structural only; plausibility is the validator's job.
    pub fn check_shape(&self) -> Result<(), GenerationError> {
        if self.navigator.languages.is_empty() {
            return Err(GenerationError::InvalidField {
                field: "navigator.languages",
                reason: "at least one language is required".to_string(),
            });
        }
        if self.navigator.platform.is_empty() {
            return Err(GenerationError::InvalidField {
                field: "navigator.platform",
                reason: "platform cannot be empty".to_string(),
            });
        }
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(GenerationError::InvalidField {
                field: "screen",
                reason: format!(
                    "resolution {}x{} has a zero dimension",
                    self.screen.width, self.screen.height
                ),
            });
        }
        if self.screen.pixel_ratio == 0 {
            return Err(GenerationError::InvalidField {
                field: "screen.pixelRatio",
                reason: "pixel ratio must be at least 1".to_string(),
            });
        }
        for (field, amplitude) in [
            ("canvas.noiseAmplitude", self.canvas.noise_amplitude),
            ("audio.noiseAmplitude", self.audio.noise_amplitude),
        ] {
            if !amplitude.is_finite() || amplitude < 0.0 {
                return Err(GenerationError::InvalidField {
                    field,
                    reason: format!("{} is not a non-negative finite number", amplitude),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::generate;

    #[test]
    fn test_platform_family() {
        assert_eq!(PlatformFamily::from_platform("Win32"), PlatformFamily::Windows);
        assert_eq!(PlatformFamily::from_platform("MacIntel"), PlatformFamily::Mac);
        assert_eq!(PlatformFamily::from_platform("Linux i686"), PlatformFamily::Linux);
        assert_eq!(PlatformFamily::from_platform("FreeBSD"), PlatformFamily::Windows);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let profile = generate(Some("camel"));
        let json = profile.to_json().unwrap();

        assert!(json.contains("\"noiseAmplitude\""));
        assert!(json.contains("\"unmaskedRenderer\""));
        assert!(json.contains("\"hardwareConcurrency\""));
        assert!(json.contains("\"availableFonts\""));
        assert!(json.contains("\"utcOffsetMinutes\""));
        assert!(json.contains("\"algorithm\":\"gaussian\""));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = FingerprintProfile::from_json("{not json").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn test_from_json_rejects_empty_languages() {
        let mut profile = generate(Some("langs"));
        profile.navigator.languages.clear();
        let json = serde_json::to_string(&profile).unwrap();

        let err = FingerprintProfile::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::InvalidField { field: "navigator.languages", .. }
        ));
    }

    #[test]
    fn test_avail_height_saturates() {
        let mut screen = generate(Some("screen")).screen;
        screen.height = 20;
        assert_eq!(screen.avail_height(), 0);
    }
}
