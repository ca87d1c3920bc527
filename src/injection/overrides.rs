//! Profile-derived hook state for individual browser APIs.

use super::context::{HostObject, PropertySource, WebGlFlavor};
use crate::fingerprint::{FontProfile, NavigatorProfile, ScreenProfile, TimezoneProfile};
use serde_json::{json, Value};
use std::collections::BTreeSet;

// ============================================================================
// WebGL
// ============================================================================

pub const GL_VENDOR: u32 = 0x1F00;
pub const GL_RENDERER: u32 = 0x1F01;
pub const GL_VERSION: u32 = 0x1F02;
pub const GL_SHADING_LANGUAGE_VERSION: u32 = 0x8B8C;
/// `WEBGL_debug_renderer_info.UNMASKED_VENDOR_WEBGL`
pub const UNMASKED_VENDOR_WEBGL: u32 = 0x9245;
/// `WEBGL_debug_renderer_info.UNMASKED_RENDERER_WEBGL`
pub const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

/// Values answered by a hooked `getParameter`. Anything else passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebGlParameters {
    vendor: String,
    renderer: String,
    unmasked_vendor: String,
    unmasked_renderer: String,
}

impl WebGlParameters {
    pub fn new(
        vendor: impl Into<String>,
        renderer: impl Into<String>,
        unmasked_vendor: impl Into<String>,
        unmasked_renderer: impl Into<String>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            renderer: renderer.into(),
            unmasked_vendor: unmasked_vendor.into(),
            unmasked_renderer: unmasked_renderer.into(),
        }
    }

    /// Spoofed answer for `pname`, or `None` to fall through to the native call.
    pub fn lookup(&self, flavor: WebGlFlavor, pname: u32) -> Option<String> {
        match pname {
            GL_VENDOR => Some(self.vendor.clone()),
            GL_RENDERER => Some(self.renderer.clone()),
            UNMASKED_VENDOR_WEBGL => Some(self.unmasked_vendor.clone()),
            UNMASKED_RENDERER_WEBGL => Some(self.unmasked_renderer.clone()),
            GL_VERSION => Some(version_string(flavor).to_string()),
            GL_SHADING_LANGUAGE_VERSION => Some(shading_language_string(flavor).to_string()),
            _ => None,
        }
    }
}

pub fn version_string(flavor: WebGlFlavor) -> &'static str {
    match flavor {
        WebGlFlavor::Legacy => "WebGL 1.0 (OpenGL ES 2.0 Chromium)",
        WebGlFlavor::Modern => "WebGL 2.0 (OpenGL ES 3.0 Chromium)",
    }
}

pub fn shading_language_string(flavor: WebGlFlavor) -> &'static str {
    match flavor {
        WebGlFlavor::Legacy => "WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 Chromium)",
        WebGlFlavor::Modern => "WebGL GLSL ES 3.00 (OpenGL ES GLSL ES 3.0 Chromium)",
    }
}

// ============================================================================
// Fonts
// ============================================================================

/// Restricts font detection to the profile's subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFilter {
    allowed: BTreeSet<String>,
}

impl FontFilter {
    pub fn new(allowed: BTreeSet<String>) -> Self {
        Self { allowed }
    }

    pub fn from_profile(fonts: &FontProfile) -> Self {
        Self::new(fonts.available_fonts.clone())
    }

    /// Whether a page probing `family` should see it as installed.
    ///
    /// Matching is case-insensitive and ignores surrounding quotes, the way CSS
    /// font-family names are compared.
    pub fn is_available(&self, family: &str) -> bool {
        let wanted = family.trim().trim_matches(|c| c == '"' || c == '\'');
        self.allowed.iter().any(|f| f.eq_ignore_ascii_case(wanted))
    }

    pub fn fonts(&self) -> &BTreeSet<String> {
        &self.allowed
    }
}

// ============================================================================
// Timezone
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneOverride {
    name: String,
    utc_offset_minutes: i32,
}

impl TimezoneOverride {
    pub fn from_profile(timezone: &TimezoneProfile) -> Self {
        Self {
            name: timezone.name.clone(),
            utc_offset_minutes: timezone.utc_offset_minutes,
        }
    }

    /// Value for `Date.prototype.getTimezoneOffset`, which counts minutes *behind* UTC.
    pub fn timezone_offset(&self) -> i32 {
        -self.utc_offset_minutes
    }

    /// Value for `Intl.DateTimeFormat().resolvedOptions().timeZone`.
    pub fn time_zone(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Property sources
// ============================================================================

const NAVIGATOR_PROPERTIES: &[&str] = &[
    "platform",
    "language",
    "languages",
    "hardwareConcurrency",
    "maxTouchPoints",
    "deviceMemory",
];

const SCREEN_PROPERTIES: &[&str] = &[
    "width",
    "height",
    "availWidth",
    "availHeight",
    "colorDepth",
    "pixelDepth",
];

/// `navigator.*` values drawn from a profile.
#[derive(Debug, Clone)]
pub struct NavigatorSource {
    navigator: NavigatorProfile,
}

impl NavigatorSource {
    pub fn new(navigator: &NavigatorProfile) -> Self {
        Self {
            navigator: navigator.clone(),
        }
    }
}

impl PropertySource for NavigatorSource {
    fn object(&self) -> HostObject {
        HostObject::Navigator
    }

    fn names(&self) -> &'static [&'static str] {
        NAVIGATOR_PROPERTIES
    }

    fn get(&self, name: &str) -> Option<Value> {
        let n = &self.navigator;
        Some(match name {
            "platform" => json!(n.platform),
            "language" => json!(n.language),
            "languages" => json!(n.languages),
            "hardwareConcurrency" => json!(n.hardware_concurrency),
            "maxTouchPoints" => json!(n.max_touch_points),
            "deviceMemory" => json!(n.device_memory),
            _ => return None,
        })
    }
}

/// `screen.*` values drawn from a profile.
#[derive(Debug, Clone)]
pub struct ScreenSource {
    screen: ScreenProfile,
}

impl ScreenSource {
    pub fn new(screen: &ScreenProfile) -> Self {
        Self {
            screen: screen.clone(),
        }
    }
}

impl PropertySource for ScreenSource {
    fn object(&self) -> HostObject {
        HostObject::Screen
    }

    fn names(&self) -> &'static [&'static str] {
        SCREEN_PROPERTIES
    }

    fn get(&self, name: &str) -> Option<Value> {
        let s = &self.screen;
        Some(match name {
            "width" | "availWidth" => json!(s.width),
            "height" => json!(s.height),
            "availHeight" => json!(s.avail_height()),
            "colorDepth" | "pixelDepth" => json!(s.color_depth),
            _ => return None,
        })
    }
}
