//! Curated value pools for profile generation.
//!
//! Pools are grouped by [`PlatformFamily`] so that one draw of the platform fixes the
//! cluster every other correlated value comes from. A Mac never gets a Direct3D
//! renderer and a Windows box never reports `Europe/Berlin` from the US-only pool.

use super::profile::PlatformFamily;

/// One WebGL vendor/renderer pair as Chrome reports it through ANGLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTuple {
    pub vendor: &'static str,
    pub renderer: &'static str,
}

/// One timezone and its standard-time offset in minutes east of UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneEntry {
    pub name: &'static str,
    pub utc_offset_minutes: i32,
}

const fn gpu(vendor: &'static str, renderer: &'static str) -> GpuTuple {
    GpuTuple { vendor, renderer }
}

const fn tz(name: &'static str, utc_offset_minutes: i32) -> TimezoneEntry {
    TimezoneEntry {
        name,
        utc_offset_minutes,
    }
}

// ============================================================================
// Platforms
// ============================================================================

/// `navigator.platform` values the generator can emit.
pub const PLATFORMS: [&str; 4] = ["Win32", "MacIntel", "Linux x86_64", "Linux i686"];

// ============================================================================
// GPUs
// ============================================================================

const WINDOWS_GPUS: [GpuTuple; 6] = [
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 SUPER Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 6700 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) Iris(R) Xe Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
];

const MAC_GPUS: [GpuTuple; 4] = [
    gpu(
        "Google Inc. (Apple)",
        "ANGLE (Apple, Apple M1, OpenGL 4.1)",
    ),
    gpu(
        "Google Inc. (Apple)",
        "ANGLE (Apple, ANGLE Metal Renderer: Apple M2, Unspecified Version)",
    ),
    gpu(
        "Google Inc. (Intel Inc.)",
        "ANGLE (Intel Inc., Intel(R) Iris(TM) Plus Graphics 655, OpenGL 4.1)",
    ),
    gpu(
        "Google Inc. (ATI Technologies Inc.)",
        "ANGLE (ATI Technologies Inc., AMD Radeon Pro 5500M OpenGL Engine, OpenGL 4.1)",
    ),
];

const LINUX_GPUS: [GpuTuple; 4] = [
    gpu(
        "Google Inc. (NVIDIA Corporation)",
        "ANGLE (NVIDIA Corporation, NVIDIA GeForce GTX 1080/PCIe/SSE2, OpenGL 4.5.0)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Mesa Intel(R) UHD Graphics 620 (KBL GT2), OpenGL 4.6)",
    ),
    gpu(
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 580 Series (radeonsi, polaris10, LLVM 15.0.7), OpenGL 4.6)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Mesa Intel(R) Xe Graphics (TGL GT2), OpenGL 4.6)",
    ),
];

/// GPU pool for a platform family.
pub fn gpu_pool(family: PlatformFamily) -> &'static [GpuTuple] {
    match family {
        PlatformFamily::Windows => &WINDOWS_GPUS,
        PlatformFamily::Mac => &MAC_GPUS,
        PlatformFamily::Linux => &LINUX_GPUS,
    }
}

// ============================================================================
// Languages
// ============================================================================

/// `navigator.languages` pairs; the first entry doubles as `navigator.language`.
pub const LANGUAGE_PAIRS: [[&str; 2]; 6] = [
    ["en-US", "en"],
    ["en-GB", "en"],
    ["de-DE", "de"],
    ["fr-FR", "fr"],
    ["es-ES", "es"],
    ["ja-JP", "ja"],
];

// ============================================================================
// Screen resolutions
// ============================================================================

/// Resolutions the validator accepts as common. Every generator pool is a subset.
pub const COMMON_RESOLUTIONS: [(u32, u32); 8] = [
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1440, 900),
    (1280, 720),
    (2560, 1440),
    (1600, 900),
    (1024, 768),
];

const WINDOWS_RESOLUTIONS: [(u32, u32); 6] = [
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (1600, 900),
    (1280, 720),
    (2560, 1440),
];

const MAC_RESOLUTIONS: [(u32, u32); 3] = [(1440, 900), (1920, 1080), (2560, 1440)];

const LINUX_RESOLUTIONS: [(u32, u32); 5] = [
    (1920, 1080),
    (1366, 768),
    (2560, 1440),
    (1600, 900),
    (1280, 720),
];

/// Resolution pool for a platform family.
pub fn resolution_pool(family: PlatformFamily) -> &'static [(u32, u32)] {
    match family {
        PlatformFamily::Windows => &WINDOWS_RESOLUTIONS,
        PlatformFamily::Mac => &MAC_RESOLUTIONS,
        PlatformFamily::Linux => &LINUX_RESOLUTIONS,
    }
}

// ============================================================================
// Hardware
// ============================================================================

pub const HARDWARE_CONCURRENCY: [u32; 5] = [4, 6, 8, 12, 16];

/// Chrome rounds `navigator.deviceMemory` to a power of two.
pub const DEVICE_MEMORY_GB: [u32; 3] = [2, 4, 8];

pub const COLOR_DEPTH: u32 = 24;

// ============================================================================
// Fonts
// ============================================================================

pub const FONT_POOL: [&str; 16] = [
    "Arial",
    "Arial Black",
    "Comic Sans MS",
    "Courier New",
    "Georgia",
    "Impact",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
    "Webdings",
    "Helvetica",
    "Tahoma",
    "Palatino",
    "Garamond",
    "Bookman",
    "Lucida Sans",
];

pub const MIN_FONTS: usize = 8;
pub const MAX_FONTS: usize = 14;

// ============================================================================
// Timezones
// ============================================================================

// Offsets are standard time; DST is not modelled.
const US_TIMEZONES: [TimezoneEntry; 4] = [
    tz("America/New_York", -300),
    tz("America/Chicago", -360),
    tz("America/Denver", -420),
    tz("America/Los_Angeles", -480),
];

const LINUX_X64_TIMEZONES: [TimezoneEntry; 4] = [
    tz("America/New_York", -300),
    tz("Europe/London", 0),
    tz("Europe/Berlin", 60),
    tz("Asia/Shanghai", 480),
];

const LINUX_X86_TIMEZONES: [TimezoneEntry; 3] = [
    tz("America/New_York", -300),
    tz("Europe/London", 0),
    tz("Europe/Berlin", 60),
];

/// Timezone pool for an exact `navigator.platform` string.
///
/// Unknown platforms fall back to the US pool used for Windows.
pub fn timezone_pool(platform: &str) -> &'static [TimezoneEntry] {
    match platform {
        "Linux x86_64" => &LINUX_X64_TIMEZONES,
        "Linux i686" => &LINUX_X86_TIMEZONES,
        _ => &US_TIMEZONES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_resolutions_are_common() {
        for family in [
            PlatformFamily::Windows,
            PlatformFamily::Mac,
            PlatformFamily::Linux,
        ] {
            for res in resolution_pool(family) {
                assert!(COMMON_RESOLUTIONS.contains(res), "{:?} not common", res);
            }
        }
    }

    #[test]
    fn test_every_platform_has_pools() {
        for platform in PLATFORMS {
            let family = PlatformFamily::from_platform(platform);
            assert!(!gpu_pool(family).is_empty());
            assert!(!resolution_pool(family).is_empty());
            assert!(!timezone_pool(platform).is_empty());
        }
    }

    #[test]
    fn test_font_bounds_fit_pool() {
        assert!(MIN_FONTS <= MAX_FONTS);
        assert!(MAX_FONTS <= FONT_POOL.len());
    }
}
