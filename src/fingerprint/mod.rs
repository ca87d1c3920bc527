//! Fingerprint Profiles
//!
//! Generation and scoring of synthetic device identities.
//!
//! # Modules
//!
//! - `profile` - The [`FingerprintProfile`] data model and JSON import/export
//! - `rng` - The seeded LCG used for generation and the fresh per-call noise source
//! - `tables` - Curated pools of platforms, GPUs, resolutions, fonts and timezones
//! - `generator` - Seed to profile, fully deterministic for a given seed string
//! - `validator` - Profile to [`QualityReport`], advisory only
//!
//! # Example
//!
//! ```rust
//! use ki_identity_browser::fingerprint::{generate, validate};
//!
//! let profile = generate(Some("account-1"));
//! let report = validate(&profile);
//! assert!(report.score <= 100);
//! ```

pub mod generator;
pub mod profile;
pub mod rng;
pub mod tables;
pub mod validator;

pub use generator::{generate, user_agent_for, FingerprintGenerator, DEFAULT_CHROME_VERSION};
pub use profile::{
    AudioProfile, CanvasProfile, FingerprintProfile, FontProfile, GenerationError,
    MeasurementMethod, NavigatorProfile, NoiseAlgorithm, PlatformFamily, ScreenProfile,
    TimezoneProfile, WebGlProfile,
};
pub use rng::{hash_seed, FreshNoise, SeededLcg};
pub use validator::{validate, ConsistencyValidator, QualityReport, ValidationWarning};
