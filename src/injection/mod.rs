//! Fingerprint Injection
//!
//! Installs a [`FingerprintProfile`](crate::fingerprint::FingerprintProfile) into a
//! page's execution environment so every later read of an instrumented API returns
//! profile-derived values.
//!
//! # Modules
//!
//! - `context` - The [`ExecutionContext`] seam a host runtime implements
//! - `engine` - [`InjectionEngine`], applies a profile once per document
//! - `noise` - Fresh per-call canvas, audio and draw noise
//! - `overrides` - WebGL, font, timezone hooks and navigator/screen property sources
//! - `script` - The same overrides compiled to a self-guarding JavaScript bootstrap
//! - `simulated` - [`SimulatedPage`], an in-memory execution context
//!
//! # Example
//!
//! ```rust
//! use ki_identity_browser::fingerprint::generate;
//! use ki_identity_browser::injection::{InjectionEngine, SimulatedPage};
//!
//! let profile = generate(Some("account-1"));
//! let page = SimulatedPage::new("https://example.com");
//! let report = InjectionEngine::new().apply(&profile, &page);
//! assert!(report.is_complete());
//! ```

pub mod context;
pub mod engine;
pub mod noise;
pub mod overrides;
pub mod script;
pub mod simulated;

pub use context::{
    ApiOverride, ExecutionContext, HostObject, InjectionFailure, PropertyDescriptor,
    PropertySource, WebGlFlavor,
};
pub use engine::{FailedOverride, InjectionEngine, InjectionReport};
pub use noise::{AudioNoise, CanvasNoise, DrawJitter};
pub use overrides::{FontFilter, NavigatorSource, ScreenSource, TimezoneOverride, WebGlParameters};
pub use script::ScriptCompiler;
pub use simulated::SimulatedPage;
