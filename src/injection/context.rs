//! Execution-context seam.
//!
//! The injection engine never owns a page. It talks to whatever host runtime created
//! the page through [`ExecutionContext`], which offers exactly two primitives:
//! redefine a property on a host object, and install a hook on one browser API.
//! A real browser binding implements this over its JS bridge; [`SimulatedPage`]
//! implements it in memory for tests and for the mock windowing collaborator.
//!
//! [`SimulatedPage`]: super::simulated::SimulatedPage

use super::noise::{AudioNoise, CanvasNoise, DrawJitter};
use super::overrides::{FontFilter, TimezoneOverride, WebGlParameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Host objects whose properties can be redefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostObject {
    Navigator,
    Screen,
    Window,
}

impl std::fmt::Display for HostObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostObject::Navigator => write!(f, "navigator"),
            HostObject::Screen => write!(f, "screen"),
            HostObject::Window => write!(f, "window"),
        }
    }
}

/// Attributes of a redefined property, mirroring `Object.defineProperty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Descriptor used for every spoofed property: read-only, enumerable, reconfigurable.
    ///
    /// Reconfigurable is required so a later document or profile update can
    /// redefine the same property again.
    pub fn spoofed(value: Value) -> Self {
        Self {
            value,
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }
}

/// Read-only view of profile-derived properties, keyed by property name.
pub trait PropertySource: Send + Sync {
    /// Host object the properties live on.
    fn object(&self) -> HostObject;

    /// Property names this source answers for, in definition order.
    fn names(&self) -> &'static [&'static str];

    /// Value for one property, `None` if the source does not know it.
    fn get(&self, name: &str) -> Option<Value>;
}

/// WebGL context generation. Both must be overridden or the older one leaks the real GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebGlFlavor {
    /// `WebGLRenderingContext`
    Legacy,
    /// `WebGL2RenderingContext`
    Modern,
}

/// One hook on a browser API.
#[derive(Debug, Clone)]
pub enum ApiOverride {
    CanvasExport(Arc<CanvasNoise>),
    DrawJitter(Arc<DrawJitter>),
    WebGlParameter {
        flavor: WebGlFlavor,
        parameters: Arc<WebGlParameters>,
    },
    AudioRead(Arc<AudioNoise>),
    FontQuery(Arc<FontFilter>),
    Timezone(Arc<TimezoneOverride>),
    DevicePixelRatio(f64),
}

impl ApiOverride {
    /// Stable name of the hooked API, used in logs and reports.
    pub fn api(&self) -> &'static str {
        match self {
            ApiOverride::CanvasExport(_) => "canvas.toDataURL",
            ApiOverride::DrawJitter(_) => "canvas.fillText",
            ApiOverride::WebGlParameter {
                flavor: WebGlFlavor::Legacy,
                ..
            } => "webgl.getParameter",
            ApiOverride::WebGlParameter {
                flavor: WebGlFlavor::Modern,
                ..
            } => "webgl2.getParameter",
            ApiOverride::AudioRead(_) => "audio.getChannelData",
            ApiOverride::FontQuery(_) => "fonts.check",
            ApiOverride::Timezone(_) => "date.timezone",
            ApiOverride::DevicePixelRatio(_) => "window.devicePixelRatio",
        }
    }
}

/// Failure to install a single override. Never aborts the remaining overrides.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InjectionFailure {
    #[error("Property {object}.{name} cannot be redefined: {reason}")]
    PropertyLocked {
        object: HostObject,
        name: String,
        reason: String,
    },

    #[error("API {api} is not available in this context")]
    ApiUnavailable { api: &'static str },

    #[error("Property source has no value for {object}.{name}")]
    MissingValue { object: HostObject, name: String },
}

/// A live page execution environment owned by the host runtime.
pub trait ExecutionContext: Send + Sync {
    /// Opaque identifier of this document's context.
    fn context_id(&self) -> &str;

    /// Atomically set the instrumentation flag. Returns `true` only for the caller
    /// that flipped it, so concurrent or repeated injection runs at most once.
    fn try_mark_instrumented(&self) -> bool;

    fn is_instrumented(&self) -> bool;

    /// Redefine one property on a host object.
    fn define_property(
        &self,
        object: HostObject,
        name: &str,
        descriptor: PropertyDescriptor,
    ) -> Result<(), InjectionFailure>;

    /// Install one API hook. Un-hooked behavior must stay native.
    fn install(&self, api_override: ApiOverride) -> Result<(), InjectionFailure>;
}
