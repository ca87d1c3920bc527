//! In-memory page execution context.
//!
//! [`SimulatedPage`] stands in for a real document. It starts with "native" values
//! describing the host machine, accepts property redefinitions and API hooks via
//! [`ExecutionContext`], and exposes the read paths a fingerprinting script would use
//! (`navigator.platform`, `toDataURL`, `getParameter`, ...). Reads with no hook
//! installed return the native value.

use super::context::{
    ApiOverride, ExecutionContext, HostObject, InjectionFailure, PropertyDescriptor, WebGlFlavor,
};
use super::noise::{AudioNoise, CanvasNoise, DrawJitter};
use super::overrides::{
    shading_language_string, version_string, FontFilter, TimezoneOverride, WebGlParameters,
    GL_RENDERER, GL_SHADING_LANGUAGE_VERSION, GL_VENDOR, GL_VERSION, UNMASKED_RENDERER_WEBGL,
    UNMASKED_VENDOR_WEBGL,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

const NATIVE_GPU_VENDOR: &str = "Mesa";
const NATIVE_GPU_RENDERER: &str = "llvmpipe (LLVM 15.0.7, 256 bits)";
const NATIVE_FONTS: &[&str] = &["DejaVu Sans", "DejaVu Serif", "Liberation Mono", "Noto Sans"];

#[derive(Default)]
struct Hooks {
    canvas: Option<Arc<CanvasNoise>>,
    jitter: Option<Arc<DrawJitter>>,
    webgl: HashMap<WebGlFlavor, Arc<WebGlParameters>>,
    audio: Option<Arc<AudioNoise>>,
    fonts: Option<Arc<FontFilter>>,
    timezone: Option<Arc<TimezoneOverride>>,
    device_pixel_ratio: Option<f64>,
}

struct PageState {
    properties: HashMap<(HostObject, String), PropertyDescriptor>,
    hooks: Hooks,
    /// APIs that refuse hooks, to exercise partial-failure paths.
    blocked: HashSet<&'static str>,
    install_counts: HashMap<&'static str, usize>,
    define_counts: HashMap<(HostObject, String), usize>,
}

/// Simulated document execution context.
pub struct SimulatedPage {
    id: String,
    url: String,
    instrumented: AtomicBool,
    state: RwLock<PageState>,
}

impl SimulatedPage {
    /// A fresh document with native host values.
    pub fn new(url: impl Into<String>) -> Self {
        let mut properties = HashMap::new();
        let native = |value: Value| PropertyDescriptor {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        };
        for (name, value) in [
            ("platform", json!("Linux x86_64")),
            ("language", json!("en-US")),
            ("languages", json!(["en-US"])),
            ("hardwareConcurrency", json!(32)),
            ("maxTouchPoints", json!(0)),
            ("deviceMemory", json!(8)),
            ("webdriver", json!(false)),
        ] {
            properties.insert((HostObject::Navigator, name.to_string()), native(value));
        }
        for (name, value) in [
            ("width", json!(3840)),
            ("height", json!(2160)),
            ("availWidth", json!(3840)),
            ("availHeight", json!(2160)),
            ("colorDepth", json!(30)),
            ("pixelDepth", json!(30)),
        ] {
            properties.insert((HostObject::Screen, name.to_string()), native(value));
        }

        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            instrumented: AtomicBool::new(false),
            state: RwLock::new(PageState {
                properties,
                hooks: Hooks::default(),
                blocked: HashSet::new(),
                install_counts: HashMap::new(),
                define_counts: HashMap::new(),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make `install` fail for one API, e.g. `"audio.getChannelData"`.
    pub fn block_api(&self, api: &'static str) {
        self.state.write().blocked.insert(api);
    }

    /// Mark a native property non-configurable so redefinition fails.
    pub fn lock_property(&self, object: HostObject, name: &str) {
        let mut state = self.state.write();
        if let Some(descriptor) = state.properties.get_mut(&(object, name.to_string())) {
            descriptor.configurable = false;
        }
    }

    /// How many times a hook for `api` was installed.
    pub fn install_count(&self, api: &str) -> usize {
        self.state
            .read()
            .install_counts
            .get(api)
            .copied()
            .unwrap_or(0)
    }

    /// How many times `object.name` was redefined.
    pub fn define_count(&self, object: HostObject, name: &str) -> usize {
        self.state
            .read()
            .define_counts
            .get(&(object, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    // ========================================================================
    // Page-side reads
    // ========================================================================

    pub fn read(&self, object: HostObject, name: &str) -> Option<Value> {
        self.state
            .read()
            .properties
            .get(&(object, name.to_string()))
            .map(|d| d.value.clone())
    }

    pub fn navigator(&self, name: &str) -> Option<Value> {
        self.read(HostObject::Navigator, name)
    }

    pub fn screen(&self, name: &str) -> Option<Value> {
        self.read(HostObject::Screen, name)
    }

    pub fn property_descriptor(&self, object: HostObject, name: &str) -> Option<PropertyDescriptor> {
        self.state
            .read()
            .properties
            .get(&(object, name.to_string()))
            .cloned()
    }

    /// Simulated page-script assignment. Silently ignored on non-writable
    /// properties, as in sloppy-mode JavaScript. Returns whether it took effect.
    pub fn assign(&self, object: HostObject, name: &str, value: Value) -> bool {
        let mut state = self.state.write();
        match state.properties.get_mut(&(object, name.to_string())) {
            Some(descriptor) if descriptor.writable => {
                descriptor.value = value;
                true
            }
            Some(_) => false,
            None => {
                state.properties.insert(
                    (object, name.to_string()),
                    PropertyDescriptor {
                        value,
                        writable: true,
                        enumerable: true,
                        configurable: true,
                    },
                );
                true
            }
        }
    }

    /// Pixel data as `toDataURL` / `getImageData` would expose it.
    pub fn canvas_export(&self, rgba: &[u8]) -> Vec<u8> {
        let mut pixels = rgba.to_vec();
        if let Some(noise) = self.state.read().hooks.canvas.clone() {
            noise.perturb(&mut pixels);
        }
        pixels
    }

    pub fn to_data_url(&self, rgba: &[u8]) -> String {
        format!(
            "data:application/octet-stream;base64,{}",
            BASE64.encode(self.canvas_export(rgba))
        )
    }

    /// Effective coordinates of a `fillText` / `fillRect` call.
    pub fn fill_text(&self, x: f64, y: f64) -> (f64, f64) {
        match self.state.read().hooks.jitter.clone() {
            Some(jitter) => jitter.offset(x, y),
            None => (x, y),
        }
    }

    /// `WebGLRenderingContext.getParameter` / `WebGL2RenderingContext.getParameter`.
    pub fn webgl_get_parameter(&self, flavor: WebGlFlavor, pname: u32) -> Option<String> {
        let hooked = self.state.read().hooks.webgl.get(&flavor).cloned();
        hooked
            .and_then(|p| p.lookup(flavor, pname))
            .or_else(|| native_webgl_parameter(flavor, pname))
    }

    /// `AudioBuffer.getChannelData`.
    pub fn audio_channel_data(&self, samples: &[f32]) -> Vec<f32> {
        let mut data = samples.to_vec();
        if let Some(noise) = self.state.read().hooks.audio.clone() {
            noise.perturb(&mut data);
        }
        data
    }

    /// `document.fonts.check`.
    pub fn font_available(&self, family: &str) -> bool {
        match self.state.read().hooks.fonts.clone() {
            Some(filter) => filter.is_available(family),
            None => NATIVE_FONTS.iter().any(|f| f.eq_ignore_ascii_case(family)),
        }
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.state.read().hooks.device_pixel_ratio.unwrap_or(1.0)
    }

    /// `new Date().getTimezoneOffset()`.
    pub fn timezone_offset(&self) -> i32 {
        self.state
            .read()
            .hooks
            .timezone
            .as_ref()
            .map(|tz| tz.timezone_offset())
            .unwrap_or(0)
    }

    /// `Intl.DateTimeFormat().resolvedOptions().timeZone`.
    pub fn resolved_time_zone(&self) -> String {
        self.state
            .read()
            .hooks
            .timezone
            .as_ref()
            .map(|tz| tz.time_zone().to_string())
            .unwrap_or_else(|| "UTC".to_string())
    }
}

impl std::fmt::Debug for SimulatedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedPage")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("instrumented", &self.is_instrumented())
            .finish()
    }
}

impl ExecutionContext for SimulatedPage {
    fn context_id(&self) -> &str {
        &self.id
    }

    fn try_mark_instrumented(&self) -> bool {
        self.instrumented
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_instrumented(&self) -> bool {
        self.instrumented.load(Ordering::Acquire)
    }

    fn define_property(
        &self,
        object: HostObject,
        name: &str,
        descriptor: PropertyDescriptor,
    ) -> Result<(), InjectionFailure> {
        let mut state = self.state.write();
        let key = (object, name.to_string());
        if let Some(existing) = state.properties.get(&key) {
            if !existing.configurable {
                return Err(InjectionFailure::PropertyLocked {
                    object,
                    name: name.to_string(),
                    reason: "property is not configurable".to_string(),
                });
            }
        }
        state.properties.insert(key.clone(), descriptor);
        *state.define_counts.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn install(&self, api_override: ApiOverride) -> Result<(), InjectionFailure> {
        let api = api_override.api();
        let mut state = self.state.write();
        if state.blocked.contains(api) {
            return Err(InjectionFailure::ApiUnavailable { api });
        }

        let hooks = &mut state.hooks;
        match api_override {
            ApiOverride::CanvasExport(noise) => hooks.canvas = Some(noise),
            ApiOverride::DrawJitter(jitter) => hooks.jitter = Some(jitter),
            ApiOverride::WebGlParameter { flavor, parameters } => {
                hooks.webgl.insert(flavor, parameters);
            }
            ApiOverride::AudioRead(noise) => hooks.audio = Some(noise),
            ApiOverride::FontQuery(filter) => hooks.fonts = Some(filter),
            ApiOverride::Timezone(tz) => hooks.timezone = Some(tz),
            ApiOverride::DevicePixelRatio(ratio) => hooks.device_pixel_ratio = Some(ratio),
        }
        *state.install_counts.entry(api).or_insert(0) += 1;
        Ok(())
    }
}

fn native_webgl_parameter(flavor: WebGlFlavor, pname: u32) -> Option<String> {
    match pname {
        GL_VENDOR => Some("WebKit".to_string()),
        GL_RENDERER => Some("WebKit WebGL".to_string()),
        UNMASKED_VENDOR_WEBGL => Some(NATIVE_GPU_VENDOR.to_string()),
        UNMASKED_RENDERER_WEBGL => Some(NATIVE_GPU_RENDERER.to_string()),
        GL_VERSION => Some(version_string(flavor).to_string()),
        GL_SHADING_LANGUAGE_VERSION => Some(shading_language_string(flavor).to_string()),
        _ => None,
    }
}
