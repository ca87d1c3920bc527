//! JavaScript rendition of the injection engine.
//!
//! Hosts that can only register a script to run on every new document (for
//! example through `Page.addScriptToEvaluateOnNewDocument`) install the output of
//! [`ScriptCompiler::compile`]. The script guards itself with a non-enumerable
//! symbol key on the window, wraps every override in its own `try`, and draws
//! noise from `Math.random` on each call.

use super::context::{PropertySource, WebGlFlavor};
use super::noise::{CanvasNoise, AUDIO_NOISE_SCALE, DRAW_JITTER};
use super::overrides::{
    shading_language_string, version_string, NavigatorSource, ScreenSource, GL_RENDERER,
    GL_SHADING_LANGUAGE_VERSION, GL_VENDOR, GL_VERSION, UNMASKED_RENDERER_WEBGL,
    UNMASKED_VENDOR_WEBGL,
};
use crate::fingerprint::{FingerprintProfile, NoiseAlgorithm};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

/// Registry key of the window guard symbol. Random per process, so pages
/// cannot look the symbol up by a well-known name.
static GUARD_KEY: Lazy<String> = Lazy::new(|| uuid::Uuid::new_v4().simple().to_string());

pub fn guard_key() -> &'static str {
    GUARD_KEY.as_str()
}

#[derive(Debug, Clone, Default)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, profile: &FingerprintProfile) -> String {
        let mut sections: Vec<(&str, String)> = Vec::new();

        if profile.navigator.enabled {
            sections.push((
                "navigator",
                define_properties_js("navigator", &NavigatorSource::new(&profile.navigator)),
            ));
        }
        if profile.screen.enabled {
            sections.push((
                "screen",
                define_properties_js("screen", &ScreenSource::new(&profile.screen)),
            ));
            sections.push((
                "devicePixelRatio",
                format!(
                    "Object.defineProperty(window, 'devicePixelRatio', {{ get: function() {{ return {}; }}, enumerable: true, configurable: true }});",
                    profile.screen.pixel_ratio
                ),
            ));
        }
        if profile.webgl.enabled {
            sections.push(("webgl", webgl_js(profile)));
        }
        if profile.canvas.enabled {
            let noise = CanvasNoise::new(profile.canvas.noise_amplitude, profile.canvas.algorithm);
            sections.push(("canvas", canvas_js(noise.max_channel_delta(), noise.algorithm())));
            sections.push(("drawJitter", draw_jitter_js()));
        }
        if profile.audio.enabled {
            sections.push((
                "audio",
                audio_js(profile.audio.noise_amplitude.max(0.0) * AUDIO_NOISE_SCALE),
            ));
        }
        if profile.fonts.enabled {
            let fonts: Vec<Value> = profile
                .fonts
                .available_fonts
                .iter()
                .map(|f| Value::from(f.to_lowercase()))
                .collect();
            sections.push(("fonts", fonts_js(&Value::Array(fonts).to_string())));
        }
        if profile.timezone.enabled {
            sections.push((
                "timezone",
                timezone_js(
                    -profile.timezone.utc_offset_minutes,
                    &escape_js_string(&profile.timezone.name),
                ),
            ));
        }

        let mut script = String::new();
        script.push_str("(function() {\n'use strict';\n");
        script.push_str(&format!(
            "const guard = Symbol.for('{key}');\nif (Object.prototype.hasOwnProperty.call(window, guard)) {{ return; }}\nObject.defineProperty(window, guard, {{ value: true, enumerable: false, configurable: false }});\n",
            key = guard_key()
        ));
        for (name, body) in sections {
            script.push_str(&format!(
                "\n// === {name} ===\ntry {{\n{body}\n}} catch (e) {{ /* {name}: native behavior kept */ }}\n",
                name = name,
                body = body
            ));
        }
        script.push_str("})();\n");
        script
    }
}

/// Escape string for JavaScript
fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn define_properties_js(target: &str, source: &dyn PropertySource) -> String {
    let mut values = Map::new();
    for name in source.names() {
        if let Some(value) = source.get(name) {
            values.insert(name.to_string(), value);
        }
    }
    format!(
        r#"const values = {values};
Object.keys(values).forEach(function(key) {{
    try {{
        Object.defineProperty({target}, key, {{ value: values[key], writable: false, enumerable: true, configurable: true }});
    }} catch (e) {{}}
}});"#,
        values = Value::Object(values),
        target = target
    )
}

fn webgl_js(profile: &FingerprintProfile) -> String {
    let table = |flavor: WebGlFlavor| {
        format!(
            r#"{{ {vendor}: "{v}", {renderer}: "{r}", {uv_key}: "{uv}", {ur_key}: "{ur}", {version}: "{ver}", {shading}: "{sl}" }}"#,
            vendor = GL_VENDOR,
            renderer = GL_RENDERER,
            uv_key = UNMASKED_VENDOR_WEBGL,
            ur_key = UNMASKED_RENDERER_WEBGL,
            version = GL_VERSION,
            shading = GL_SHADING_LANGUAGE_VERSION,
            v = escape_js_string(&profile.webgl.vendor),
            r = escape_js_string(&profile.webgl.renderer),
            uv = escape_js_string(&profile.webgl.unmasked_vendor),
            ur = escape_js_string(&profile.webgl.unmasked_renderer),
            ver = version_string(flavor),
            sl = shading_language_string(flavor),
        )
    };
    format!(
        r#"const hook = function(target, params) {{
    if (typeof target === 'undefined') {{ return; }}
    const original = target.prototype.getParameter;
    target.prototype.getParameter = function(pname) {{
        try {{
            if (Object.prototype.hasOwnProperty.call(params, pname)) {{ return params[pname]; }}
        }} catch (e) {{}}
        return original.apply(this, arguments);
    }};
}};
hook(window.WebGLRenderingContext, {legacy});
hook(window.WebGL2RenderingContext, {modern});"#,
        legacy = table(WebGlFlavor::Legacy),
        modern = table(WebGlFlavor::Modern),
    )
}

fn canvas_js(bound: i32, algorithm: NoiseAlgorithm) -> String {
    let delta = match algorithm {
        NoiseAlgorithm::Uniform => "(Math.random() * 2 - 1) * BOUND",
        NoiseAlgorithm::Gaussian => {
            "Math.max(-BOUND, Math.min(BOUND, Math.sqrt(-2 * Math.log(1 - Math.random())) * Math.cos(2 * Math.PI * Math.random()) * BOUND / 2))"
        }
        NoiseAlgorithm::Perlin => "smooth(i / 8) * BOUND",
    };
    format!(
        r#"const BOUND = {bound};
const lattice = [];
const smooth = function(x) {{
    const i0 = Math.floor(x);
    while (lattice.length <= i0 + 1) {{ lattice.push(Math.random() * 2 - 1); }}
    const t = x - i0;
    const s = t * t * (3 - 2 * t);
    return lattice[i0] + (lattice[i0 + 1] - lattice[i0]) * s;
}};
const perturb = function(data) {{
    lattice.length = 0;
    for (let p = 0; p < data.length; p += 4) {{
        for (let c = 0; c < 3; c++) {{
            const i = (p / 4) * 3 + c;
            const d = Math.round({delta});
            data[p + c] = Math.max(0, Math.min(255, data[p + c] + d));
        }}
    }}
}};
const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
HTMLCanvasElement.prototype.toDataURL = function() {{
    try {{
        if (BOUND > 0 && this.width > 0 && this.height > 0) {{
            const copy = document.createElement('canvas');
            copy.width = this.width;
            copy.height = this.height;
            const ctx = copy.getContext('2d');
            ctx.drawImage(this, 0, 0);
            const image = ctx.getImageData(0, 0, copy.width, copy.height);
            perturb(image.data);
            ctx.putImageData(image, 0, 0);
            return originalToDataURL.apply(copy, arguments);
        }}
    }} catch (e) {{}}
    return originalToDataURL.apply(this, arguments);
}};"#,
        bound = bound,
        delta = delta,
    )
}

fn draw_jitter_js() -> String {
    format!(
        r#"const JITTER = {jitter};
const jitter = function() {{ return (Math.random() * 2 - 1) * JITTER; }};
const proto = CanvasRenderingContext2D.prototype;
const originalFillText = proto.fillText;
proto.fillText = function(text, x, y) {{
    const args = Array.prototype.slice.call(arguments);
    args[1] = x + jitter();
    args[2] = y + jitter();
    return originalFillText.apply(this, args);
}};
const originalFillRect = proto.fillRect;
proto.fillRect = function(x, y, w, h) {{
    return originalFillRect.call(this, x + jitter(), y + jitter(), w, h);
}};"#,
        jitter = DRAW_JITTER
    )
}

fn audio_js(bound: f64) -> String {
    format!(
        r#"const AUDIO_BOUND = {bound:e};
const noised = new WeakSet();
const originalGetChannelData = AudioBuffer.prototype.getChannelData;
AudioBuffer.prototype.getChannelData = function() {{
    const data = originalGetChannelData.apply(this, arguments);
    try {{
        if (!noised.has(data)) {{
            for (let i = 0; i < data.length; i++) {{
                data[i] += (Math.random() * 2 - 1) * AUDIO_BOUND;
            }}
            noised.add(data);
        }}
    }} catch (e) {{}}
    return data;
}};"#,
        bound = bound
    )
}

fn fonts_js(fonts_json: &str) -> String {
    format!(
        r#"const allowed = {fonts};
const familyOf = function(font) {{
    const match = /(?:[\d.]+(?:px|pt|em|rem|%)(?:\/[\d.]+\w*)?\s+)(.+)$/.exec(String(font));
    return (match ? match[1] : String(font)).split(',').map(function(f) {{
        return f.trim().replace(/^["']|["']$/g, '').toLowerCase();
    }});
}};
if (document.fonts && document.fonts.check) {{
    const originalCheck = document.fonts.check.bind(document.fonts);
    document.fonts.check = function(font) {{
        try {{
            return familyOf(font).some(function(f) {{ return allowed.indexOf(f) !== -1; }});
        }} catch (e) {{
            return originalCheck.apply(null, arguments);
        }}
    }};
}}"#,
        fonts = fonts_json
    )
}

fn timezone_js(timezone_offset: i32, zone: &str) -> String {
    format!(
        r#"Date.prototype.getTimezoneOffset = function() {{ return {offset}; }};
const originalResolvedOptions = Intl.DateTimeFormat.prototype.resolvedOptions;
Intl.DateTimeFormat.prototype.resolvedOptions = function() {{
    const options = originalResolvedOptions.apply(this, arguments);
    options.timeZone = "{zone}";
    return options;
}};"#,
        offset = timezone_offset,
        zone = zone
    )
}
