//! Applies a fingerprint profile to one execution context.
//!
//! `apply` runs once per document, from the document-creation hook, before any
//! page script. Every override is installed on its own: a failure is logged and
//! recorded in the [`InjectionReport`], and the remaining overrides still go in.

use super::context::{
    ApiOverride, ExecutionContext, InjectionFailure, PropertyDescriptor, PropertySource,
    WebGlFlavor,
};
use super::noise::{AudioNoise, CanvasNoise, DrawJitter};
use super::overrides::{FontFilter, NavigatorSource, ScreenSource, TimezoneOverride, WebGlParameters};
use super::script::ScriptCompiler;
use crate::fingerprint::FingerprintProfile;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one `apply` call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionReport {
    pub context_id: String,
    /// True when the context was already instrumented and nothing was done.
    pub skipped: bool,
    pub applied: Vec<String>,
    pub failed: Vec<FailedOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedOverride {
    pub target: String,
    pub error: String,
}

impl InjectionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Installs profile-derived overrides into execution contexts.
#[derive(Debug, Clone, Default)]
pub struct InjectionEngine {
    compiler: ScriptCompiler,
}

impl InjectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every enabled surface of `profile` to `ctx`.
    ///
    /// Calling this again on the same context is a no-op, so noise is never layered twice.
    pub fn apply(&self, profile: &FingerprintProfile, ctx: &dyn ExecutionContext) -> InjectionReport {
        let mut report = InjectionReport {
            context_id: ctx.context_id().to_string(),
            ..Default::default()
        };

        if !ctx.try_mark_instrumented() {
            debug!(context = %report.context_id, "Context already instrumented, skipping");
            report.skipped = true;
            return report;
        }

        if profile.navigator.enabled {
            self.define_all(ctx, &NavigatorSource::new(&profile.navigator), &mut report);
        }

        if profile.screen.enabled {
            self.define_all(ctx, &ScreenSource::new(&profile.screen), &mut report);
            self.install(
                ctx,
                ApiOverride::DevicePixelRatio(f64::from(profile.screen.pixel_ratio)),
                &mut report,
            );
        }

        if profile.webgl.enabled {
            let parameters = Arc::new(WebGlParameters::new(
                profile.webgl.vendor.clone(),
                profile.webgl.renderer.clone(),
                profile.webgl.unmasked_vendor.clone(),
                profile.webgl.unmasked_renderer.clone(),
            ));
            for flavor in [WebGlFlavor::Legacy, WebGlFlavor::Modern] {
                self.install(
                    ctx,
                    ApiOverride::WebGlParameter {
                        flavor,
                        parameters: parameters.clone(),
                    },
                    &mut report,
                );
            }
        }

        if profile.canvas.enabled {
            self.install(
                ctx,
                ApiOverride::CanvasExport(Arc::new(CanvasNoise::new(
                    profile.canvas.noise_amplitude,
                    profile.canvas.algorithm,
                ))),
                &mut report,
            );
            self.install(ctx, ApiOverride::DrawJitter(Arc::new(DrawJitter::new())), &mut report);
        }

        if profile.audio.enabled {
            self.install(
                ctx,
                ApiOverride::AudioRead(Arc::new(AudioNoise::new(profile.audio.noise_amplitude))),
                &mut report,
            );
        }

        if profile.fonts.enabled {
            self.install(
                ctx,
                ApiOverride::FontQuery(Arc::new(FontFilter::from_profile(&profile.fonts))),
                &mut report,
            );
        }

        if profile.timezone.enabled {
            self.install(
                ctx,
                ApiOverride::Timezone(Arc::new(TimezoneOverride::from_profile(&profile.timezone))),
                &mut report,
            );
        }

        debug!(
            context = %report.context_id,
            applied = report.applied.len(),
            failed = report.failed.len(),
            "Fingerprint injected"
        );
        report
    }

    /// JavaScript equivalent of `apply`, for hosts that install pre-navigation scripts.
    pub fn bootstrap_script(&self, profile: &FingerprintProfile) -> String {
        self.compiler.compile(profile)
    }

    fn define_all(
        &self,
        ctx: &dyn ExecutionContext,
        source: &dyn PropertySource,
        report: &mut InjectionReport,
    ) {
        let object = source.object();
        for name in source.names() {
            let target = format!("{}.{}", object, name);
            let result = match source.get(name) {
                Some(value) => ctx.define_property(object, name, PropertyDescriptor::spoofed(value)),
                None => Err(InjectionFailure::MissingValue {
                    object,
                    name: name.to_string(),
                }),
            };
            record(report, target, result);
        }
    }

    fn install(&self, ctx: &dyn ExecutionContext, api_override: ApiOverride, report: &mut InjectionReport) {
        let target = api_override.api().to_string();
        let result = ctx.install(api_override);
        record(report, target, result);
    }
}

fn record(report: &mut InjectionReport, target: String, result: Result<(), InjectionFailure>) {
    match result {
        Ok(()) => report.applied.push(target),
        Err(e) => {
            warn!(context = %report.context_id, target = %target, "Override failed: {}", e);
            report.failed.push(FailedOverride {
                target,
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::generate;
    use crate::injection::context::HostObject;
    use crate::injection::overrides::UNMASKED_VENDOR_WEBGL;
    use crate::injection::simulated::SimulatedPage;
    use serde_json::json;

    #[test]
    fn test_apply_overrides_every_surface() {
        let profile = generate(Some("engine"));
        let page = SimulatedPage::new("https://example.com");
        let report = InjectionEngine::new().apply(&profile, &page);

        assert!(report.is_complete(), "{:?}", report.failed);
        assert!(!report.skipped);
        assert_eq!(page.navigator("platform"), Some(json!(profile.navigator.platform)));
        assert_eq!(page.screen("width"), Some(json!(profile.screen.width)));
        assert_eq!(page.device_pixel_ratio(), f64::from(profile.screen.pixel_ratio));
        assert_eq!(
            page.webgl_get_parameter(WebGlFlavor::Modern, UNMASKED_VENDOR_WEBGL),
            Some(profile.webgl.unmasked_vendor.clone())
        );
        assert_eq!(page.resolved_time_zone(), profile.timezone.name);
    }

    #[test]
    fn test_second_apply_is_noop() {
        let profile = generate(Some("twice"));
        let page = SimulatedPage::new("https://example.com");
        let engine = InjectionEngine::new();

        engine.apply(&profile, &page);
        let second = engine.apply(&profile, &page);

        assert!(second.skipped);
        assert!(second.applied.is_empty());
        assert_eq!(page.install_count("canvas.toDataURL"), 1);
        assert_eq!(page.define_count(HostObject::Navigator, "platform"), 1);
    }

    #[test]
    fn test_failure_does_not_abort_remaining() {
        let profile = generate(Some("partial"));
        let page = SimulatedPage::new("https://example.com");
        page.block_api("webgl.getParameter");
        page.lock_property(HostObject::Navigator, "platform");

        let report = InjectionEngine::new().apply(&profile, &page);

        assert_eq!(report.failed.len(), 2);
        assert_eq!(page.navigator("platform"), Some(json!("Linux x86_64")));
        assert_eq!(
            page.navigator("hardwareConcurrency"),
            Some(json!(profile.navigator.hardware_concurrency))
        );
        assert_eq!(page.install_count("webgl2.getParameter"), 1);
        assert_eq!(page.install_count("audio.getChannelData"), 1);
    }

    #[test]
    fn test_disabled_surfaces_stay_native() {
        let mut profile = generate(Some("disabled"));
        profile.navigator.enabled = false;
        profile.timezone.enabled = false;
        let page = SimulatedPage::new("https://example.com");

        InjectionEngine::new().apply(&profile, &page);

        assert_eq!(page.navigator("platform"), Some(json!("Linux x86_64")));
        assert_eq!(page.resolved_time_zone(), "UTC");
        assert_eq!(page.timezone_offset(), 0);
    }
}
