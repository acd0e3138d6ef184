//! Override Directives
//!
//! Intermediate representation between a [`Fingerprint`] and the rendered
//! JavaScript. [`compile`] turns a fingerprint into an ordered list of directives;
//! the renderer walks that list once. Keeping the IR separate makes the program's
//! content inspectable in tests without parsing JavaScript.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::fingerprint::{
    Fingerprint, MimeTypeInfo, NoiseSeed, PermissionState, PluginInfo, WebRtcPolicy,
};

/// Globals injected by Selenium, ChromeDriver, PhantomJS and friends.
pub const AUTOMATION_GLOBALS: &[&str] = &[
    "cdc_adoQpoasnfa76pfcZLmcfl_Array",
    "cdc_adoQpoasnfa76pfcZLmcfl_Promise",
    "cdc_adoQpoasnfa76pfcZLmcfl_Symbol",
    "cdc_adoQpoasnfa76pfcZLmcfl_JSON",
    "cdc_adoQpoasnfa76pfcZLmcfl_Object",
    "cdc_adoQpoasnfa76pfcZLmcfl_Proxy",
    "__webdriver_evaluate",
    "__selenium_evaluate",
    "__webdriver_script_function",
    "__webdriver_script_func",
    "__webdriver_script_fn",
    "__fxdriver_evaluate",
    "__driver_unwrapped",
    "__webdriver_unwrapped",
    "__driver_evaluate",
    "__selenium_unwrapped",
    "__fxdriver_unwrapped",
    "_Selenium_IDE_Recorder",
    "_selenium",
    "calledSelenium",
    "domAutomation",
    "domAutomationController",
    "__lastWatirAlert",
    "__lastWatirConfirm",
    "__lastWatirPrompt",
    "__nightmare",
    "_phantom",
    "callPhantom",
];

/// Object a spoofed property is defined on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Target {
    Navigator,
    Screen,
    Window,
    /// `navigator.connection`, absent in some builds.
    Connection,
}

impl Target {
    /// JavaScript expression evaluating to the object (or a falsy value).
    pub fn js_expr(&self) -> &'static str {
        match self {
            Target::Navigator => "Navigator.prototype",
            Target::Screen => "Screen.prototype",
            Target::Window => "window",
            Target::Connection => "(window.NetworkInformation && NetworkInformation.prototype)",
        }
    }
}

/// Value returned by a spoofed getter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JsValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Frozen array of strings, the same array on every read.
    FrozenArray(Vec<String>),
}

impl JsValue {
    /// JavaScript source literal for the value.
    pub fn to_js(&self) -> String {
        match self {
            JsValue::Null => "null".to_string(),
            JsValue::Bool(b) => b.to_string(),
            JsValue::Int(i) => i.to_string(),
            JsValue::Float(f) => serde_json::Value::from(*f).to_string(),
            JsValue::Str(s) => serde_json::Value::from(s.as_str()).to_string(),
            JsValue::FrozenArray(items) => format!(
                "Object.freeze({})",
                serde_json::Value::from(items.clone())
            ),
        }
    }
}

impl From<bool> for JsValue {
    fn from(v: bool) -> Self {
        JsValue::Bool(v)
    }
}

impl From<u32> for JsValue {
    fn from(v: u32) -> Self {
        JsValue::Int(i64::from(v))
    }
}

impl From<f64> for JsValue {
    fn from(v: f64) -> Self {
        JsValue::Float(v)
    }
}

impl From<&str> for JsValue {
    fn from(v: &str) -> Self {
        JsValue::Str(v.to_string())
    }
}

impl From<String> for JsValue {
    fn from(v: String) -> Self {
        JsValue::Str(v)
    }
}

impl From<Option<String>> for JsValue {
    fn from(v: Option<String>) -> Self {
        v.map_or(JsValue::Null, JsValue::Str)
    }
}

/// One override applied by the program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Directive {
    /// Getter on the target returning a constant.
    Accessor {
        target: Target,
        property: &'static str,
        value: JsValue,
    },
    /// Deletes (or defines as undefined) automation globals.
    RemoveAutomationMarkers { globals: Vec<&'static str> },
    /// `getParameter(UNMASKED_VENDOR_WEBGL / UNMASKED_RENDERER_WEBGL)` overrides.
    WebGlParameters { vendor: String, renderer: String },
    /// Seeded pixel perturbation on canvas reads.
    CanvasNoise { seed: NoiseSeed },
    /// Seeded perturbation on audio buffer reads.
    AudioNoise { seed: NoiseSeed, amplitude: f64 },
    /// Seeded width jitter on `measureText`.
    FontMetrics { seed: NoiseSeed, amplitude: f64 },
    Timezone {
        zone: String,
        offset_minutes: i32,
        locale: String,
    },
    WebRtc { policy: WebRtcPolicy },
    Plugins {
        plugins: Vec<PluginInfo>,
        mime_types: Vec<MimeTypeInfo>,
    },
    Permissions {
        states: BTreeMap<String, PermissionState>,
    },
}

impl Directive {
    fn accessor(target: Target, property: &'static str, value: impl Into<JsValue>) -> Self {
        Directive::Accessor {
            target,
            property,
            value: value.into(),
        }
    }

    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::Accessor { .. } => "accessor",
            Directive::RemoveAutomationMarkers { .. } => "automation-markers",
            Directive::WebGlParameters { .. } => "webgl",
            Directive::CanvasNoise { .. } => "canvas",
            Directive::AudioNoise { .. } => "audio",
            Directive::FontMetrics { .. } => "fonts",
            Directive::Timezone { .. } => "timezone",
            Directive::WebRtc { .. } => "webrtc",
            Directive::Plugins { .. } => "plugins",
            Directive::Permissions { .. } => "permissions",
        }
    }
}

/// Lowers a fingerprint to its directive list.
///
/// Automation markers come first so that nothing later can observe them, and the
/// `webdriver` getter is always bound to `false` regardless of the fingerprint.
pub fn compile(fp: &Fingerprint) -> Vec<Directive> {
    use Target::*;

    let nav = &fp.navigator;
    let screen = &fp.screen;
    let net = &fp.network;

    let mut directives = vec![
        Directive::RemoveAutomationMarkers {
            globals: AUTOMATION_GLOBALS.to_vec(),
        },
        Directive::accessor(Navigator, "webdriver", false),
        // Navigator
        Directive::accessor(Navigator, "userAgent", nav.user_agent.as_str()),
        Directive::accessor(Navigator, "appVersion", nav.app_version.as_str()),
        Directive::accessor(Navigator, "platform", nav.platform.as_str()),
        Directive::accessor(Navigator, "vendor", nav.vendor.as_str()),
        Directive::accessor(Navigator, "language", nav.language.as_str()),
        Directive::accessor(Navigator, "languages", JsValue::FrozenArray(nav.languages.clone())),
        Directive::accessor(Navigator, "hardwareConcurrency", nav.hardware_concurrency),
        Directive::accessor(Navigator, "deviceMemory", nav.device_memory),
        Directive::accessor(Navigator, "maxTouchPoints", nav.max_touch_points),
        Directive::accessor(Navigator, "productSub", nav.product_sub.as_str()),
        Directive::accessor(Navigator, "doNotTrack", nav.do_not_track.clone()),
        Directive::accessor(Navigator, "cookieEnabled", nav.cookie_enabled),
        // Screen
        Directive::accessor(Screen, "width", screen.width),
        Directive::accessor(Screen, "height", screen.height),
        Directive::accessor(Screen, "availWidth", screen.avail_width),
        Directive::accessor(Screen, "availHeight", screen.avail_height),
        Directive::accessor(Screen, "colorDepth", screen.color_depth),
        Directive::accessor(Screen, "pixelDepth", screen.pixel_depth),
        Directive::accessor(Window, "devicePixelRatio", screen.pixel_ratio),
        // Connection
        Directive::accessor(Connection, "type", net.connection_type.as_str()),
        Directive::accessor(Connection, "effectiveType", net.effective_type.as_str()),
        Directive::accessor(Connection, "downlink", net.downlink),
        Directive::accessor(Connection, "rtt", net.rtt),
    ];

    directives.extend([
        Directive::WebGlParameters {
            vendor: fp.webgl.vendor.clone(),
            renderer: fp.webgl.renderer.clone(),
        },
        Directive::CanvasNoise {
            seed: fp.noise_seed,
        },
        Directive::AudioNoise {
            seed: fp.noise_seed,
            amplitude: fp.audio.noise,
        },
        Directive::FontMetrics {
            seed: fp.noise_seed,
            amplitude: fp.canvas.noise,
        },
        Directive::Timezone {
            zone: fp.timezone.zone.clone(),
            offset_minutes: fp.timezone.offset_minutes,
            locale: fp.timezone.locale.clone(),
        },
        Directive::WebRtc {
            policy: fp.network.webrtc_policy,
        },
        Directive::Plugins {
            plugins: fp.misc.plugins.clone(),
            mime_types: fp.misc.mime_types.clone(),
        },
        Directive::Permissions {
            states: fp.misc.permissions.clone(),
        },
    ]);

    directives
}
