//! JavaScript Rendering
//!
//! Single pass over a directive list producing the override program's source. The
//! output is a self-contained IIFE: a guard check, a small helper prelude (native
//! `toString` masking, getter installation, method wrapping, the seeded noise
//! generator) and one block per directive.
//!
//! Rendering is pure: the same directives and guard always produce byte-identical
//! source.

use serde_json::{json, Value};

use super::directive::{Directive, JsValue};
use super::noise::{AUDIO_STREAM, CANVAS_STREAM, FONT_STREAM, SELECTION_MASK};
use crate::fingerprint::{MimeTypeInfo, NoiseSeed, PermissionState, PluginInfo, WebRtcPolicy};
use std::collections::BTreeMap;

/// `WEBGL_debug_renderer_info.UNMASKED_VENDOR_WEBGL`
pub const UNMASKED_VENDOR_WEBGL: u32 = 37445;
/// `WEBGL_debug_renderer_info.UNMASKED_RENDERER_WEBGL`
pub const UNMASKED_RENDERER_WEBGL: u32 = 37446;

const PRELUDE: &str = r#"
    // ========================================================================
    // Helpers
    // ========================================================================

    const nativeToString = Function.prototype.toString;
    const masked = new WeakMap();
    const patchedToString = function toString() {
        if (masked.has(this)) {
            return masked.get(this);
        }
        return nativeToString.call(this);
    };
    masked.set(patchedToString, nativeToString.call(nativeToString));
    Object.defineProperty(Function.prototype, 'toString', {
        value: patchedToString,
        configurable: true,
        writable: true,
        enumerable: false
    });

    const mask = (fn, name) => {
        masked.set(fn, 'function ' + name + '() { [native code] }');
        return fn;
    };

    const accessor = (target, prop, value) => {
        if (!target) {
            return;
        }
        // one frozen array for every read, so repeated reads are identical
        const frozen = Array.isArray(value) ? Object.freeze(value.slice()) : value;
        const getter = mask(function () {
            return frozen;
        }, 'get ' + prop);
        try {
            Object.defineProperty(target, prop, {
                get: getter,
                configurable: true,
                enumerable: true
            });
        } catch (e) {}
    };

    const wrap = (proto, name, factory) => {
        if (!proto || typeof proto[name] !== 'function') {
            return;
        }
        const descriptor = Object.getOwnPropertyDescriptor(proto, name);
        const replacement = mask(factory(proto[name]), name);
        try {
            Object.defineProperty(proto, name, {
                value: replacement,
                configurable: true,
                writable: true,
                enumerable: descriptor ? descriptor.enumerable : false
            });
        } catch (e) {}
    };

    const mix32 = (h) => {
        h = Math.imul(h ^ (h >>> 16), 0x045d9f3b);
        h = Math.imul(h ^ (h >>> 13), 0x045d9f3b);
        return (h ^ (h >>> 16)) >>> 0;
    };

    const rotl = (x, k) => (x << k) | (x >>> (32 - k));

    // xoshiro128**, re-created on every read so repeated reads agree
    const noiseRng = (seed, stream) => {
        const salt = Math.imul(stream, 0x9e3779b9);
        const s = seed.map((w, i) => mix32(w ^ salt ^ i));
        if (s[0] === 0 && s[1] === 0 && s[2] === 0 && s[3] === 0) {
            s[0] = 1;
        }
        return () => {
            const result = Math.imul(rotl(Math.imul(s[1], 5), 7), 9) >>> 0;
            const t = s[1] << 9;
            s[2] ^= s[0];
            s[3] ^= s[1];
            s[1] ^= s[2];
            s[0] ^= s[3];
            s[2] ^= t;
            s[3] = rotl(s[3], 11);
            return result;
        };
    };

    const fnv1a = (text) => {
        let h = 0x811c9dc5;
        for (let i = 0; i < text.length; i++) {
            h = Math.imul(h ^ text.charCodeAt(i), 0x01000193);
        }
        return h >>> 0;
    };
"#;

/// Renders the directive list into the override program's source.
///
/// `guard` names the non-enumerable `window` property marking that the program
/// already ran in the current document.
pub fn render(directives: &[Directive], guard: &str) -> String {
    let mut out = String::with_capacity(16 * 1024);

    out.push_str("(function () {\n    'use strict';\n\n");
    out.push_str(&format!("    const GUARD = {};\n", js_str(guard)));
    out.push_str(
        r#"    if (Object.prototype.hasOwnProperty.call(window, GUARD)) {
        return;
    }
    Object.defineProperty(window, GUARD, {
        value: true,
        enumerable: false,
        configurable: false,
        writable: false
    });
"#,
    );
    out.push_str(PRELUDE);

    let mut in_accessors = false;
    for directive in directives {
        match directive {
            Directive::Accessor {
                target,
                property,
                value,
            } => {
                if !in_accessors {
                    out.push_str(&banner("Properties"));
                    in_accessors = true;
                }
                out.push_str(&format!(
                    "    accessor({}, {}, {});\n",
                    target.js_expr(),
                    js_str(property),
                    value.to_js()
                ));
                continue;
            }
            Directive::RemoveAutomationMarkers { globals } => {
                out.push_str(&banner("Automation markers"));
                out.push_str(&automation_markers(globals));
            }
            Directive::WebGlParameters { vendor, renderer } => {
                out.push_str(&banner("WebGL"));
                out.push_str(&webgl(vendor, renderer));
            }
            Directive::CanvasNoise { seed } => {
                out.push_str(&banner("Canvas"));
                out.push_str(&canvas_noise(*seed));
            }
            Directive::AudioNoise { seed, amplitude } => {
                out.push_str(&banner("Audio"));
                out.push_str(&audio_noise(*seed, *amplitude));
            }
            Directive::FontMetrics { seed, amplitude } => {
                out.push_str(&banner("Text metrics"));
                out.push_str(&font_metrics(*seed, *amplitude));
            }
            Directive::Timezone {
                zone,
                offset_minutes,
                locale,
            } => {
                out.push_str(&banner("Timezone"));
                out.push_str(&timezone(zone, *offset_minutes, locale));
            }
            Directive::WebRtc { policy } => {
                out.push_str(&banner("WebRTC"));
                out.push_str(&webrtc(*policy));
            }
            Directive::Plugins {
                plugins,
                mime_types,
            } => {
                out.push_str(&banner("Plugins"));
                out.push_str(&plugins_block(plugins, mime_types));
            }
            Directive::Permissions { states } => {
                out.push_str(&banner("Permissions"));
                out.push_str(&permissions(states));
            }
        }
        in_accessors = false;
    }

    out.push_str("})();\n");
    out
}

fn banner(title: &str) -> String {
    format!(
        "\n    // ========================================================================\n    // {}\n    // ========================================================================\n\n",
        title
    )
}

fn js_str(s: &str) -> String {
    JsValue::Str(s.to_string()).to_js()
}

fn seed_literal(seed: NoiseSeed) -> String {
    let words = seed.words();
    format!("[{}, {}, {}, {}]", words[0], words[1], words[2], words[3])
}

fn automation_markers(globals: &[&'static str]) -> String {
    let names = Value::from(globals.to_vec());
    format!(
        r#"    {names}.forEach((name) => {{
        try {{
            delete window[name];
        }} catch (e) {{}}
        if (name in window) {{
            try {{
                Object.defineProperty(window, name, {{ value: undefined, configurable: true }});
            }} catch (e) {{}}
        }}
    }});
    try {{
        Object.keys(document)
            .filter((key) => /^\$?cdc_/.test(key))
            .forEach((key) => delete document[key]);
    }} catch (e) {{}}
    try {{
        delete Object.getPrototypeOf(navigator).webdriver;
    }} catch (e) {{}}
"#,
        names = names
    )
}

fn webgl(vendor: &str, renderer: &str) -> String {
    format!(
        r#"    (function () {{
        const VENDOR = {vendor};
        const RENDERER = {renderer};
        const patch = (ctor) => {{
            if (typeof ctor === 'undefined') {{
                return;
            }}
            wrap(ctor.prototype, 'getParameter', (original) => function getParameter(parameter) {{
                if (parameter === {vendor_param}) {{
                    return VENDOR;
                }}
                if (parameter === {renderer_param}) {{
                    return RENDERER;
                }}
                return original.apply(this, arguments);
            }});
        }};
        patch(window.WebGLRenderingContext);
        patch(window.WebGL2RenderingContext);
    }})();
"#,
        vendor = js_str(vendor),
        renderer = js_str(renderer),
        vendor_param = UNMASKED_VENDOR_WEBGL,
        renderer_param = UNMASKED_RENDERER_WEBGL,
    )
}

fn canvas_noise(seed: NoiseSeed) -> String {
    format!(
        r#"    (function () {{
        const SEED = {seed};
        const perturb = (data) => {{
            const next = noiseRng(SEED, {stream});
            for (let p = 0; p + 3 < data.length; p += 4) {{
                const r = next();
                if ((r & {mask}) !== 0) {{
                    continue;
                }}
                const c = p + ((r >>> 8) % 3);
                const v = data[c];
                if ((r >>> 5) & 1) {{
                    data[c] = v === 255 ? 254 : v + 1;
                }} else {{
                    data[c] = v === 0 ? 1 : v - 1;
                }}
            }}
        }};

        if (typeof CanvasRenderingContext2D === 'undefined') {{
            return;
        }}
        const nativeGetImageData = CanvasRenderingContext2D.prototype.getImageData;

        wrap(CanvasRenderingContext2D.prototype, 'getImageData', (original) => function getImageData() {{
            const image = original.apply(this, arguments);
            perturb(image.data);
            return image;
        }});

        const noisyCopy = (canvas) => {{
            try {{
                if (!canvas.width || !canvas.height || typeof document === 'undefined') {{
                    return null;
                }}
                const copy = document.createElement('canvas');
                copy.width = canvas.width;
                copy.height = canvas.height;
                const ctx = copy.getContext('2d');
                ctx.drawImage(canvas, 0, 0);
                const image = nativeGetImageData.call(ctx, 0, 0, copy.width, copy.height);
                perturb(image.data);
                ctx.putImageData(image, 0, 0);
                return copy;
            }} catch (e) {{
                return null;
            }}
        }};

        if (typeof HTMLCanvasElement !== 'undefined') {{
            wrap(HTMLCanvasElement.prototype, 'toDataURL', (original) => function toDataURL() {{
                return original.apply(noisyCopy(this) || this, arguments);
            }});
            wrap(HTMLCanvasElement.prototype, 'toBlob', (original) => function toBlob() {{
                return original.apply(noisyCopy(this) || this, arguments);
            }});
        }}
    }})();
"#,
        seed = seed_literal(seed),
        stream = CANVAS_STREAM,
        mask = SELECTION_MASK,
    )
}

fn audio_noise(seed: NoiseSeed, amplitude: f64) -> String {
    format!(
        r#"    (function () {{
        const SEED = {seed};
        const AMPLITUDE = {amplitude};
        const perturb = (data) => {{
            const next = noiseRng(SEED, {stream});
            for (let i = 0; i < data.length; i++) {{
                const r = next();
                if ((r & {mask}) !== 0) {{
                    continue;
                }}
                data[i] = data[i] + ((r >>> 5) / 134217728 * 2 - 1) * AMPLITUDE;
            }}
        }};

        // getChannelData hands out the same array on every call
        const touched = new WeakSet();
        if (typeof AudioBuffer !== 'undefined') {{
            wrap(AudioBuffer.prototype, 'getChannelData', (original) => function getChannelData() {{
                const data = original.apply(this, arguments);
                if (!touched.has(data)) {{
                    touched.add(data);
                    perturb(data);
                }}
                return data;
            }});
        }}
        if (typeof AnalyserNode !== 'undefined') {{
            wrap(AnalyserNode.prototype, 'getFloatFrequencyData', (original) => function getFloatFrequencyData(array) {{
                const result = original.apply(this, arguments);
                perturb(array);
                return result;
            }});
        }}
    }})();
"#,
        seed = seed_literal(seed),
        amplitude = JsValue::Float(amplitude).to_js(),
        stream = AUDIO_STREAM,
        mask = SELECTION_MASK,
    )
}

fn font_metrics(seed: NoiseSeed, amplitude: f64) -> String {
    format!(
        r#"    (function () {{
        const SEED = {seed};
        const AMPLITUDE = {amplitude};
        if (typeof CanvasRenderingContext2D === 'undefined') {{
            return;
        }}
        wrap(CanvasRenderingContext2D.prototype, 'measureText', (original) => function measureText(text) {{
            const metrics = original.apply(this, arguments);
            const next = noiseRng(SEED, ({stream} ^ fnv1a(String(text))) >>> 0);
            const factor = 1 + ((next() >>> 5) / 134217728 * 2 - 1) * AMPLITUDE;
            try {{
                Object.defineProperty(metrics, 'width', {{ value: metrics.width * factor, configurable: true }});
            }} catch (e) {{}}
            return metrics;
        }});
    }})();
"#,
        seed = seed_literal(seed),
        amplitude = JsValue::Float(amplitude).to_js(),
        stream = FONT_STREAM,
    )
}

fn timezone(zone: &str, offset_minutes: i32, locale: &str) -> String {
    format!(
        r#"    (function () {{
        const ZONE = {zone};
        const OFFSET = {offset};
        const LOCALE = {locale};

        wrap(Date.prototype, 'getTimezoneOffset', () => function getTimezoneOffset() {{
            return OFFSET;
        }});

        const withZone = (options) => {{
            const opts = Object.assign({{}}, options);
            if (opts.timeZone === undefined) {{
                opts.timeZone = ZONE;
            }}
            return opts;
        }};

        const NativeDateTimeFormat = Intl.DateTimeFormat;

        // long zone name whose offset matches OFFSET, checked in January and July
        const ZONE_NAME = (() => {{
            try {{
                const probe = new NativeDateTimeFormat('en-US', {{
                    timeZone: ZONE,
                    timeZoneName: 'long',
                    hourCycle: 'h23',
                    year: 'numeric',
                    month: 'numeric',
                    day: 'numeric',
                    hour: 'numeric',
                    minute: 'numeric'
                }});
                for (const month of [0, 6]) {{
                    const at = Date.UTC(2024, month, 15, 12);
                    const parts = {{}};
                    probe.formatToParts(at).forEach((part) => {{
                        parts[part.type] = part.value;
                    }});
                    const local = Date.UTC(+parts.year, +parts.month - 1, +parts.day, +parts.hour % 24, +parts.minute);
                    if ((at - local) / 60000 === OFFSET && parts.timeZoneName) {{
                        return parts.timeZoneName;
                    }}
                }}
            }} catch (e) {{}}
            return ZONE;
        }})();

        const DateTimeFormat = mask(function DateTimeFormat(locales, options) {{
            return new NativeDateTimeFormat(locales === undefined ? LOCALE : locales, withZone(options));
        }}, 'DateTimeFormat');
        DateTimeFormat.prototype = NativeDateTimeFormat.prototype;
        DateTimeFormat.supportedLocalesOf = NativeDateTimeFormat.supportedLocalesOf;
        Object.defineProperty(Intl, 'DateTimeFormat', {{
            value: DateTimeFormat,
            configurable: true,
            writable: true,
            enumerable: false
        }});

        ['toLocaleString', 'toLocaleDateString', 'toLocaleTimeString'].forEach((name) => {{
            wrap(Date.prototype, name, (original) => function (locales, options) {{
                return original.call(this, locales === undefined ? LOCALE : locales, withZone(options));
            }});
        }});

        // Local-time getters and strings read the zone's wall clock.
        const nativeGetTime = Date.prototype.getTime;
        const wallClock = (date) => {{
            const time = nativeGetTime.call(date);
            return isNaN(time) ? null : new Date(time - OFFSET * 60000);
        }};

        [
            ['getFullYear', 'getUTCFullYear'],
            ['getMonth', 'getUTCMonth'],
            ['getDate', 'getUTCDate'],
            ['getDay', 'getUTCDay'],
            ['getHours', 'getUTCHours'],
            ['getMinutes', 'getUTCMinutes']
        ].forEach(([local, utc]) => {{
            const utcGetter = Date.prototype[utc];
            wrap(Date.prototype, local, () => function () {{
                const wall = wallClock(this);
                return wall === null ? NaN : utcGetter.call(wall);
            }});
        }});

        const DAYS = ['Sun', 'Mon', 'Tue', 'Wed', 'Thu', 'Fri', 'Sat'];
        const MONTHS = ['Jan', 'Feb', 'Mar', 'Apr', 'May', 'Jun', 'Jul', 'Aug', 'Sep', 'Oct', 'Nov', 'Dec'];
        const pad = (n) => String(n).padStart(2, '0');
        const GMT = (() => {{
            const east = -OFFSET;
            const abs = Math.abs(east);
            return 'GMT' + (east < 0 ? '-' : '+') + pad(Math.floor(abs / 60)) + pad(abs % 60);
        }})();

        const dateString = (wall) => DAYS[wall.getUTCDay()] + ' ' + MONTHS[wall.getUTCMonth()] + ' ' +
            pad(wall.getUTCDate()) + ' ' + String(wall.getUTCFullYear()).padStart(4, '0');
        const timeString = (wall) => pad(wall.getUTCHours()) + ':' + pad(wall.getUTCMinutes()) + ':' +
            pad(wall.getUTCSeconds()) + ' ' + GMT + ' (' + ZONE_NAME + ')';

        wrap(Date.prototype, 'toString', () => function toString() {{
            const wall = wallClock(this);
            return wall === null ? 'Invalid Date' : dateString(wall) + ' ' + timeString(wall);
        }});
        wrap(Date.prototype, 'toDateString', () => function toDateString() {{
            const wall = wallClock(this);
            return wall === null ? 'Invalid Date' : dateString(wall);
        }});
        wrap(Date.prototype, 'toTimeString', () => function toTimeString() {{
            const wall = wallClock(this);
            return wall === null ? 'Invalid Date' : timeString(wall);
        }});
    }})();
"#,
        zone = js_str(zone),
        offset = offset_minutes,
        locale = js_str(locale),
    )
}

fn webrtc(policy: WebRtcPolicy) -> String {
    match policy {
        WebRtcPolicy::Allow => "    // WebRTC left untouched\n".to_string(),
        WebRtcPolicy::Disable => r#"    ['RTCPeerConnection', 'webkitRTCPeerConnection', 'RTCDataChannel', 'RTCSessionDescription', 'RTCIceCandidate'].forEach((name) => {
        try {
            Object.defineProperty(window, name, { value: undefined, configurable: true, writable: true });
        } catch (e) {}
    });
    if (navigator.mediaDevices) {
        const devices = Object.getPrototypeOf(navigator.mediaDevices);
        wrap(devices, 'enumerateDevices', () => function enumerateDevices() {
            return Promise.resolve([]);
        });
        wrap(devices, 'getUserMedia', () => function getUserMedia() {
            return Promise.reject(new DOMException('Permission denied', 'NotAllowedError'));
        });
    }
"#
        .to_string(),
    }
}

fn plugins_block(plugins: &[PluginInfo], mime_types: &[MimeTypeInfo]) -> String {
    let plugin_data: Vec<Value> = plugins
        .iter()
        .map(|p| json!({ "name": p.name, "description": p.description, "filename": p.filename }))
        .collect();
    let mime_data: Vec<Value> = mime_types
        .iter()
        .map(|m| json!({ "type": m.mime_type, "description": m.description, "suffixes": m.suffixes }))
        .collect();
    let pdf_viewer = mime_types.iter().any(|m| m.mime_type == "application/pdf");

    format!(
        r#"    (function () {{
        if (typeof Plugin === 'undefined' || typeof MimeType === 'undefined') {{
            return;
        }}
        const PLUGINS = {plugins};
        const MIME_TYPES = {mime_types};

        const define = (obj, props) => {{
            Object.keys(props).forEach((key) => {{
                Object.defineProperty(obj, key, {{ value: props[key], enumerable: true }});
            }});
            return obj;
        }};

        const makeArray = (proto, items, key) => {{
            const arr = Object.create(proto);
            items.forEach((item, i) => {{
                Object.defineProperty(arr, i, {{ value: item, enumerable: true }});
                Object.defineProperty(arr, item[key], {{ value: item, enumerable: false }});
            }});
            Object.defineProperty(arr, 'length', {{ value: items.length }});
            Object.defineProperty(arr, 'item', {{
                value: mask(function item(i) {{ return items[i] || null; }}, 'item')
            }});
            Object.defineProperty(arr, 'namedItem', {{
                value: mask(function namedItem(name) {{ return items.find((it) => it[key] === name) || null; }}, 'namedItem')
            }});
            return arr;
        }};

        const plugins = PLUGINS.map((data) => define(Object.create(Plugin.prototype), data));
        const mimeTypes = MIME_TYPES.map((data) => define(Object.create(MimeType.prototype), data));
        plugins.forEach((plugin) => {{
            mimeTypes.forEach((mime, i) => {{
                Object.defineProperty(plugin, i, {{ value: mime, enumerable: true }});
                Object.defineProperty(plugin, mime.type, {{ value: mime, enumerable: false }});
            }});
            Object.defineProperty(plugin, 'length', {{ value: mimeTypes.length }});
        }});
        mimeTypes.forEach((mime) => {{
            Object.defineProperty(mime, 'enabledPlugin', {{ value: plugins[0] || null, enumerable: true }});
        }});

        accessor(Navigator.prototype, 'plugins', makeArray(PluginArray.prototype, plugins, 'name'));
        accessor(Navigator.prototype, 'mimeTypes', makeArray(MimeTypeArray.prototype, mimeTypes, 'type'));
        accessor(Navigator.prototype, 'pdfViewerEnabled', {pdf_viewer});
    }})();
"#,
        plugins = Value::from(plugin_data),
        mime_types = Value::from(mime_data),
        pdf_viewer = pdf_viewer,
    )
}

fn permissions(states: &BTreeMap<String, PermissionState>) -> String {
    let map: serde_json::Map<String, Value> = states
        .iter()
        .map(|(name, state)| (name.clone(), Value::from(state.as_str())))
        .collect();

    format!(
        r#"    (function () {{
        const STATES = {states};
        if (typeof Permissions !== 'undefined') {{
            wrap(Permissions.prototype, 'query', (original) => function query(descriptor) {{
                const name = descriptor && descriptor.name;
                if (name && Object.prototype.hasOwnProperty.call(STATES, name)) {{
                    const status = Object.create(
                        typeof PermissionStatus !== 'undefined' ? PermissionStatus.prototype : Object.prototype,
                        {{
                            name: {{ value: name, enumerable: true }},
                            state: {{ value: STATES[name], enumerable: true }},
                            onchange: {{ value: null, writable: true, enumerable: true }}
                        }}
                    );
                    return Promise.resolve(status);
                }}
                return original.apply(this, arguments);
            }});
        }}
        if (typeof Notification !== 'undefined' && STATES.notifications) {{
            accessor(Notification, 'permission', STATES.notifications === 'prompt' ? 'default' : STATES.notifications);
        }}
    }})();
"#,
        states = Value::Object(map),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::stealth::directive::compile;

    #[test]
    fn test_guard_comes_first() {
        let source = render(&compile(&Fingerprint::fallback()), "__pm_test");
        let guard = source.find("hasOwnProperty.call(window, GUARD)").unwrap();
        let prelude = source.find("const nativeToString").unwrap();
        assert!(guard < prelude);
        assert!(source.contains("const GUARD = \"__pm_test\";"));
    }

    #[test]
    fn test_allow_policy_leaves_webrtc() {
        let mut fp = Fingerprint::fallback();
        fp.network.webrtc_policy = WebRtcPolicy::Allow;
        let source = render(&compile(&fp), "__pm_test");
        assert!(!source.contains("RTCPeerConnection"));
    }

    #[test]
    fn test_strings_are_escaped() {
        let mut fp = Fingerprint::fallback();
        fp.navigator.user_agent = "evil\"); alert(1); (\"".to_string();
        let source = render(&compile(&fp), "__pm_test");
        assert!(source.contains(r#""evil\"); alert(1); (\"""#));
    }

    #[test]
    fn test_webgl_constants() {
        let source = render(&compile(&Fingerprint::fallback()), "__pm_test");
        assert!(source.contains("parameter === 37445"));
        assert!(source.contains("parameter === 37446"));
        assert!(source.contains("window.WebGL2RenderingContext"));
    }
}
