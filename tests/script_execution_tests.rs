//! Runs synthesized override programs in an embedded JavaScript engine
//!
//! The page-side noise must agree with the Rust implementation in
//! `stealth::noise` bit for bit, a second run in the same document must be a
//! no-op, and the spoofed getters and Date strings must read as configured.

use boa_engine::{Context, JsValue, Source};

use profile_mask::fingerprint::{Fingerprint, FingerprintGenerator, GenerateOptions};
use profile_mask::stealth::noise::{apply_to_rgba, font_width_factor, perturb_samples};
use profile_mask::stealth::synthesize;

/// Minimal browser surface the program touches.
const BROWSER_STUBS: &str = r#"
globalThis.window = globalThis;
function Navigator() {}
function Screen() {}
globalThis.navigator = Object.create(Navigator.prototype);
globalThis.screen = Object.create(Screen.prototype);
globalThis.document = {};

function CanvasRenderingContext2D() {}
CanvasRenderingContext2D.prototype.getImageData = function (x, y, w, h) {
    return { data: new Uint8ClampedArray(w * h * 4).fill(128) };
};
CanvasRenderingContext2D.prototype.measureText = function (text) {
    return { width: 100 };
};

function AudioBuffer(length) {
    this.samples = new Float32Array(length).fill(0.25);
}
AudioBuffer.prototype.getChannelData = function () {
    return this.samples;
};

globalThis.Intl = { DateTimeFormat: function DateTimeFormat() {} };
"#;

const SIDE: usize = 64;
const SAMPLES: usize = 4096;

fn fingerprint() -> Fingerprint {
    let mut fp = FingerprintGenerator::from_seed(31).generate(&GenerateOptions::default());
    fp.navigator.hardware_concurrency = 8;
    fp
}

fn browser() -> Context {
    let mut context = Context::default();
    eval(&mut context, BROWSER_STUBS);
    context
}

fn eval(context: &mut Context, code: &str) -> JsValue {
    context
        .eval(Source::from_bytes(code))
        .unwrap_or_else(|e| panic!("script failed: {}", e))
}

fn eval_string(context: &mut Context, code: &str) -> String {
    let value = eval(context, code);
    value.to_string(context).unwrap().to_std_string_escaped()
}

fn eval_number(context: &mut Context, code: &str) -> f64 {
    eval(context, code).as_number().unwrap()
}

fn canvas_read(context: &mut Context) -> String {
    eval_string(
        context,
        &format!(
            "Array.from(new CanvasRenderingContext2D().getImageData(0, 0, {side}, {side}).data).join(',')",
            side = SIDE
        ),
    )
}

fn expected_canvas(fp: &Fingerprint) -> String {
    let mut data = vec![128u8; SIDE * SIDE * 4];
    apply_to_rgba(fp.noise_seed, &mut data);
    join(data.iter())
}

fn join<T: ToString>(items: impl Iterator<Item = T>) -> String {
    items.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

// ============================================================================
// Noise agrees with the Rust implementation
// ============================================================================

#[test]
fn test_canvas_noise_matches_rust() {
    let fp = fingerprint();
    let mut context = browser();
    eval(&mut context, synthesize(&fp).source());

    let first = canvas_read(&mut context);
    assert_eq!(first, expected_canvas(&fp));
    // Each read starts the generator over.
    assert_eq!(canvas_read(&mut context), first);
}

#[test]
fn test_audio_noise_matches_rust() {
    let fp = fingerprint();
    let mut context = browser();
    eval(&mut context, synthesize(&fp).source());

    let bits = eval_string(
        &mut context,
        &format!(
            "globalThis.buffer = new AudioBuffer({}); buffer.getChannelData(0); \
             Array.from(new Uint32Array(buffer.getChannelData(0).buffer)).join(',')",
            SAMPLES
        ),
    );

    let mut samples = vec![0.25f32; SAMPLES];
    perturb_samples(fp.noise_seed, fp.audio.noise, &mut samples);
    assert_eq!(bits, join(samples.iter().map(|s| s.to_bits())));
}

#[test]
fn test_text_width_matches_rust() {
    let fp = fingerprint();
    let mut context = browser();
    eval(&mut context, synthesize(&fp).source());

    for text in ["Hello", "mmmmmmmmmmlli", "Cwm fjordbank glyphs vext quiz"] {
        let width = eval_number(
            &mut context,
            &format!("new CanvasRenderingContext2D().measureText({:?}).width", text),
        );
        assert_eq!(width, 100.0 * font_width_factor(fp.noise_seed, fp.canvas.noise, text));
    }
}

// ============================================================================
// Guard
// ============================================================================

#[test]
fn test_second_run_is_noop() {
    let fp = fingerprint();
    let source = synthesize(&fp).source().to_string();
    let mut context = browser();

    eval(&mut context, &source);
    eval(
        &mut context,
        "globalThis.firstGetter = Object.getOwnPropertyDescriptor(Navigator.prototype, 'hardwareConcurrency').get; \
         globalThis.firstRead = CanvasRenderingContext2D.prototype.getImageData;",
    );
    eval(&mut context, &source);

    let same = eval(
        &mut context,
        "Object.getOwnPropertyDescriptor(Navigator.prototype, 'hardwareConcurrency').get === firstGetter && \
         CanvasRenderingContext2D.prototype.getImageData === firstRead",
    );
    assert_eq!(same.as_boolean(), Some(true));
    assert_eq!(eval_number(&mut context, "navigator.hardwareConcurrency"), 8.0);
    // Noise applied once, not twice.
    assert_eq!(canvas_read(&mut context), expected_canvas(&fp));
}

// ============================================================================
// Getters and Date
// ============================================================================

#[test]
fn test_getters_read_fingerprint_values() {
    let fp = fingerprint();
    let mut context = browser();
    eval(&mut context, synthesize(&fp).source());

    assert_eq!(eval_string(&mut context, "navigator.userAgent"), fp.navigator.user_agent);
    assert_eq!(eval_string(&mut context, "navigator.platform"), fp.navigator.platform);
    assert_eq!(eval_number(&mut context, "screen.width"), f64::from(fp.screen.width));
    assert_eq!(
        eval(&mut context, "navigator.webdriver").as_boolean(),
        Some(false)
    );
    assert_eq!(
        eval_string(&mut context, "navigator.languages.join(',')"),
        fp.navigator.languages.join(",")
    );
    assert_eq!(
        eval(
            &mut context,
            "navigator.languages === navigator.languages && Object.isFrozen(navigator.languages)"
        )
        .as_boolean(),
        Some(true)
    );
    assert_eq!(
        eval_string(
            &mut context,
            "Object.getOwnPropertyDescriptor(Navigator.prototype, 'userAgent').get.toString()"
        ),
        "function get userAgent() { [native code] }"
    );
}

#[test]
fn test_date_reads_spoofed_zone() {
    let fp = Fingerprint::fallback();
    assert_eq!(fp.timezone.offset_minutes, 300);
    let mut context = browser();
    eval(&mut context, synthesize(&fp).source());

    assert_eq!(eval_number(&mut context, "new Date(0).getTimezoneOffset()"), 300.0);
    assert_eq!(eval_number(&mut context, "new Date(0).getHours()"), 19.0);
    assert_eq!(eval_number(&mut context, "new Date(0).getDate()"), 31.0);
    assert_eq!(eval_number(&mut context, "new Date(0).getFullYear()"), 1969.0);
    assert_eq!(
        eval_string(&mut context, "new Date(0).toString()"),
        "Wed Dec 31 1969 19:00:00 GMT-0500 (America/New_York)"
    );
    assert_eq!(
        eval_string(&mut context, "new Date(0).toTimeString()"),
        "19:00:00 GMT-0500 (America/New_York)"
    );
    assert_eq!(
        eval_string(&mut context, "new Date(0).toDateString()"),
        "Wed Dec 31 1969"
    );
    assert_eq!(
        eval_string(&mut context, "new Date(NaN).toString()"),
        "Invalid Date"
    );
    assert_eq!(
        eval_string(&mut context, "Date.prototype.toString.toString()"),
        "function toString() { [native code] }"
    );
}
