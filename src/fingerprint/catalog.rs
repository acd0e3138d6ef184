//! Fingerprint Catalogs
//!
//! Fixed tables of real-world values the generator draws from. Every correlated
//! group (GPU vendor + renderer, timezone + offset + locale, Chrome + Edge version)
//! is stored as one entry so that a draw can never mix values from different rows.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::generator::{BrowserFamily, TargetOs};
use super::{MimeTypeInfo, MiscProfile, PermissionState, PluginInfo};

/// `navigator.productSub` reported by every Chromium build.
pub const PRODUCT_SUB: &str = "20030107";

/// Screen resolution with a relative popularity weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenEntry {
    pub width: u32,
    pub height: u32,
    pub weight: u32,
}

const fn screen(width: u32, height: u32, weight: u32) -> ScreenEntry {
    ScreenEntry {
        width,
        height,
        weight,
    }
}

/// Common desktop resolutions, weighted by rough market share.
pub const SCREENS: &[ScreenEntry] = &[
    screen(1920, 1080, 35), // Full HD
    screen(1366, 768, 12),
    screen(1536, 864, 10),
    screen(2560, 1440, 10), // QHD
    screen(1440, 900, 7),
    screen(1680, 1050, 5),
    screen(1600, 900, 5),
    screen(1280, 720, 4),
    screen(1280, 1024, 3),
    screen(3840, 2160, 3), // 4K
    screen(2560, 1600, 3),
    screen(1920, 1200, 3),
];

/// Unmasked WebGL vendor/renderer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuEntry {
    pub vendor: &'static str,
    pub renderer: &'static str,
}

const fn gpu(vendor: &'static str, renderer: &'static str) -> GpuEntry {
    GpuEntry { vendor, renderer }
}

pub const FALLBACK_GPU: GpuEntry = gpu(
    "Google Inc. (NVIDIA)",
    "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
);

/// Windows GPUs as reported through ANGLE's Direct3D 11 backend.
pub const WINDOWS_GPUS: &[GpuEntry] = &[
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 4090 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 4080 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce RTX 3070 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    FALLBACK_GPU,
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Ti Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce GTX 1650 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) UHD Graphics 770 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) Iris(R) Xe Graphics Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 6800 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 6700 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    gpu(
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 5700 XT Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
];

pub const MAC_GPUS: &[GpuEntry] = &[
    gpu(
        "Google Inc. (Apple)",
        "ANGLE (Apple, ANGLE Metal Renderer: Apple M1, Unspecified Version)",
    ),
    gpu(
        "Google Inc. (Apple)",
        "ANGLE (Apple, ANGLE Metal Renderer: Apple M2, Unspecified Version)",
    ),
    gpu(
        "Google Inc. (Apple)",
        "ANGLE (Apple, ANGLE Metal Renderer: Apple M3, Unspecified Version)",
    ),
    gpu(
        "Google Inc. (Intel Inc.)",
        "ANGLE (Intel Inc., Intel(R) Iris(TM) Plus Graphics OpenGL Engine, OpenGL 4.1)",
    ),
];

pub const LINUX_GPUS: &[GpuEntry] = &[
    gpu(
        "Google Inc. (NVIDIA Corporation)",
        "ANGLE (NVIDIA Corporation, NVIDIA GeForce RTX 3060/PCIe/SSE2, OpenGL 4.5.0)",
    ),
    gpu(
        "Google Inc. (NVIDIA Corporation)",
        "ANGLE (NVIDIA Corporation, NVIDIA GeForce GTX 1660 SUPER/PCIe/SSE2, OpenGL 4.5.0)",
    ),
    gpu(
        "Google Inc. (Intel)",
        "ANGLE (Intel, Mesa Intel(R) UHD Graphics 630 (CFL GT2), OpenGL 4.6)",
    ),
    gpu(
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 6700 XT (radeonsi, navi22, LLVM 15.0.7), OpenGL 4.6)",
    ),
];

pub fn gpus_for(os: TargetOs) -> &'static [GpuEntry] {
    match os {
        TargetOs::Windows => WINDOWS_GPUS,
        TargetOs::MacOs => MAC_GPUS,
        TargetOs::Linux => LINUX_GPUS,
    }
}

static KNOWN_GPUS: Lazy<HashSet<GpuEntry>> = Lazy::new(|| {
    WINDOWS_GPUS
        .iter()
        .chain(MAC_GPUS)
        .chain(LINUX_GPUS)
        .copied()
        .collect()
});

/// Whether (vendor, renderer) is one catalog row.
pub fn is_known_gpu(vendor: &str, renderer: &str) -> bool {
    KNOWN_GPUS.iter().any(|g| g.vendor == vendor && g.renderer == renderer)
}

/// IANA zone with its standard-time `getTimezoneOffset` value and a matching locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneEntry {
    pub zone: &'static str,
    /// Minutes behind UTC (New York = 300, Berlin = -60)
    pub offset_minutes: i32,
    pub locale: &'static str,
}

const fn tz(zone: &'static str, offset_minutes: i32, locale: &'static str) -> TimezoneEntry {
    TimezoneEntry {
        zone,
        offset_minutes,
        locale,
    }
}

pub const TIMEZONES: &[TimezoneEntry] = &[
    tz("America/New_York", 300, "en-US"),
    tz("America/Chicago", 360, "en-US"),
    tz("America/Denver", 420, "en-US"),
    tz("America/Los_Angeles", 480, "en-US"),
    tz("America/Toronto", 300, "en-CA"),
    tz("America/Sao_Paulo", 180, "pt-BR"),
    tz("Europe/London", 0, "en-GB"),
    tz("Europe/Paris", -60, "fr-FR"),
    tz("Europe/Berlin", -60, "de-DE"),
    tz("Europe/Madrid", -60, "es-ES"),
    tz("Europe/Rome", -60, "it-IT"),
    tz("Europe/Amsterdam", -60, "nl-NL"),
    tz("Europe/Warsaw", -60, "pl-PL"),
    tz("Asia/Kolkata", -330, "en-IN"),
    tz("Asia/Shanghai", -480, "zh-CN"),
    tz("Asia/Singapore", -480, "en-SG"),
    tz("Asia/Seoul", -540, "ko-KR"),
    tz("Asia/Tokyo", -540, "ja-JP"),
    tz("Australia/Sydney", -600, "en-AU"),
];

static TIMEZONE_OFFSETS: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    TIMEZONES
        .iter()
        .map(|t| (t.zone, t.offset_minutes))
        .collect()
});

/// Whether `zone` is in the table with exactly this offset.
pub fn is_valid_timezone(zone: &str, offset_minutes: i32) -> bool {
    TIMEZONE_OFFSETS.get(zone) == Some(&offset_minutes)
}

/// Accept-Language style list for a locale: the locale, its base language, then
/// English if not already present.
pub fn languages_for_locale(locale: &str) -> Vec<String> {
    let mut languages = vec![locale.to_string()];
    if let Some((base, _)) = locale.split_once('-') {
        languages.push(base.to_string());
    }
    if !languages.iter().any(|l| l == "en") {
        languages.push("en".to_string());
    }
    languages
}

/// Chrome build and the Edge build shipped on the same Chromium version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPair {
    pub chrome: &'static str,
    pub edge: &'static str,
}

const fn versions(chrome: &'static str, edge: &'static str) -> VersionPair {
    VersionPair { chrome, edge }
}

pub const BROWSER_VERSIONS: &[VersionPair] = &[
    versions("131.0.6778.86", "131.0.2903.86"),
    versions("131.0.6778.70", "131.0.2903.70"),
    versions("130.0.6723.91", "130.0.2849.80"),
    versions("130.0.6723.70", "130.0.2849.68"),
];

/// Builds the user agent string for an OS / browser family / version triple.
pub fn user_agent(os: TargetOs, browser: BrowserFamily, version: VersionPair) -> String {
    let platform = match os {
        TargetOs::Windows => "Windows NT 10.0; Win64; x64",
        TargetOs::MacOs => "Macintosh; Intel Mac OS X 10_15_7",
        TargetOs::Linux => "X11; Linux x86_64",
    };

    let base = format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
        platform, version.chrome
    );

    match browser {
        BrowserFamily::Chrome => base,
        BrowserFamily::Edge => format!("{} Edg/{}", base, version.edge),
    }
}

const WINDOWS_FONTS: &[&str] = &[
    "Arial",
    "Arial Black",
    "Calibri",
    "Cambria",
    "Cambria Math",
    "Comic Sans MS",
    "Consolas",
    "Constantia",
    "Corbel",
    "Courier New",
    "Georgia",
    "Impact",
    "Lucida Console",
    "Lucida Sans Unicode",
    "Microsoft Sans Serif",
    "Palatino Linotype",
    "Segoe UI",
    "Segoe UI Symbol",
    "Tahoma",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
    "Wingdings",
];

const MAC_FONTS: &[&str] = &[
    "American Typewriter",
    "Arial",
    "Avenir",
    "Avenir Next",
    "Courier New",
    "Futura",
    "Geneva",
    "Georgia",
    "Gill Sans",
    "Helvetica",
    "Helvetica Neue",
    "Lucida Grande",
    "Menlo",
    "Monaco",
    "Optima",
    "Palatino",
    "SF Pro",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
];

const LINUX_FONTS: &[&str] = &[
    "Cantarell",
    "DejaVu Sans",
    "DejaVu Sans Mono",
    "DejaVu Serif",
    "Droid Sans",
    "FreeMono",
    "Liberation Mono",
    "Liberation Sans",
    "Liberation Serif",
    "Noto Sans",
    "Noto Serif",
    "Ubuntu",
    "Ubuntu Mono",
];

pub fn fonts_for(os: TargetOs) -> &'static [&'static str] {
    match os {
        TargetOs::Windows => WINDOWS_FONTS,
        TargetOs::MacOs => MAC_FONTS,
        TargetOs::Linux => LINUX_FONTS,
    }
}

/// Chromium's built-in PDF viewer entries, identical on every platform.
pub fn plugins() -> Vec<PluginInfo> {
    [
        "PDF Viewer",
        "Chrome PDF Viewer",
        "Chromium PDF Viewer",
        "Microsoft Edge PDF Viewer",
        "WebKit built-in PDF",
    ]
    .iter()
    .map(|name| PluginInfo::new(*name, "Portable Document Format", "internal-pdf-viewer"))
    .collect()
}

pub fn mime_types() -> Vec<MimeTypeInfo> {
    vec![
        MimeTypeInfo::new("application/pdf", "Portable Document Format", "pdf"),
        MimeTypeInfo::new("text/pdf", "Portable Document Format", "pdf"),
    ]
}

pub fn permissions() -> BTreeMap<String, PermissionState> {
    ["geolocation", "notifications", "camera", "microphone"]
        .iter()
        .map(|name| (name.to_string(), PermissionState::Prompt))
        .collect()
}

pub fn misc_profile() -> MiscProfile {
    MiscProfile {
        plugins: plugins(),
        mime_types: mime_types(),
        permissions: permissions(),
    }
}
