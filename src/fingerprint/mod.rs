//! Browser Fingerprint Model
//!
//! This module defines the synthetic identity record that a profile carries for its
//! whole life. A [`Fingerprint`] groups the observable browser signals by subsystem
//! (navigator, screen, WebGL, canvas, audio, fonts, network, timezone, misc) and is
//! serialized with the profile it belongs to.
//!
//! Fingerprints are values: once assigned to a profile they are never mutated in
//! place. Regenerating an identity produces a new value that replaces the old one.
//!
//! # Invariants
//!
//! - `navigator.webdriver` is always `false`
//! - `screen.avail_width <= screen.width`
//! - `screen.avail_height == screen.height - CHROME_UI_HEIGHT`
//! - `screen.color_depth == screen.pixel_depth`, both 24 or 32
//! - `navigator.app_version == app_version_of(&navigator.user_agent)`
//! - the (timezone, offset) pair comes from the known-valid zone table
//! - the WebGL (vendor, renderer) pair is a catalog entry, never a mix
//!
//! [`Fingerprint::validate`] checks all of them.
//!
//! # Usage
//!
//! ```rust
//! use profile_mask::fingerprint::{FingerprintGenerator, GenerateOptions};
//!
//! let mut generator = FingerprintGenerator::from_seed(42);
//! let fingerprint = generator.generate(&GenerateOptions::default());
//!
//! assert!(!fingerprint.navigator.webdriver);
//! assert!(fingerprint.validate().is_ok());
//! ```

pub mod catalog;
pub mod generator;

pub use generator::{BrowserFamily, FingerprintGenerator, GenerateOptions, TargetOs};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Current schema version of serialized fingerprints.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Height in pixels reserved by the OS taskbar / browser chrome.
pub const CHROME_UI_HEIGHT: u32 = 40;

/// Upper bound of the canvas and audio noise amplitudes.
pub const MAX_NOISE_AMPLITUDE: f64 = 1e-4;

/// Device pixel ratios a generated screen may report.
pub const PIXEL_RATIOS: [f64; 4] = [1.0, 1.25, 1.5, 2.0];

/// Errors reported by [`Fingerprint::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FingerprintError {
    /// One or more invariants do not hold.
    #[error("invalid fingerprint: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// 128-bit seed shared by the canvas, audio and font-metric noise injectors.
///
/// Serialized as 32 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoiseSeed(u128);

impl NoiseSeed {
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    /// The seed as four big-endian 32-bit words, the form the injected script uses.
    pub fn words(&self) -> [u32; 4] {
        [
            (self.0 >> 96) as u32,
            (self.0 >> 64) as u32,
            (self.0 >> 32) as u32,
            self.0 as u32,
        ]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Debug for NoiseSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoiseSeed({})", self.to_hex())
    }
}

impl fmt::Display for NoiseSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for NoiseSeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NoiseSeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NoiseSeed::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Navigator properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorProfile {
    pub user_agent: String,
    /// Always `app_version_of(user_agent)`.
    pub app_version: String,
    /// e.g. "Win32", "MacIntel", "Linux x86_64"
    pub platform: String,
    pub vendor: String,
    pub language: String,
    /// Ordered, primary language first.
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    /// Device memory in GB
    pub device_memory: u32,
    pub max_touch_points: u32,
    pub product_sub: String,
    /// "1", "unspecified" or null
    pub do_not_track: Option<String>,
    pub cookie_enabled: bool,
    /// CRITICAL: must always be false
    pub webdriver: bool,
}

/// Screen geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenProfile {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub color_depth: u32,
    pub pixel_depth: u32,
    pub pixel_ratio: f64,
}

impl ScreenProfile {
    /// Derives the available area and pixel depth from a resolution.
    pub fn new(width: u32, height: u32, color_depth: u32, pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            avail_width: width,
            avail_height: height.saturating_sub(CHROME_UI_HEIGHT),
            color_depth,
            pixel_depth: color_depth,
            pixel_ratio,
        }
    }
}

/// Unmasked WebGL vendor and renderer, always taken together from one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebGlProfile {
    pub vendor: String,
    pub renderer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasProfile {
    /// Noise amplitude in (0, MAX_NOISE_AMPLITUDE]
    pub noise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProfile {
    /// Noise amplitude in (0, MAX_NOISE_AMPLITUDE]
    pub noise: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontProfile {
    /// Font families the identity claims to have.
    ///
    /// Informational: kept with the profile for display and export, but not
    /// enforced in the page. Font probing is only blurred by the seeded
    /// `measureText` jitter.
    pub installed: Vec<String>,
}

/// WebRTC exposure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebRtcPolicy {
    /// Peer connections removed, no media devices.
    Disable,
    /// WebRTC left untouched.
    Allow,
}

impl Default for WebRtcPolicy {
    fn default() -> Self {
        Self::Disable
    }
}

/// Cosmetic network information (navigator.connection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(rename = "webRTCPolicy")]
    pub webrtc_policy: WebRtcPolicy,
    pub connection_type: String,
    pub effective_type: String,
    /// Mbit/s
    pub downlink: f64,
    /// Milliseconds
    pub rtt: u32,
}

/// Timezone identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneProfile {
    /// IANA zone name
    pub zone: String,
    /// `Date.prototype.getTimezoneOffset` value: minutes behind UTC, standard time.
    pub offset_minutes: i32,
    pub locale: String,
}

/// Information about a browser plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub filename: String,
}

impl PluginInfo {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            filename: filename.into(),
        }
    }
}

/// Information about a MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimeTypeInfo {
    /// MIME type string (e.g., "application/pdf")
    pub mime_type: String,
    pub description: String,
    /// File extensions (e.g., "pdf")
    pub suffixes: String,
}

impl MimeTypeInfo {
    pub fn new(
        mime_type: impl Into<String>,
        description: impl Into<String>,
        suffixes: impl Into<String>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            description: description.into(),
            suffixes: suffixes.into(),
        }
    }
}

/// State reported by `navigator.permissions.query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiscProfile {
    pub plugins: Vec<PluginInfo>,
    pub mime_types: Vec<MimeTypeInfo>,
    /// Ordered so that synthesized scripts are stable.
    pub permissions: BTreeMap<String, PermissionState>,
}

/// Complete browser fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub version: u32,
    pub navigator: NavigatorProfile,
    pub screen: ScreenProfile,
    pub webgl: WebGlProfile,
    pub canvas: CanvasProfile,
    pub audio: AudioProfile,
    pub fonts: FontProfile,
    pub network: NetworkProfile,
    pub timezone: TimezoneProfile,
    pub misc: MiscProfile,
    /// Seed shared by the canvas and audio noise injectors.
    pub noise_seed: NoiseSeed,
}

impl Fingerprint {
    /// The fixed fingerprint used when no randomness is available.
    ///
    /// Windows / Edge 131, 1920x1080 at 24 bit, NVIDIA RTX 3060, 8 cores, 8 GB,
    /// America/New_York, WebRTC disabled.
    pub fn fallback() -> Self {
        let chrome = catalog::BROWSER_VERSIONS[0];
        let user_agent = catalog::user_agent(TargetOs::Windows, BrowserFamily::Edge, chrome);
        let tz = &catalog::TIMEZONES[0];
        let gpu = catalog::FALLBACK_GPU;

        Self {
            version: FINGERPRINT_VERSION,
            navigator: NavigatorProfile {
                app_version: app_version_of(&user_agent),
                user_agent,
                platform: TargetOs::Windows.platform().to_string(),
                vendor: BrowserFamily::Edge.vendor().to_string(),
                language: tz.locale.to_string(),
                languages: catalog::languages_for_locale(tz.locale),
                hardware_concurrency: 8,
                device_memory: 8,
                max_touch_points: 0,
                product_sub: catalog::PRODUCT_SUB.to_string(),
                do_not_track: None,
                cookie_enabled: true,
                webdriver: false,
            },
            screen: ScreenProfile::new(1920, 1080, 24, 1.0),
            webgl: WebGlProfile {
                vendor: gpu.vendor.to_string(),
                renderer: gpu.renderer.to_string(),
            },
            canvas: CanvasProfile { noise: 5e-5 },
            audio: AudioProfile { noise: 5e-5 },
            fonts: FontProfile {
                installed: catalog::fonts_for(TargetOs::Windows)
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
            },
            network: NetworkProfile {
                webrtc_policy: WebRtcPolicy::Disable,
                connection_type: "ethernet".to_string(),
                effective_type: "4g".to_string(),
                downlink: 10.0,
                rtt: 50,
            },
            timezone: TimezoneProfile {
                zone: tz.zone.to_string(),
                offset_minutes: tz.offset_minutes,
                locale: tz.locale.to_string(),
            },
            misc: catalog::misc_profile(),
            noise_seed: NoiseSeed::new(0x6a09_e667_f3bc_c908_bb67_ae85_84ca_a73b),
        }
    }

    /// Lists every violated invariant. Empty means the fingerprint is consistent.
    pub fn violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let nav = &self.navigator;
        let screen = &self.screen;

        if nav.webdriver {
            problems.push("navigator.webdriver must be false".to_string());
        }
        if nav.user_agent.is_empty() {
            problems.push("user agent cannot be empty".to_string());
        }
        if nav.app_version != app_version_of(&nav.user_agent) {
            problems.push("appVersion is not derived from userAgent".to_string());
        }
        if nav.languages.first() != Some(&nav.language) {
            problems.push("languages must start with the primary language".to_string());
        }
        if screen.avail_width > screen.width {
            problems.push(format!(
                "availWidth {} exceeds width {}",
                screen.avail_width, screen.width
            ));
        }
        if screen.avail_height != screen.height.saturating_sub(CHROME_UI_HEIGHT) {
            problems.push(format!(
                "availHeight {} does not match height {} minus {}",
                screen.avail_height, screen.height, CHROME_UI_HEIGHT
            ));
        }
        if screen.color_depth != screen.pixel_depth {
            problems.push("colorDepth and pixelDepth differ".to_string());
        }
        if !matches!(screen.color_depth, 24 | 32) {
            problems.push(format!("unsupported colorDepth {}", screen.color_depth));
        }
        if !PIXEL_RATIOS.contains(&screen.pixel_ratio) {
            problems.push(format!("unsupported pixelRatio {}", screen.pixel_ratio));
        }
        if !catalog::is_known_gpu(&self.webgl.vendor, &self.webgl.renderer) {
            problems.push(format!(
                "unknown WebGL vendor/renderer pair: {} / {}",
                self.webgl.vendor, self.webgl.renderer
            ));
        }
        if !catalog::is_valid_timezone(&self.timezone.zone, self.timezone.offset_minutes) {
            problems.push(format!(
                "timezone {} cannot have offset {}",
                self.timezone.zone, self.timezone.offset_minutes
            ));
        }
        for (name, noise) in [("canvas", self.canvas.noise), ("audio", self.audio.noise)] {
            if !(noise > 0.0 && noise <= MAX_NOISE_AMPLITUDE) {
                problems.push(format!("{} noise {} out of range", name, noise));
            }
        }

        problems
    }

    /// Checks every invariant listed in the module documentation.
    pub fn validate(&self) -> Result<(), FingerprintError> {
        let problems = self.violations();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(FingerprintError::Invalid(problems))
        }
    }
}

/// Derives `navigator.appVersion` from a user agent by stripping the leading
/// product token (`Mozilla/`).
pub fn app_version_of(user_agent: &str) -> String {
    match user_agent.split_once('/') {
        Some((_, rest)) => rest.to_string(),
        None => user_agent.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_valid() {
        let fp = Fingerprint::fallback();
        assert!(fp.validate().is_ok(), "{:?}", fp.violations());
        assert!(!fp.navigator.webdriver);
    }

    #[test]
    fn test_app_version_strips_product_token() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
        assert_eq!(
            app_version_of(ua),
            "5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
        );
        assert_eq!(app_version_of("no-slash"), "no-slash");
    }

    #[test]
    fn test_screen_derivation() {
        let screen = ScreenProfile::new(1920, 1080, 32, 1.5);
        assert_eq!(screen.avail_width, 1920);
        assert_eq!(screen.avail_height, 1040);
        assert_eq!(screen.pixel_depth, 32);
    }

    #[test]
    fn test_noise_seed_hex() {
        let seed = NoiseSeed::new(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        assert_eq!(seed.to_hex(), "0123456789abcdef0011223344556677");
        assert_eq!(NoiseSeed::from_hex(&seed.to_hex()).unwrap(), seed);
        assert_eq!(seed.words(), [0x0123_4567, 0x89ab_cdef, 0x0011_2233, 0x4455_6677]);
    }

    #[test]
    fn test_violations_reported() {
        let mut fp = Fingerprint::fallback();
        fp.navigator.webdriver = true;
        fp.screen.pixel_depth = 32;
        fp.timezone.offset_minutes = -300;

        let problems = fp.violations();
        assert_eq!(problems.len(), 3, "{:?}", problems);
        assert!(matches!(fp.validate(), Err(FingerprintError::Invalid(_))));
    }

    #[test]
    fn test_json_field_names() {
        let fp = Fingerprint::fallback();
        let json = serde_json::to_value(&fp).unwrap();

        assert_eq!(json["navigator"]["hardwareConcurrency"], 8);
        assert_eq!(json["screen"]["availHeight"], 1040);
        assert_eq!(json["network"]["webRTCPolicy"], "disable");
        assert_eq!(json["noiseSeed"].as_str().unwrap().len(), 32);

        let back: Fingerprint = serde_json::from_value(json).unwrap();
        assert_eq!(back, fp);
    }
}
