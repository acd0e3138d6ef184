//! Fingerprint Generator
//!
//! Draws correlated values from the catalogs to build a [`Fingerprint`]. The random
//! source is an explicit type parameter so tests and callers that need reproducible
//! identities can pass a seeded RNG.

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use super::catalog::{self, ScreenEntry};
use super::{
    app_version_of, AudioProfile, CanvasProfile, Fingerprint, FontProfile, NavigatorProfile,
    NetworkProfile, NoiseSeed, ScreenProfile, TimezoneProfile, WebGlProfile, WebRtcPolicy,
    FINGERPRINT_VERSION, MAX_NOISE_AMPLITUDE, PIXEL_RATIOS,
};

const CORE_COUNTS: [u32; 5] = [4, 6, 8, 12, 16];
const MEMORY_SIZES: [u32; 4] = [4, 8, 16, 32];

/// Probability that a catalog font is reported as installed.
const FONT_KEEP_PROBABILITY: f64 = 0.9;

/// Probability of a 24-bit screen (32-bit otherwise).
const COLOR_DEPTH_24_PROBABILITY: f64 = 0.85;

/// Error returned when parsing an OS or browser family name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
}

/// Operating system a fingerprint pretends to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    #[default]
    Windows,
    #[serde(alias = "mac")]
    MacOs,
    Linux,
}

impl TargetOs {
    /// `navigator.platform` for this OS
    pub fn platform(&self) -> &'static str {
        match self {
            TargetOs::Windows => "Win32",
            TargetOs::MacOs => "MacIntel",
            TargetOs::Linux => "Linux x86_64",
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetOs::Windows => "windows",
            TargetOs::MacOs => "macos",
            TargetOs::Linux => "linux",
        })
    }
}

impl FromStr for TargetOs {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "windows" | "win" => Ok(TargetOs::Windows),
            "mac" | "macos" | "osx" => Ok(TargetOs::MacOs),
            "linux" => Ok(TargetOs::Linux),
            _ => Err(ParseOptionError {
                kind: "operating system",
                value: s.to_string(),
            }),
        }
    }
}

/// Chromium-based browser family a fingerprint identifies as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFamily {
    Chrome,
    #[default]
    Edge,
}

impl BrowserFamily {
    /// `navigator.vendor` for this family
    pub fn vendor(&self) -> &'static str {
        // Edge reports Google's vendor string too
        "Google Inc."
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BrowserFamily::Chrome => "chrome",
            BrowserFamily::Edge => "edge",
        })
    }
}

impl FromStr for BrowserFamily {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserFamily::Chrome),
            "edge" | "msedge" => Ok(BrowserFamily::Edge),
            _ => Err(ParseOptionError {
                kind: "browser family",
                value: s.to_string(),
            }),
        }
    }
}

/// Optional constraints for [`FingerprintGenerator::generate`].
///
/// Unset fields default to Windows / Edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub os: Option<TargetOs>,
    pub browser: Option<BrowserFamily>,
}

impl GenerateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_os(mut self, os: TargetOs) -> Self {
        self.os = Some(os);
        self
    }

    pub fn with_browser(mut self, browser: BrowserFamily) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Parses loosely formatted names such as `("mac", "chrome")`. Empty strings
    /// leave the field unset.
    pub fn parse(os: &str, browser: &str) -> Result<Self, ParseOptionError> {
        let mut options = Self::default();
        if !os.trim().is_empty() {
            options.os = Some(os.parse()?);
        }
        if !browser.trim().is_empty() {
            options.browser = Some(browser.parse()?);
        }
        Ok(options)
    }

    pub fn os(&self) -> TargetOs {
        self.os.unwrap_or_default()
    }

    pub fn browser(&self) -> BrowserFamily {
        self.browser.unwrap_or_default()
    }
}

/// Generates realistic, internally consistent browser fingerprints.
pub struct FingerprintGenerator<R: RngCore = StdRng> {
    rng: R,
    /// Set when OS entropy was unavailable; every generation then yields the fallback.
    degraded: bool,
}

impl FingerprintGenerator<StdRng> {
    /// Generator seeded from the operating system's entropy source.
    pub fn new() -> Self {
        match StdRng::from_rng(OsRng) {
            Ok(rng) => Self {
                rng,
                degraded: false,
            },
            Err(e) => {
                warn!(error = %e, "OS entropy unavailable, fingerprints fall back to a fixed identity");
                Self {
                    rng: StdRng::seed_from_u64(0),
                    degraded: true,
                }
            }
        }
    }

    /// Reproducible generator: the same seed yields the same sequence of fingerprints.
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Reproducible generator keyed by an arbitrary string (e.g. a profile name).
    pub fn from_seed_str(seed: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(seed.as_bytes()).into();
        Self::with_rng(StdRng::from_seed(digest))
    }
}

impl Default for FingerprintGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RngCore> FingerprintGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            degraded: false,
        }
    }

    /// Generates a fingerprint. Never fails: if the random source errors the
    /// documented [`Fingerprint::fallback`] is returned instead.
    pub fn generate(&mut self, options: &GenerateOptions) -> Fingerprint {
        if self.degraded {
            warn!("Random source unavailable, using fallback fingerprint");
            return Fingerprint::fallback();
        }

        // The seed is drawn first so that a failing source is detected before any
        // other value is taken from it.
        let mut seed_bytes = [0u8; 16];
        if let Err(e) = self.rng.try_fill_bytes(&mut seed_bytes) {
            warn!(error = %e, "Random source failed, using fallback fingerprint");
            return Fingerprint::fallback();
        }
        let noise_seed = NoiseSeed::from_bytes(seed_bytes);

        let os = options.os();
        let browser = options.browser();

        let screen = self.screen();
        let webgl = self.webgl(os);
        let timezone = self.timezone();
        let navigator = self.navigator(os, browser, &timezone.locale);
        let fonts = self.fonts(os);
        let network = self.network();
        let canvas = CanvasProfile {
            noise: self.amplitude(),
        };
        let audio = AudioProfile {
            noise: self.amplitude(),
        };

        debug!(
            os = %os,
            browser = %browser,
            width = screen.width,
            height = screen.height,
            timezone = %timezone.zone,
            "Generated fingerprint"
        );

        Fingerprint {
            version: FINGERPRINT_VERSION,
            navigator,
            screen,
            webgl,
            canvas,
            audio,
            fonts,
            network,
            timezone,
            misc: catalog::misc_profile(),
            noise_seed,
        }
    }

    /// Human-friendly profile name such as "SwiftFox042".
    pub fn random_name(&mut self) -> String {
        const ADJECTIVES: [&str; 8] = [
            "Swift", "Shadow", "Ghost", "Stealth", "Cyber", "Neo", "Phantom", "Silent",
        ];
        const NOUNS: [&str; 8] = [
            "Fox", "Wolf", "Eagle", "Dragon", "Phoenix", "Ninja", "Hawk", "Tiger",
        ];

        format!(
            "{}{}{:03}",
            self.pick(&ADJECTIVES),
            self.pick(&NOUNS),
            self.rng.gen_range(0..1000)
        )
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.rng.gen_range(0..items.len())]
    }

    fn weighted_screen(&mut self) -> ScreenEntry {
        let total: u32 = catalog::SCREENS.iter().map(|s| s.weight).sum();
        let mut roll = self.rng.gen_range(0..total);
        for entry in catalog::SCREENS {
            if roll < entry.weight {
                return *entry;
            }
            roll -= entry.weight;
        }
        catalog::SCREENS[0]
    }

    fn screen(&mut self) -> ScreenProfile {
        let entry = self.weighted_screen();
        let color_depth = if self.rng.gen_bool(COLOR_DEPTH_24_PROBABILITY) {
            24
        } else {
            32
        };
        let pixel_ratio = self.pick(&PIXEL_RATIOS);
        ScreenProfile::new(entry.width, entry.height, color_depth, pixel_ratio)
    }

    fn webgl(&mut self, os: TargetOs) -> WebGlProfile {
        let gpu = self.pick(catalog::gpus_for(os));
        WebGlProfile {
            vendor: gpu.vendor.to_string(),
            renderer: gpu.renderer.to_string(),
        }
    }

    fn timezone(&mut self) -> TimezoneProfile {
        let entry = self.pick(catalog::TIMEZONES);
        TimezoneProfile {
            zone: entry.zone.to_string(),
            offset_minutes: entry.offset_minutes,
            locale: entry.locale.to_string(),
        }
    }

    fn navigator(&mut self, os: TargetOs, browser: BrowserFamily, locale: &str) -> NavigatorProfile {
        let version = self.pick(catalog::BROWSER_VERSIONS);
        let user_agent = catalog::user_agent(os, browser, version);
        let languages = catalog::languages_for_locale(locale);
        let do_not_track = self.pick(&[Some("1"), Some("unspecified"), None]);

        NavigatorProfile {
            app_version: app_version_of(&user_agent),
            user_agent,
            platform: os.platform().to_string(),
            vendor: browser.vendor().to_string(),
            language: languages[0].clone(),
            languages,
            hardware_concurrency: self.pick(&CORE_COUNTS),
            device_memory: self.pick(&MEMORY_SIZES),
            max_touch_points: 0,
            product_sub: catalog::PRODUCT_SUB.to_string(),
            do_not_track: do_not_track.map(str::to_string),
            cookie_enabled: true,
            webdriver: false,
        }
    }

    fn fonts(&mut self, os: TargetOs) -> FontProfile {
        let all = catalog::fonts_for(os);
        let mut installed: Vec<String> = all
            .iter()
            .filter(|_| self.rng.gen_bool(FONT_KEEP_PROBABILITY))
            .map(|f| f.to_string())
            .collect();
        if installed.is_empty() {
            installed.push(all[0].to_string());
        }
        FontProfile { installed }
    }

    fn network(&mut self) -> NetworkProfile {
        let raw_rtt: u32 = self.rng.gen_range(20..120);
        NetworkProfile {
            webrtc_policy: WebRtcPolicy::Disable,
            connection_type: self.pick(&["wifi", "ethernet"]).to_string(),
            effective_type: "4g".to_string(),
            downlink: f64::from(self.rng.gen_range(10u32..110)),
            // Chromium reports rtt rounded to 25ms
            rtt: ((raw_rtt + 12) / 25).max(1) * 25,
        }
    }

    /// Amplitude in (0, MAX_NOISE_AMPLITUDE].
    fn amplitude(&mut self) -> f64 {
        (1.0 - self.rng.gen::<f64>()) * MAX_NOISE_AMPLITUDE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Error as RandError;

    /// RNG whose byte source always fails.
    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), RandError> {
            Err(RandError::new("entropy source offline"))
        }
    }

    #[test]
    fn test_generate_defaults_to_windows_edge() {
        let mut generator = FingerprintGenerator::from_seed(7);
        let fp = generator.generate(&GenerateOptions::default());

        assert_eq!(fp.navigator.platform, "Win32");
        assert!(fp.navigator.user_agent.contains("Edg/"));
        assert!(fp.validate().is_ok(), "{:?}", fp.violations());
    }

    #[test]
    fn test_generate_respects_constraints() {
        let mut generator = FingerprintGenerator::from_seed(11);
        let options = GenerateOptions::new()
            .with_os(TargetOs::Linux)
            .with_browser(BrowserFamily::Chrome);

        for _ in 0..20 {
            let fp = generator.generate(&options);
            assert_eq!(fp.navigator.platform, "Linux x86_64");
            assert!(fp.navigator.user_agent.contains("X11; Linux x86_64"));
            assert!(!fp.navigator.user_agent.contains("Edg/"));
            assert!(catalog::LINUX_GPUS
                .iter()
                .any(|g| g.renderer == fp.webgl.renderer));
        }
    }

    #[test]
    fn test_same_seed_same_fingerprint() {
        let a = FingerprintGenerator::from_seed_str("profile-a").generate(&GenerateOptions::default());
        let b = FingerprintGenerator::from_seed_str("profile-a").generate(&GenerateOptions::default());
        let c = FingerprintGenerator::from_seed_str("profile-b").generate(&GenerateOptions::default());

        assert_eq!(a, b);
        assert_ne!(a.noise_seed, c.noise_seed);
    }

    #[test]
    fn test_failing_source_returns_fallback() {
        let mut generator = FingerprintGenerator::with_rng(BrokenRng);
        let fp = generator.generate(&GenerateOptions::default());
        assert_eq!(fp, Fingerprint::fallback());
    }

    #[test]
    fn test_rtt_is_multiple_of_25() {
        let mut generator = FingerprintGenerator::from_seed(3);
        for _ in 0..50 {
            let fp = generator.generate(&GenerateOptions::default());
            assert_eq!(fp.network.rtt % 25, 0);
            assert!(fp.network.rtt >= 25);
            assert!(!fp.fonts.installed.is_empty());
        }
    }

    #[test]
    fn test_parse_options() {
        let options = GenerateOptions::parse("mac", "chrome").unwrap();
        assert_eq!(options.os(), TargetOs::MacOs);
        assert_eq!(options.browser(), BrowserFamily::Chrome);

        let empty = GenerateOptions::parse("", "").unwrap();
        assert_eq!(empty, GenerateOptions::default());

        assert!(GenerateOptions::parse("beos", "").is_err());
    }

    #[test]
    fn test_random_name_shape() {
        let mut generator = FingerprintGenerator::from_seed(1);
        let name = generator.random_name();
        assert!(name.len() >= 8);
        assert!(name[name.len() - 3..].chars().all(|c| c.is_ascii_digit()));
    }
}
