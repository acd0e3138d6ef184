//! Integration tests for fingerprint generation
//!
//! Checks the consistency invariants over many generated fingerprints, seeded
//! reproducibility and the JSON shape stored with profiles.

use profile_mask::fingerprint::catalog;
use profile_mask::fingerprint::{
    app_version_of, BrowserFamily, Fingerprint, FingerprintGenerator, GenerateOptions, TargetOs,
    WebRtcPolicy, FINGERPRINT_VERSION,
};

fn all_options() -> Vec<GenerateOptions> {
    let mut options = Vec::new();
    for os in [TargetOs::Windows, TargetOs::MacOs, TargetOs::Linux] {
        for browser in [BrowserFamily::Chrome, BrowserFamily::Edge] {
            options.push(GenerateOptions::new().with_os(os).with_browser(browser));
        }
    }
    options
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_generated_fingerprints_are_consistent() {
    let mut generator = FingerprintGenerator::from_seed(2024);

    for options in all_options() {
        for _ in 0..50 {
            let fp = generator.generate(&options);

            assert!(fp.screen.avail_height <= fp.screen.height);
            assert!(fp.screen.avail_width <= fp.screen.width);
            assert_eq!(fp.screen.color_depth, fp.screen.pixel_depth);
            assert_eq!(fp.navigator.app_version, app_version_of(&fp.navigator.user_agent));
            assert!(catalog::is_valid_timezone(
                &fp.timezone.zone,
                fp.timezone.offset_minutes
            ));
            assert!(catalog::is_known_gpu(&fp.webgl.vendor, &fp.webgl.renderer));
            assert!(!fp.navigator.webdriver);
            assert!(fp.validate().is_ok(), "{:?}", fp.violations());
        }
    }
}

#[test]
fn test_platform_matches_target_os() {
    let mut generator = FingerprintGenerator::from_seed(5);

    let mac = generator.generate(&GenerateOptions::new().with_os(TargetOs::MacOs));
    assert_eq!(mac.navigator.platform, "MacIntel");
    assert!(mac.navigator.user_agent.contains("Macintosh"));

    let linux = generator.generate(&GenerateOptions::new().with_os(TargetOs::Linux));
    assert_eq!(linux.navigator.platform, "Linux x86_64");
    assert!(linux.navigator.user_agent.contains("Linux"));

    let windows = generator.generate(&GenerateOptions::new().with_os(TargetOs::Windows));
    assert_eq!(windows.navigator.platform, "Win32");
    assert!(windows.navigator.user_agent.contains("Windows NT 10.0"));
}

#[test]
fn test_edge_user_agent_has_edge_token() {
    let mut generator = FingerprintGenerator::from_seed(9);
    let edge = generator.generate(&GenerateOptions::new().with_browser(BrowserFamily::Edge));
    let chrome = generator.generate(&GenerateOptions::new().with_browser(BrowserFamily::Chrome));

    assert!(edge.navigator.user_agent.contains("Edg/"));
    assert!(!chrome.navigator.user_agent.contains("Edg/"));
    assert_eq!(edge.navigator.vendor, "Google Inc.");
}

#[test]
fn test_defaults_and_version() {
    let mut generator = FingerprintGenerator::from_seed(1);
    let fp = generator.generate(&GenerateOptions::default());

    assert_eq!(fp.version, FINGERPRINT_VERSION);
    assert_eq!(fp.network.webrtc_policy, WebRtcPolicy::Disable);
    assert!(!fp.fonts.installed.is_empty());
    assert!(!fp.misc.plugins.is_empty());
}

// ============================================================================
// Reproducibility
// ============================================================================

#[test]
fn test_same_seed_same_fingerprint() {
    let a = FingerprintGenerator::from_seed(77).generate(&GenerateOptions::default());
    let b = FingerprintGenerator::from_seed(77).generate(&GenerateOptions::default());
    assert_eq!(a, b);

    let c = FingerprintGenerator::from_seed_str("profile-1").generate(&GenerateOptions::default());
    let d = FingerprintGenerator::from_seed_str("profile-1").generate(&GenerateOptions::default());
    assert_eq!(c, d);
}

#[test]
fn test_different_seeds_differ() {
    let a = FingerprintGenerator::from_seed(1).generate(&GenerateOptions::default());
    let b = FingerprintGenerator::from_seed(2).generate(&GenerateOptions::default());
    assert_ne!(a.noise_seed, b.noise_seed);
}

#[test]
fn test_entropy_generator_produces_valid_fingerprints() {
    let mut generator = FingerprintGenerator::new();
    let fp = generator.generate(&GenerateOptions::default());
    assert!(fp.validate().is_ok());
}

// ============================================================================
// Fallback and serialization
// ============================================================================

#[test]
fn test_fallback_is_valid() {
    let fp = Fingerprint::fallback();
    assert!(fp.validate().is_ok());
    assert_eq!(fp.timezone.zone, "America/New_York");
    assert_eq!(fp.screen.width, 1920);
    assert_eq!(fp.screen.height, 1080);
    assert_eq!(fp, Fingerprint::fallback());
}

#[test]
fn test_json_roundtrip_keeps_seed() {
    let fp = FingerprintGenerator::from_seed(3).generate(&GenerateOptions::default());
    let json = serde_json::to_string(&fp).unwrap();

    assert!(json.contains("\"hardwareConcurrency\""));
    assert!(json.contains("\"webRTCPolicy\":\"disable\""));
    assert!(json.contains(&format!("\"noiseSeed\":\"{}\"", fp.noise_seed.to_hex())));

    let back: Fingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, fp);
}

#[test]
fn test_tampered_fingerprint_is_rejected() {
    let mut fp = Fingerprint::fallback();
    fp.navigator.webdriver = true;
    fp.screen.pixel_depth = 32;
    fp.timezone.offset_minutes = 123;

    let violations = fp.violations();
    assert_eq!(violations.len(), 3, "{:?}", violations);
    assert!(fp.validate().is_err());
}

#[test]
fn test_random_names_are_nonempty() {
    let mut generator = FingerprintGenerator::from_seed(11);
    for _ in 0..20 {
        assert!(!generator.random_name().trim().is_empty());
    }
}
