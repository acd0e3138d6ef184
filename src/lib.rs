//! # profile-mask
//!
//! Per-profile browser identities: a fingerprint generator, a synthesizer that
//! compiles a fingerprint into an injectable override program, and an instance
//! manager that launches one browser per profile with that program installed before
//! any page script runs.
//!
//! ## Features
//!
//! - **Fingerprint Generation**: internally consistent identities (user agent,
//!   platform, GPU, screen, timezone, fonts) from an explicit random source
//! - **Override Programs**: deterministic JavaScript built from a directive list,
//!   with seeded canvas, audio and text-metrics noise
//! - **Instance Lifecycle**: at most one browser per profile, atomic launch
//!   rollback, graceful close, crash detection
//! - **Pluggable Backends**: any automation layer implementing
//!   [`browser::BrowserAutomation`]; a CDP backend ships behind `chromium-browser`
//! - **Flexible Configuration**: TOML/JSON files and environment variables
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use profile_mask::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = LauncherSettings::from_env();
//!
//!     let store = Arc::new(MemoryProfileStore::new());
//!     let id = store.insert(Profile::new("Work", &settings.data_root));
//!
//!     let manager = InstanceManager::builder(Arc::new(MockAutomation::new()), store)
//!         .settings(settings)
//!         .build()?;
//!
//!     manager.launch(&id).await?;
//!     manager.navigate_to(&id, "https://example.com").await?;
//!     manager.close(&id).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`fingerprint`]: fingerprint model, catalogs and generator
//! - [`stealth`]: directive compiler, renderer and noise mirror
//! - [`browser`]: automation traits, mock and CDP backends, executable discovery
//! - [`profile`]: profiles and the profile store boundary
//! - [`proxy`]: proxy resolution boundary
//! - [`instance`]: the instance manager
//! - [`config`]: launcher settings
//! - [`telemetry`]: tracing subscriber setup
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      InstanceManager                         │
//! │   claim ─► profile ─► fingerprint ─► synthesize ─► launch    │
//! ├──────────────┬───────────────┬───────────────┬───────────────┤
//! │ ProfileStore │ ProxyResolver │  Generator    │  Automation   │
//! │  (profile)   │   (proxy)     │ (fingerprint) │  (browser)    │
//! └──────────────┴───────────────┴───────┬───────┴───────────────┘
//!                                        │
//!                                 ┌──────┴──────┐
//!                                 │   stealth   │
//!                                 └─────────────┘
//! ```
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`PROFILE_MASK_*`)
//!
//! See [`config::LauncherSettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Fingerprint model, generation catalogs and the generator.
pub mod fingerprint;

/// Override program synthesis: directives, rendering and seeded noise.
pub mod stealth;

/// Browser automation traits, backends and executable discovery.
pub mod browser;

/// Profiles and the profile store boundary.
pub mod profile;

/// Proxy resolution boundary.
pub mod proxy;

/// Per-profile browser instance lifecycle.
pub mod instance;

/// Configuration management for loading settings from files and env.
pub mod config;

/// Tracing subscriber setup.
pub mod telemetry;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Fingerprint types
pub use fingerprint::{
    BrowserFamily, Fingerprint, FingerprintError, FingerprintGenerator, GenerateOptions,
    NoiseSeed, TargetOs, WebRtcPolicy,
};

// Stealth types
pub use stealth::{compile, synthesize, Directive, JsValue, NoiseRng, OverrideProgram, Target};

// Browser types
pub use browser::{
    find_browser_executable, BrowserAutomation, BrowserSession, ExecutableNotFound, LaunchOptions,
    MockAutomation, MockSession,
};

// Chromiumoxide types (when feature enabled)
#[cfg(feature = "chromium-browser")]
pub use browser::{ChromiumAutomation, ChromiumSession};

// Profile and proxy types
pub use profile::{MemoryProfileStore, Profile, ProfileStore, StoreError};
pub use proxy::{ProxyError, ProxyResolver, StaticProxyResolver};

// Instance types
pub use instance::{
    CloseAllReport, InstanceError, InstanceInfo, InstanceManager, InstanceManagerBuilder,
    LaunchStage,
};

// Config types
pub use config::{ConfigError, LauncherSettings, ProxyConfig, ProxyType};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use profile_mask::prelude::*;
/// ```
pub mod prelude {
    pub use crate::browser::{BrowserAutomation, BrowserSession, LaunchOptions, MockAutomation};
    pub use crate::config::LauncherSettings;
    pub use crate::fingerprint::{Fingerprint, FingerprintGenerator, GenerateOptions};
    pub use crate::instance::{InstanceError, InstanceManager};
    pub use crate::profile::{MemoryProfileStore, Profile, ProfileStore};
    pub use crate::stealth::{synthesize, OverrideProgram};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let program = synthesize(&Fingerprint::fallback());
        assert!(!program.is_empty());
        let _ = VERSION;
    }
}
