//! Browser module providing the automation boundary.
//!
//! This module contains the abstractions the instance manager drives: launching a
//! browser process, registering pre-navigation scripts, navigating and shutting
//! down, plus discovery of the browser binary.
//!
//! # Submodules
//!
//! - [`engine`] - Automation traits, launch options and the mock backend
//! - [`executable`] - Browser executable discovery
//! - [`chromium_engine`] - CDP backend (requires `chromium-browser` feature)

pub mod engine;
pub mod executable;

/// Chromiumoxide backend (requires `chromium-browser` feature).
#[cfg(feature = "chromium-browser")]
pub mod chromium_engine;

// Re-export commonly used types for convenience
pub use engine::{
    BrowserAutomation, BrowserSession, FailurePoint, LaunchOptions, MockAutomation, MockSession,
    SessionEvent, STEALTH_FLAGS, WEBRTC_DISABLE_FLAGS,
};
pub use executable::{find_browser_executable, ExecutableNotFound};

#[cfg(feature = "chromium-browser")]
pub use chromium_engine::{ChromiumAutomation, ChromiumSession};
