//! Configuration module for profile-mask.
//!
//! This module provides configuration management for the instance manager, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides
//! - Validation and defaults
//! - Proxy definitions
//!
//! # Example
//!
//! ```rust,no_run
//! use profile_mask::config::LauncherSettings;
//!
//! // Start from defaults
//! let settings = LauncherSettings::default();
//!
//! // Load from a specific file
//! let settings = LauncherSettings::from_file("launcher.toml").unwrap();
//!
//! // Override with environment variables
//! let settings = settings.merge_with_env();
//! ```

mod settings;

pub use settings::{ConfigError, LauncherSettings, ProxyConfig, ProxyType};
