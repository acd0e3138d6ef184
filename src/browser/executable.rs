//! Browser executable discovery.
//!
//! Edge is preferred (it is what generated fingerprints claim to be by default),
//! then Chrome, then Chromium.

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Executable names looked up on `PATH`, in order of preference.
static BROWSER_NAMES: &[&str] = &[
    "msedge",
    "microsoft-edge",
    "microsoft-edge-stable",
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Absolute install locations checked before `PATH`.
static FALLBACK_PATHS: &[&str] = &[
    "/opt/microsoft/msedge/msedge",
    "/usr/bin/microsoft-edge",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// No usable browser binary was found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no browser executable found (searched: {})", .searched.join(", "))]
pub struct ExecutableNotFound {
    /// Every location that was checked.
    pub searched: Vec<String>,
}

/// Windows install locations, built from the usual environment variables.
fn windows_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for var in ["ProgramFiles(x86)", "ProgramFiles", "LocalAppData"] {
        if let Ok(base) = env::var(var) {
            let base = PathBuf::from(base);
            paths.push(base.join("Microsoft").join("Edge").join("Application").join("msedge.exe"));
            paths.push(base.join("Google").join("Chrome").join("Application").join("chrome.exe"));
        }
    }
    paths
}

/// Resolves the browser binary to launch.
///
/// A configured path is authoritative: if it does not exist the search fails
/// rather than silently picking another browser.
pub fn find_browser_executable(configured: Option<&Path>) -> Result<PathBuf, ExecutableNotFound> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ExecutableNotFound {
            searched: vec![path.display().to_string()],
        });
    }

    let mut searched = Vec::new();

    let candidates = windows_paths()
        .into_iter()
        .chain(FALLBACK_PATHS.iter().map(PathBuf::from));
    for path in candidates {
        if path.is_file() {
            debug!(path = %path.display(), "Found browser executable");
            return Ok(path);
        }
        searched.push(path.display().to_string());
    }

    for name in BROWSER_NAMES {
        if let Ok(path) = which::which(name) {
            debug!(path = %path.display(), "Found browser executable on PATH");
            return Ok(path);
        }
        searched.push(format!("$PATH/{}", name));
    }

    Err(ExecutableNotFound { searched })
}
