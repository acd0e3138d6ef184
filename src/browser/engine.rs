//! Browser automation abstraction layer.
//!
//! This module provides the trait-based boundary between the instance manager and
//! whatever actually drives a browser process. A backend implements
//! [`BrowserAutomation`] (launching) and [`BrowserSession`] (one live process with
//! its browsing context). [`MockAutomation`] records every call and can be told to
//! fail at a chosen step, making it suitable for unit tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use profile_mask::browser::{BrowserAutomation, LaunchOptions, MockAutomation};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let automation = MockAutomation::new();
//!     let options = LaunchOptions::new("/usr/bin/chromium", "/tmp/profile")
//!         .window_size(1920, 1080);
//!
//!     let session = automation.launch(&options).await?;
//!     session.add_script_on_new_document("console.log('hi')").await?;
//!     session.navigate("about:blank").await?;
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Flags that hide the most obvious automation tells.
pub const STEALTH_FLAGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Flags that keep WebRTC from leaking the real address around a proxy.
pub const WEBRTC_DISABLE_FLAGS: &[&str] = &[
    "--webrtc-ip-handling-policy=disable_non_proxied_udp",
    "--enforce-webrtc-ip-permission-check",
];

/// Options for launching one browser process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Path to the browser executable.
    pub executable: PathBuf,

    /// Profile data directory (cookies, storage, cache).
    pub user_data_dir: PathBuf,

    /// Run browser in headless mode (no visible window).
    pub headless: bool,

    /// Window dimensions as (width, height) in pixels.
    pub window_size: (u32, u32),

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    pub proxy_server: Option<String>,

    /// Add the WebRTC leak-prevention flags.
    pub disable_webrtc: bool,

    /// IANA zone the backend emulates for every page, if it can.
    pub timezone: Option<String>,

    /// Additional browser launch arguments.
    pub args: Vec<String>,
}

impl LaunchOptions {
    /// Creates options for a visible browser with a 1920x1080 window.
    pub fn new(executable: impl Into<PathBuf>, user_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            user_data_dir: user_data_dir.into(),
            headless: false,
            window_size: (1920, 1080),
            proxy_server: None,
            disable_webrtc: true,
            timezone: None,
            args: Vec::new(),
        }
    }

    /// Sets headless mode.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Sets window size.
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    /// Sets proxy server.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy_server = Some(proxy.into());
        self
    }

    pub fn disable_webrtc(mut self, disable: bool) -> Self {
        self.disable_webrtc = disable;
        self
    }

    /// Sets the emulated timezone (e.g., "America/New_York").
    pub fn timezone(mut self, zone: impl Into<String>) -> Self {
        self.timezone = Some(zone.into());
        self
    }

    /// Adds a browser launch argument.
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Command-line flags for the process.
    ///
    /// The user-data directory and headless mode are not included; backends pass
    /// those through their own launcher configuration.
    pub fn command_line_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = STEALTH_FLAGS.iter().map(|f| f.to_string()).collect();

        if self.disable_webrtc {
            flags.extend(WEBRTC_DISABLE_FLAGS.iter().map(|f| f.to_string()));
        }

        flags.push(format!(
            "--window-size={},{}",
            self.window_size.0, self.window_size.1
        ));

        if let Some(proxy) = &self.proxy_server {
            flags.push(format!("--proxy-server={}", proxy));
        }

        flags.extend(self.args.iter().cloned());
        flags
    }
}

/// Launches browser processes.
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Starts a browser process and opens its initial browsing context.
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>>;
}

/// One live browser process and its browsing context.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Registers `source` to run before any author script in every new document.
    async fn add_script_on_new_document(&self, source: &str) -> Result<()>;

    /// Navigates the browsing context to `url`.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Closes the browsing context (tab/page).
    async fn close_context(&self) -> Result<()>;

    /// Terminates the browser process and releases its resources.
    async fn shutdown(&self) -> Result<()>;

    /// Resolves once the browser process has exited, for whatever reason.
    async fn wait_exit(&self) -> Result<()>;
}

/// Step at which [`MockAutomation`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Launch,
    RegisterScript,
    Navigate,
    CloseContext,
    Shutdown,
}

/// Call recorded by a [`MockSession`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ScriptRegistered(String),
    Navigated(String),
    ContextClosed,
    Shutdown,
}

type Failures = Arc<Mutex<HashSet<FailurePoint>>>;
type Delay = Arc<Mutex<Duration>>;

#[derive(Default)]
struct MockState {
    failures: Failures,
    launch_delay: Mutex<Duration>,
    navigate_delay: Delay,
    launches: Mutex<Vec<LaunchOptions>>,
    sessions: Mutex<Vec<MockSession>>,
}

/// Mock automation backend for testing purposes.
///
/// This implementation simulates browser behavior without actually
/// launching a browser. Clones share state, so a test can keep a handle while the
/// manager owns another.
#[derive(Clone, Default)]
pub struct MockAutomation {
    state: Arc<MockState>,
}

impl MockAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that fails at `point` until [`clear_failures`](Self::clear_failures).
    pub fn with_failure(point: FailurePoint) -> Self {
        let mock = Self::new();
        mock.set_failure(point);
        mock
    }

    pub fn set_failure(&self, point: FailurePoint) {
        self.state.failures.lock().insert(point);
    }

    pub fn clear_failures(&self) {
        self.state.failures.lock().clear();
    }

    /// Makes every launch sleep before returning.
    pub fn set_launch_delay(&self, delay: Duration) {
        *self.state.launch_delay.lock() = delay;
    }

    /// Makes every navigation of every session sleep first.
    pub fn set_navigate_delay(&self, delay: Duration) {
        *self.state.navigate_delay.lock() = delay;
    }

    /// Number of successful launches.
    pub fn launched_count(&self) -> usize {
        self.state.sessions.lock().len()
    }

    /// Options of every launch attempt, including failed ones.
    pub fn launch_options(&self) -> Vec<LaunchOptions> {
        self.state.launches.lock().clone()
    }

    /// Every session ever launched.
    pub fn sessions(&self) -> Vec<MockSession> {
        self.state.sessions.lock().clone()
    }

    /// Sessions whose process is still alive.
    pub fn live_sessions(&self) -> usize {
        self.state
            .sessions
            .lock()
            .iter()
            .filter(|s| s.is_alive())
            .count()
    }
}

#[async_trait]
impl BrowserAutomation for MockAutomation {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        self.state.launches.lock().push(options.clone());

        let delay = *self.state.launch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.failures.lock().contains(&FailurePoint::Launch) {
            return Err(anyhow!("Simulated launch failure"));
        }

        let session = MockSession::new(
            options.clone(),
            self.state.failures.clone(),
            self.state.navigate_delay.clone(),
        );
        self.state.sessions.lock().push(session.clone());
        Ok(Box::new(session))
    }
}

struct SessionState {
    id: Uuid,
    options: LaunchOptions,
    failures: Failures,
    navigate_delay: Delay,
    events: Mutex<Vec<SessionEvent>>,
    exit_tx: watch::Sender<bool>,
}

/// Session handed out by [`MockAutomation`].
#[derive(Clone)]
pub struct MockSession {
    state: Arc<SessionState>,
}

impl MockSession {
    fn new(options: LaunchOptions, failures: Failures, navigate_delay: Delay) -> Self {
        let (exit_tx, _) = watch::channel(false);
        Self {
            state: Arc::new(SessionState {
                id: Uuid::new_v4(),
                options,
                failures,
                navigate_delay,
                events: Mutex::new(Vec::new()),
                exit_tx,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn options(&self) -> &LaunchOptions {
        &self.state.options
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.state.events.lock().clone()
    }

    /// Whether the simulated process is still running.
    pub fn is_alive(&self) -> bool {
        !*self.state.exit_tx.borrow()
    }

    /// Simulates the browser process dying on its own.
    pub fn simulate_crash(&self) {
        self.state.exit_tx.send_replace(true);
    }

    fn check(&self, point: FailurePoint) -> Result<()> {
        if !self.is_alive() {
            return Err(anyhow!("Browser process has exited"));
        }
        if self.state.failures.lock().contains(&point) {
            return Err(anyhow!("Simulated {:?} failure", point));
        }
        Ok(())
    }

    fn record(&self, event: SessionEvent) {
        self.state.events.lock().push(event);
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn add_script_on_new_document(&self, source: &str) -> Result<()> {
        self.check(FailurePoint::RegisterScript)?;
        self.record(SessionEvent::ScriptRegistered(source.to_string()));
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let delay = *self.state.navigate_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(FailurePoint::Navigate)?;
        self.record(SessionEvent::Navigated(url.to_string()));
        Ok(())
    }

    async fn close_context(&self) -> Result<()> {
        self.check(FailurePoint::CloseContext)?;
        self.record(SessionEvent::ContextClosed);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.state.failures.lock().contains(&FailurePoint::Shutdown) {
            return Err(anyhow!("Simulated Shutdown failure"));
        }
        self.record(SessionEvent::Shutdown);
        self.state.exit_tx.send_replace(true);
        Ok(())
    }

    async fn wait_exit(&self) -> Result<()> {
        let mut rx = self.state.exit_tx.subscribe();
        // The sender lives as long as the session, so this only errors on drop.
        let _ = rx.wait_for(|exited| *exited).await;
        Ok(())
    }
}
