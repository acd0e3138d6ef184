//! Chromiumoxide-based automation backend.
//!
//! This module provides a real [`BrowserAutomation`] implementation using
//! chromiumoxide, which controls Chrome/Chromium/Edge via the Chrome DevTools
//! Protocol (CDP).

use crate::browser::engine::{BrowserAutomation, BrowserSession, LaunchOptions};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetTimezoneOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::target::{EventTargetCreated, TargetId};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Attempts to look up a freshly created target before giving up on it.
const PAGE_LOOKUP_ATTEMPTS: u32 = 10;
const PAGE_LOOKUP_INTERVAL: Duration = Duration::from_millis(50);

/// Launches browsers through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumAutomation;

impl ChromiumAutomation {
    pub fn new() -> Self {
        Self
    }

    fn chrome_config(options: &LaunchOptions) -> Result<ChromeConfig> {
        // Default args carry --enable-automation, which re-exposes webdriver.
        let mut builder = ChromeConfig::builder()
            .disable_default_args()
            .chrome_executable(&options.executable)
            .user_data_dir(&options.user_data_dir)
            .viewport(Option::<Viewport>::None)
            .args(options.command_line_flags());

        if !options.headless {
            builder = builder.with_head();
        }

        builder.build().map_err(|e| anyhow!(e))
    }

    async fn start(&self, options: &LaunchOptions) -> Result<ChromiumSession> {
        info!(
            executable = %options.executable.display(),
            user_data_dir = %options.user_data_dir.display(),
            "Launching browser"
        );

        let config = Self::chrome_config(options)?;
        let (browser, mut handler) = Browser::launch(config).await?;

        let (exit_tx, exit_rx) = watch::channel(false);

        // The handler stream ends when the DevTools connection drops, i.e. when
        // the process is gone.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler error");
                }
            }
            warn!("Browser handler stream ended");
            exit_tx.send_replace(true);
        });

        let setup = Arc::new(PageSetup {
            script: RwLock::new(None),
            timezone: options.timezone.clone(),
        });

        let prepared = async {
            let created = browser.event_listener::<EventTargetCreated>().await?;
            let page = browser.new_page("about:blank").await?;
            setup.apply(&page).await?;
            Ok::<_, anyhow::Error>((created, page))
        }
        .await;

        let (created, page) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.kill().await;
                handler_task.abort();
                return Err(e);
            }
        };

        let browser = Arc::new(Mutex::new(browser));
        let target_task = tokio::spawn(watch_new_targets(
            created,
            Arc::clone(&browser),
            Arc::clone(&setup),
        ));

        info!("Browser launched successfully");

        Ok(ChromiumSession {
            browser,
            page,
            setup,
            exit_rx,
            handler_task,
            target_task,
        })
    }
}

#[async_trait]
impl BrowserAutomation for ChromiumAutomation {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(self.start(options).await?))
    }
}

/// What every page target of a session receives before its first document.
struct PageSetup {
    script: RwLock<Option<String>>,
    timezone: Option<String>,
}

impl PageSetup {
    async fn apply(&self, page: &Page) -> Result<()> {
        if let Some(zone) = &self.timezone {
            page.execute(SetTimezoneOverrideParams::new(zone.clone()))
                .await?;
        }
        let script = self.script.read().clone();
        if let Some(source) = script {
            page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(source))
                .await?;
        }
        Ok(())
    }
}

/// Applies the page setup to every page target created after launch
/// (`window.open`, new tabs, the browser's own startup tab).
async fn watch_new_targets(
    mut created: chromiumoxide::listeners::EventStream<EventTargetCreated>,
    browser: Arc<Mutex<Browser>>,
    setup: Arc<PageSetup>,
) {
    while let Some(event) = created.next().await {
        if event.target_info.r#type != "page" {
            continue;
        }
        let target_id = event.target_info.target_id.clone();
        match lookup_page(&browser, target_id).await {
            Some(page) => {
                if let Err(e) = setup.apply(&page).await {
                    warn!(error = %e, "Failed to prepare new page target");
                }
            }
            None => warn!("New page target could not be attached"),
        }
    }
}

async fn lookup_page(browser: &Mutex<Browser>, target_id: TargetId) -> Option<Page> {
    for _ in 0..PAGE_LOOKUP_ATTEMPTS {
        if let Ok(page) = browser.lock().await.get_page(target_id.clone()).await {
            return Some(page);
        }
        tokio::time::sleep(PAGE_LOOKUP_INTERVAL).await;
    }
    None
}

/// One CDP-controlled browser process with its initial page.
pub struct ChromiumSession {
    browser: Arc<Mutex<Browser>>,
    page: Page,
    setup: Arc<PageSetup>,
    exit_rx: watch::Receiver<bool>,
    handler_task: JoinHandle<()>,
    target_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    /// Registers the source on the initial page and on every other open page.
    ///
    /// Pages created afterwards get it from the target watcher. A page may end
    /// up registered twice; the program's guard makes the second run a no-op.
    async fn add_script_on_new_document(&self, source: &str) -> Result<()> {
        *self.setup.script.write() = Some(source.to_string());

        self.setup.apply(&self.page).await?;

        let pages = self.browser.lock().await.pages().await?;
        for page in pages
            .iter()
            .filter(|page| page.target_id() != self.page.target_id())
        {
            if let Err(e) = self.setup.apply(page).await {
                warn!(error = %e, "Failed to register program on open page");
            }
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn close_context(&self) -> Result<()> {
        self.page.clone().close().await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.target_task.abort();
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Graceful browser close failed, killing process");
            if let Some(Err(e)) = browser.kill().await {
                return Err(e.into());
            }
        }
        let _ = browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }

    async fn wait_exit(&self) -> Result<()> {
        let mut rx = self.exit_rx.clone();
        let _ = rx.wait_for(|exited| *exited).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a Chrome/Chromium installation
    // They are ignored by default and can be run with:
    // cargo test --features chromium-browser -- --ignored

    #[test]
    fn test_config_builds() {
        let executable = std::env::current_exe().unwrap();
        let options = LaunchOptions::new(executable, std::env::temp_dir());
        assert!(ChromiumAutomation::chrome_config(&options).is_ok());
    }

    #[tokio::test]
    #[ignore]
    async fn test_chromium_launch_and_shutdown() {
        let executable = crate::browser::find_browser_executable(None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = LaunchOptions::new(executable, dir.path())
            .headless(true)
            .timezone("Europe/Berlin");

        let session = ChromiumAutomation::new().launch(&options).await.unwrap();
        session
            .add_script_on_new_document("window.__probe = 1;")
            .await
            .unwrap();
        session.navigate("about:blank").await.unwrap();
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_program_reaches_new_targets() {
        let executable = crate::browser::find_browser_executable(None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let options = LaunchOptions::new(executable, dir.path())
            .headless(true)
            .timezone("Asia/Tokyo");

        let session = ChromiumAutomation::new().start(&options).await.unwrap();
        session
            .add_script_on_new_document("window.__registered = 7;")
            .await
            .unwrap();

        let page = session
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        page.goto("about:blank").await.unwrap();

        let marker: i64 = page
            .evaluate("window.__registered")
            .await
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(marker, 7);

        let offset: i64 = page
            .evaluate("new Date(0).getTimezoneOffset()")
            .await
            .unwrap()
            .into_value()
            .unwrap();
        assert_eq!(offset, -540);

        session.shutdown().await.unwrap();
    }
}
