//! Instance Lifecycle Management
//!
//! The [`InstanceManager`] owns every running browser launched for a profile. A
//! profile key moves through `absent -> launching -> running -> closing -> absent`;
//! a failed launch tears down whatever it had started and leaves the key absent.
//!
//! At most one instance runs per profile. The check-and-reserve of a key is
//! atomic, and the slow parts of a launch (process spawn, protocol handshake,
//! script registration, first navigation) run without holding the registry lock so
//! unrelated profiles launch in parallel.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use profile_mask::browser::MockAutomation;
//! use profile_mask::instance::InstanceManager;
//! use profile_mask::profile::{MemoryProfileStore, Profile};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryProfileStore::new());
//! let id = store.insert(Profile::new("Work", "profiles"));
//!
//! let manager = InstanceManager::builder(Arc::new(MockAutomation::new()), store).build()?;
//! manager.launch(&id).await?;
//! assert!(manager.is_running(&id));
//!
//! manager.close(&id).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod registry;

pub use error::{InstanceError, LaunchStage};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::{find_browser_executable, BrowserAutomation, BrowserSession, LaunchOptions};
use crate::config::{ConfigError, LauncherSettings};
use crate::fingerprint::{Fingerprint, FingerprintGenerator, GenerateOptions, WebRtcPolicy};
use crate::profile::{Profile, ProfileStore};
use crate::proxy::{ProxyResolver, StaticProxyResolver};
use crate::stealth::{synthesize, OverrideProgram};
use registry::Registry;

/// One live browser bound to a profile.
struct Instance {
    profile_id: String,
    instance_id: Uuid,
    fingerprint: Arc<Fingerprint>,
    program: OverrideProgram,
    session: Arc<dyn BrowserSession>,
    cancel: CancellationToken,
    launched_at: DateTime<Utc>,
    /// Serializes navigation against close.
    ops: tokio::sync::Mutex<()>,
}

impl Instance {
    fn info(&self) -> InstanceInfo {
        InstanceInfo {
            profile_id: self.profile_id.clone(),
            instance_id: self.instance_id,
            launched_at: self.launched_at,
            program_key: self.program.key().to_string(),
            user_agent: self.fingerprint.navigator.user_agent.clone(),
        }
    }
}

/// Read-only snapshot of a running instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub profile_id: String,
    pub instance_id: Uuid,
    pub launched_at: DateTime<Utc>,
    /// Content hash of the registered override program.
    pub program_key: String,
    pub user_agent: String,
}

/// Outcome of [`InstanceManager::close_all`].
#[derive(Debug, Default)]
pub struct CloseAllReport {
    /// Profiles whose browser shut down cleanly.
    pub closed: Vec<String>,
    /// Profiles removed from the registry whose shutdown reported an error.
    pub failed: Vec<(String, InstanceError)>,
}

impl CloseAllReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.closed.len() + self.failed.len()
    }
}

/// Everything a launch needs before touching the browser.
struct PreparedLaunch {
    fingerprint: Arc<Fingerprint>,
    program: OverrideProgram,
    options: LaunchOptions,
}

/// Builder for [`InstanceManager`].
pub struct InstanceManagerBuilder {
    automation: Arc<dyn BrowserAutomation>,
    store: Arc<dyn ProfileStore>,
    proxies: Option<Arc<dyn ProxyResolver>>,
    settings: LauncherSettings,
    generator: Option<FingerprintGenerator>,
}

impl InstanceManagerBuilder {
    pub fn proxy_resolver(mut self, proxies: Arc<dyn ProxyResolver>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    pub fn settings(mut self, settings: LauncherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Generator used for profiles that have no fingerprint yet.
    pub fn generator(mut self, generator: FingerprintGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn build(self) -> Result<InstanceManager, ConfigError> {
        self.settings.validate()?;
        Ok(InstanceManager {
            automation: self.automation,
            store: self.store,
            proxies: self
                .proxies
                .unwrap_or_else(|| Arc::new(StaticProxyResolver::new())),
            settings: self.settings,
            generator: Mutex::new(self.generator.unwrap_or_default()),
            registry: Arc::new(Registry::new()),
        })
    }
}

/// Launches, tracks and closes one browser instance per profile.
pub struct InstanceManager {
    automation: Arc<dyn BrowserAutomation>,
    store: Arc<dyn ProfileStore>,
    proxies: Arc<dyn ProxyResolver>,
    settings: LauncherSettings,
    generator: Mutex<FingerprintGenerator>,
    registry: Arc<Registry<Instance>>,
}

impl InstanceManager {
    pub fn builder(
        automation: Arc<dyn BrowserAutomation>,
        store: Arc<dyn ProfileStore>,
    ) -> InstanceManagerBuilder {
        InstanceManagerBuilder {
            automation,
            store,
            proxies: None,
            settings: LauncherSettings::default(),
            generator: None,
        }
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    /// Launches the profile's browser and opens the configured start page.
    pub async fn launch(&self, profile_id: &str) -> Result<InstanceInfo, InstanceError> {
        let start_url = self.settings.start_url.clone();
        self.launch_at(profile_id, &start_url).await
    }

    /// Launches the profile's browser with `url` as its first page.
    ///
    /// A failed first navigation rolls the whole launch back, as with [`launch`](Self::launch).
    pub async fn launch_with_url(
        &self,
        profile_id: &str,
        url: &str,
    ) -> Result<InstanceInfo, InstanceError> {
        self.launch_at(profile_id, url).await
    }

    async fn launch_at(&self, profile_id: &str, url: &str) -> Result<InstanceInfo, InstanceError> {
        let claim = self
            .registry
            .claim(profile_id)
            .ok_or_else(|| InstanceError::AlreadyRunning {
                profile_id: profile_id.to_string(),
            })?;

        info!(profile_id, "Launching browser instance");

        let prepared = self.prepare(profile_id).await?;
        let session = self.start(profile_id, &prepared, url).await?;

        let instance = Arc::new(Instance {
            profile_id: profile_id.to_string(),
            instance_id: Uuid::new_v4(),
            fingerprint: prepared.fingerprint,
            program: prepared.program,
            session,
            cancel: CancellationToken::new(),
            launched_at: Utc::now(),
            ops: tokio::sync::Mutex::new(()),
        });
        let info = instance.info();

        claim.commit(Arc::clone(&instance));
        self.spawn_exit_watcher(instance);

        info!(
            profile_id,
            instance_id = %info.instance_id,
            program_key = %info.program_key,
            "Browser instance running"
        );

        if let Err(e) = self.store.touch_last_used(profile_id).await {
            warn!(profile_id, error = %e, "Failed to record last use");
        }

        Ok(info)
    }

    /// Resolves the profile, its fingerprint and program, the proxy and the binary.
    async fn prepare(&self, profile_id: &str) -> Result<PreparedLaunch, InstanceError> {
        let profile = self
            .store
            .profile(profile_id)
            .await
            .map_err(|e| InstanceError::from_store(profile_id, e))?;

        let fingerprint = Arc::new(self.fingerprint_for(&profile).await?);
        let program = synthesize(&fingerprint);
        debug!(
            profile_id,
            program_key = program.key(),
            program_len = program.len(),
            "Override program synthesized"
        );

        let proxy_url = match &profile.proxy_id {
            Some(proxy_id) => Some(
                self.proxies
                    .resolve_proxy_url(proxy_id)
                    .await
                    .map_err(|e| InstanceError::LaunchFailed {
                        profile_id: profile_id.to_string(),
                        stage: LaunchStage::ProxyResolution,
                        source: e.into(),
                    })?,
            ),
            None => None,
        };

        let executable = find_browser_executable(self.settings.browser_executable.as_deref())
            .map_err(|e| InstanceError::ExecutableNotFound {
                searched: e.searched,
            })?;

        let mut options = LaunchOptions::new(executable, profile.data_dir.clone())
            .headless(self.settings.headless)
            .window_size(fingerprint.screen.width, fingerprint.screen.height)
            .disable_webrtc(fingerprint.network.webrtc_policy == WebRtcPolicy::Disable)
            .timezone(fingerprint.timezone.zone.clone())
            .add_arg(format!("--lang={}", fingerprint.navigator.language));
        if let Some(url) = proxy_url {
            options = options.proxy(url);
        }
        for arg in &self.settings.extra_args {
            options = options.add_arg(arg.clone());
        }

        Ok(PreparedLaunch {
            fingerprint,
            program,
            options,
        })
    }

    /// The stored fingerprint, or a freshly generated one that is saved first.
    async fn fingerprint_for(&self, profile: &Profile) -> Result<Fingerprint, InstanceError> {
        if let Some(fingerprint) = &profile.fingerprint {
            if let Err(e) = fingerprint.validate() {
                warn!(profile_id = %profile.id, error = %e, "Stored fingerprint is inconsistent");
            }
            return Ok(fingerprint.clone());
        }

        let fingerprint = self
            .generator
            .lock()
            .generate(&self.settings.generate_options());
        self.store
            .save_fingerprint(&profile.id, &fingerprint)
            .await
            .map_err(|e| InstanceError::from_store(&profile.id, e))?;
        info!(
            profile_id = %profile.id,
            platform = %fingerprint.navigator.platform,
            "Generated fingerprint for profile"
        );
        Ok(fingerprint)
    }

    /// Starts the browser, registers the program and performs the first navigation.
    ///
    /// On any failure the session is shut down before the error is returned.
    async fn start(
        &self,
        profile_id: &str,
        prepared: &PreparedLaunch,
        url: &str,
    ) -> Result<Arc<dyn BrowserSession>, InstanceError> {
        let launch_failed = |stage, source| InstanceError::LaunchFailed {
            profile_id: profile_id.to_string(),
            stage,
            source,
        };

        let session: Arc<dyn BrowserSession> =
            match self.bounded(self.automation.launch(&prepared.options)).await {
                Ok(Ok(session)) => Arc::from(session),
                Ok(Err(e)) => return Err(launch_failed(LaunchStage::Launch, e)),
                Err(limit) => return Err(launch_failed(LaunchStage::Timeout, timed_out("launch", limit))),
            };
        debug!(profile_id, "Browser process started");

        let registered = match self
            .bounded(session.add_script_on_new_document(prepared.program.source()))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(InstanceError::ScriptRegistrationFailed {
                profile_id: profile_id.to_string(),
                source,
            }),
            Err(limit) => Err(launch_failed(
                LaunchStage::Timeout,
                timed_out("script registration", limit),
            )),
        };
        if let Err(e) = registered {
            self.teardown(profile_id, &session).await;
            return Err(e);
        }

        let navigated = match self.bounded(session.navigate(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(InstanceError::NavigationFailed {
                profile_id: profile_id.to_string(),
                url: url.to_string(),
                source,
            }),
            Err(limit) => Err(launch_failed(
                LaunchStage::Timeout,
                timed_out("first navigation", limit),
            )),
        };
        if let Err(e) = navigated {
            self.teardown(profile_id, &session).await;
            return Err(e);
        }

        Ok(session)
    }

    /// Applies the configured launch timeout to one step.
    async fn bounded<F, T>(&self, step: F) -> Result<T, Duration>
    where
        F: Future<Output = T>,
    {
        match self.settings.launch_timeout() {
            Some(limit) => tokio::time::timeout(limit, step).await.map_err(|_| limit),
            None => Ok(step.await),
        }
    }

    async fn teardown(&self, profile_id: &str, session: &Arc<dyn BrowserSession>) {
        warn!(profile_id, "Launch failed, shutting down browser");
        if let Err(e) = session.shutdown().await {
            warn!(profile_id, error = %e, "Browser shutdown after failed launch also failed");
        }
    }

    /// Watches for the process exiting on its own and evicts the instance.
    fn spawn_exit_watcher(&self, instance: Arc<Instance>) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = instance.cancel.cancelled() => {}
                _ = instance.session.wait_exit() => {
                    if registry.remove_if_same(&instance.profile_id, &instance) {
                        instance.cancel.cancel();
                        warn!(
                            profile_id = %instance.profile_id,
                            instance_id = %instance.instance_id,
                            "Browser exited unexpectedly"
                        );
                        if let Err(e) = instance.session.shutdown().await {
                            debug!(error = %e, "Cleanup after unexpected exit failed");
                        }
                    }
                }
            }
        });
    }

    /// Closes the profile's browser and removes it from the registry.
    ///
    /// Of two concurrent calls for the same profile, the second observes
    /// [`InstanceError::NotRunning`].
    pub async fn close(&self, profile_id: &str) -> Result<(), InstanceError> {
        let instance =
            self.registry
                .begin_close(profile_id)
                .ok_or_else(|| InstanceError::NotRunning {
                    profile_id: profile_id.to_string(),
                })?;

        let result = self.shutdown_instance(&instance).await;
        self.registry.finish_close(profile_id);
        result
    }

    /// Closes every running instance, continuing past individual failures.
    pub async fn close_all(&self) -> CloseAllReport {
        let instances = self.registry.begin_close_all();
        if instances.is_empty() {
            return CloseAllReport::default();
        }
        info!(count = instances.len(), "Closing all browser instances");

        let results = join_all(
            instances
                .iter()
                .map(|(_, instance)| self.shutdown_instance(instance)),
        )
        .await;

        let mut report = CloseAllReport::default();
        for ((profile_id, _), result) in instances.into_iter().zip(results) {
            self.registry.finish_close(&profile_id);
            match result {
                Ok(()) => report.closed.push(profile_id),
                Err(e) => report.failed.push((profile_id, e)),
            }
        }
        report
    }

    /// Cancels, closes the context, waits the grace delay, then releases the process.
    async fn shutdown_instance(&self, instance: &Instance) -> Result<(), InstanceError> {
        instance.cancel.cancel();
        let _ops = instance.ops.lock().await;

        if let Err(e) = instance.session.close_context().await {
            debug!(profile_id = %instance.profile_id, error = %e, "Closing browsing context failed");
        }
        tokio::time::sleep(self.settings.close_grace()).await;

        instance
            .session
            .shutdown()
            .await
            .map_err(|source| InstanceError::CloseFailed {
                profile_id: instance.profile_id.clone(),
                source,
            })?;

        info!(
            profile_id = %instance.profile_id,
            instance_id = %instance.instance_id,
            "Browser instance closed"
        );
        Ok(())
    }

    /// Navigates a running instance.
    ///
    /// The override program is not registered again: it stays installed for every
    /// new document of the browsing context.
    pub async fn navigate_to(&self, profile_id: &str, url: &str) -> Result<(), InstanceError> {
        let not_running = || InstanceError::NotRunning {
            profile_id: profile_id.to_string(),
        };
        let instance = self.registry.get(profile_id).ok_or_else(not_running)?;

        let _ops = instance.ops.lock().await;
        tokio::select! {
            biased;
            _ = instance.cancel.cancelled() => Err(not_running()),
            result = instance.session.navigate(url) => {
                result.map_err(|source| InstanceError::NavigationFailed {
                    profile_id: profile_id.to_string(),
                    url: url.to_string(),
                    source,
                })?;
                debug!(profile_id, url, "Navigated");
                Ok(())
            }
        }
    }

    pub fn is_running(&self, profile_id: &str) -> bool {
        self.registry.is_running(profile_id)
    }

    /// Ids of running profiles, sorted.
    pub fn running(&self) -> Vec<String> {
        self.registry.running_keys()
    }

    pub fn instance_info(&self, profile_id: &str) -> Option<InstanceInfo> {
        self.registry.get(profile_id).map(|instance| instance.info())
    }

    /// Snapshots of every running instance, sorted by profile id.
    pub fn instances(&self) -> Vec<InstanceInfo> {
        let mut infos: Vec<InstanceInfo> = self
            .registry
            .running()
            .iter()
            .map(|instance| instance.info())
            .collect();
        infos.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
        infos
    }

    /// The override program registered for a running profile.
    pub fn program(&self, profile_id: &str) -> Option<OverrideProgram> {
        self.registry
            .get(profile_id)
            .map(|instance| instance.program.clone())
    }

    /// Replaces the profile's fingerprint with a newly generated one.
    ///
    /// A running instance keeps presenting the old identity, so it is closed; the
    /// next launch uses the new fingerprint. The profile key is held for the whole
    /// replacement, so a launch or close still in flight yields
    /// [`InstanceError::AlreadyRunning`] and the stored fingerprint is left as is.
    pub async fn regenerate(
        &self,
        profile_id: &str,
        options: &GenerateOptions,
    ) -> Result<Fingerprint, InstanceError> {
        self.store
            .profile(profile_id)
            .await
            .map_err(|e| InstanceError::from_store(profile_id, e))?;

        match self.close(profile_id).await {
            Ok(()) | Err(InstanceError::NotRunning { .. }) => {}
            Err(e) => return Err(e),
        }

        let _claim = self
            .registry
            .claim(profile_id)
            .ok_or_else(|| InstanceError::AlreadyRunning {
                profile_id: profile_id.to_string(),
            })?;

        let fingerprint = self.generator.lock().generate(options);
        self.store
            .save_fingerprint(profile_id, &fingerprint)
            .await
            .map_err(|e| InstanceError::from_store(profile_id, e))?;
        info!(profile_id, "Fingerprint regenerated");

        Ok(fingerprint)
    }
}

fn timed_out(step: &str, limit: Duration) -> anyhow::Error {
    anyhow::anyhow!("{} did not complete within {}ms", step, limit.as_millis())
}
