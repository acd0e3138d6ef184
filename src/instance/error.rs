//! Errors surfaced by the instance manager.

use thiserror::Error;

use crate::profile::StoreError;

/// Step of a launch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchStage {
    /// Looking up the profile's proxy URL.
    ProxyResolution,
    /// Starting the browser process and opening its context.
    Launch,
    /// A launch step (process start, script registration or first navigation)
    /// exceeded the configured per-step timeout.
    Timeout,
}

impl LaunchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStage::ProxyResolution => "proxy_resolution",
            LaunchStage::Launch => "launch",
            LaunchStage::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`InstanceManager`](super::InstanceManager) operations.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("profile {profile_id} is already running")]
    AlreadyRunning { profile_id: String },

    #[error("profile {profile_id} is not running")]
    NotRunning { profile_id: String },

    #[error("profile not found: {profile_id}")]
    ProfileNotFound { profile_id: String },

    #[error("no browser executable found (searched: {})", .searched.join(", "))]
    ExecutableNotFound { searched: Vec<String> },

    #[error("launch of profile {profile_id} failed at {stage}: {source:#}")]
    LaunchFailed {
        profile_id: String,
        stage: LaunchStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("registering the override program for profile {profile_id} failed: {source:#}")]
    ScriptRegistrationFailed {
        profile_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("navigation of profile {profile_id} to {url} failed: {source:#}")]
    NavigationFailed {
        profile_id: String,
        url: String,
        #[source]
        source: anyhow::Error,
    },

    /// The instance was removed but the browser did not shut down cleanly.
    #[error("closing profile {profile_id} failed: {source:#}")]
    CloseFailed {
        profile_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("profile store failed for {profile_id}: {source}")]
    Store {
        profile_id: String,
        #[source]
        source: StoreError,
    },
}

impl InstanceError {
    /// Whether calling the same operation again may succeed.
    ///
    /// Configuration errors (missing profile or executable) and state errors are
    /// not retryable. The manager never retries by itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InstanceError::LaunchFailed { .. }
                | InstanceError::ScriptRegistrationFailed { .. }
                | InstanceError::NavigationFailed { .. }
        )
    }

    /// The profile the error concerns, if any.
    pub fn profile_id(&self) -> Option<&str> {
        match self {
            InstanceError::AlreadyRunning { profile_id }
            | InstanceError::NotRunning { profile_id }
            | InstanceError::ProfileNotFound { profile_id }
            | InstanceError::LaunchFailed { profile_id, .. }
            | InstanceError::ScriptRegistrationFailed { profile_id, .. }
            | InstanceError::NavigationFailed { profile_id, .. }
            | InstanceError::CloseFailed { profile_id, .. }
            | InstanceError::Store { profile_id, .. } => Some(profile_id),
            InstanceError::ExecutableNotFound { .. } => None,
        }
    }

    pub(crate) fn from_store(profile_id: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => InstanceError::ProfileNotFound {
                profile_id: profile_id.to_string(),
            },
            source => InstanceError::Store {
                profile_id: profile_id.to_string(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_retryable_classification() {
        let launch = InstanceError::LaunchFailed {
            profile_id: "p1".into(),
            stage: LaunchStage::Launch,
            source: anyhow!("spawn failed"),
        };
        assert!(launch.is_retryable());
        assert!(!InstanceError::ProfileNotFound { profile_id: "p1".into() }.is_retryable());
        assert!(!InstanceError::ExecutableNotFound { searched: vec![] }.is_retryable());
        assert!(!InstanceError::AlreadyRunning { profile_id: "p1".into() }.is_retryable());
    }

    #[test]
    fn test_display_carries_context() {
        let err = InstanceError::LaunchFailed {
            profile_id: "p1".into(),
            stage: LaunchStage::ProxyResolution,
            source: anyhow!("proxy not found: px"),
        };
        let msg = err.to_string();
        assert!(msg.contains("p1"));
        assert!(msg.contains("proxy_resolution"));
        assert!(msg.contains("proxy not found: px"));
        assert_eq!(err.profile_id(), Some("p1"));
    }

    #[test]
    fn test_store_not_found_maps_to_profile_not_found() {
        let err = InstanceError::from_store("p9", StoreError::NotFound("p9".into()));
        assert!(matches!(err, InstanceError::ProfileNotFound { .. }));

        let err = InstanceError::from_store("p9", StoreError::Backend("disk full".into()));
        assert!(matches!(err, InstanceError::Store { .. }));
    }
}
