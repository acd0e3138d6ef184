//! Browser profiles and the store boundary.
//!
//! A [`Profile`] is the long-lived identity a user launches: a name, a data
//! directory for cookies and storage, an optional proxy reference and the
//! fingerprint it presents. The instance manager reaches profiles only through the
//! [`ProfileStore`] trait; [`MemoryProfileStore`] is the bundled implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::fingerprint::Fingerprint;

/// Errors raised by profile stores and profile import/export.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile not found: {0}")]
    NotFound(String),

    #[error("profile I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure inside a store backend.
    #[error("profile store error: {0}")]
    Backend(String),
}

/// A user-facing browser identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// Generated on first launch when absent.
    #[serde(default)]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_id: Option<String>,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// New profile with a fresh id; its data directory is `data_root/<id>`.
    pub fn new(name: impl Into<String>, data_root: impl AsRef<Path>) -> Self {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        Self {
            data_dir: data_root.as_ref().join(&id),
            id,
            name: name.into(),
            fingerprint: None,
            proxy_id: None,
            notes: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_proxy(mut self, proxy_id: impl Into<String>) -> Self {
        self.proxy_id = Some(proxy_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Copy with a new id and data directory, named "<name> (Copy)".
    pub fn duplicate(&self, data_root: impl AsRef<Path>) -> Self {
        let mut copy = Profile::new(format!("{} (Copy)", self.name), data_root);
        copy.fingerprint = self.fingerprint.clone();
        copy.proxy_id = self.proxy_id.clone();
        copy.notes = self.notes.clone();
        copy.tags = self.tags.clone();
        copy
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the profile as pretty JSON.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads an exported profile as a new one: fresh id and data directory, name
    /// suffixed with " (Imported)". The proxy reference is not carried over since
    /// proxy ids are local to the exporting installation.
    pub fn import(path: impl AsRef<Path>, data_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let exported: Profile = serde_json::from_str(&content)?;

        let mut profile = Profile::new(format!("{} (Imported)", exported.name), data_root);
        profile.fingerprint = exported.fingerprint;
        profile.notes = exported.notes;
        profile.tags = exported.tags;
        Ok(profile)
    }
}

/// Where the instance manager loads profiles and persists fingerprints.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Loads a profile; [`StoreError::NotFound`] if it does not exist.
    async fn profile(&self, id: &str) -> Result<Profile, StoreError>;

    /// The profile's fingerprint, if one has been assigned.
    async fn fingerprint(&self, id: &str) -> Result<Option<Fingerprint>, StoreError> {
        Ok(self.profile(id).await?.fingerprint)
    }

    /// Assigns (or replaces) the profile's fingerprint.
    async fn save_fingerprint(&self, id: &str, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    /// Records that the profile was just launched.
    async fn touch_last_used(&self, id: &str) -> Result<(), StoreError>;
}

/// Thread-safe in-memory profile store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a profile, returning its id.
    pub fn insert(&self, profile: Profile) -> String {
        let id = profile.id.clone();
        self.profiles.write().insert(id.clone(), profile);
        id
    }

    pub fn get(&self, id: &str) -> Option<Profile> {
        self.profiles.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Profile> {
        self.profiles.write().remove(id)
    }

    /// All profiles, most recently updated first.
    pub fn list(&self) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self.profiles.read().values().cloned().collect();
        profiles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    fn update<F>(&self, id: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Profile),
    {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        f(profile);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn profile(&self, id: &str) -> Result<Profile, StoreError> {
        self.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_fingerprint(&self, id: &str, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.update(id, |profile| {
            profile.fingerprint = Some(fingerprint.clone());
            profile.updated_at = Utc::now();
        })
    }

    async fn touch_last_used(&self, id: &str) -> Result<(), StoreError> {
        self.update(id, |profile| {
            let now = Utc::now();
            profile.last_used_at = Some(now);
            profile.updated_at = now;
        })
    }
}
