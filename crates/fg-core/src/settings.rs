//! Typed access to the persisted settings
//!
//! All settings live in the synced area so every surface (popup, options,
//! blocked page) reads the same values. The authoritative sprint record lives
//! in the local area; a mirror is kept in the synced area for the pages.
//!
//! Read-modify-write sequences here (site edits, counters) are not atomic.
//! Two surfaces writing at the same instant can lose an update; the counters
//! are statistics only, so this is accepted.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::FocusError;
use crate::pattern::{normalize, split_site_input};
use crate::storage::{Storage, StorageArea, StorageError, StorageMap};
use crate::types::{Settings, SprintState};

// =============================================================================
// Keys
// =============================================================================

pub mod keys {
    pub const BLOCKED_SITES: &str = "blockedSites";
    pub const IS_ENABLED: &str = "isEnabled";
    pub const BYPASS_ATTEMPTS: &str = "bypassAttempts";
    pub const FOCUS_TIME: &str = "focusTime";
    /// Synced mirror of the sprint record
    pub const SPRINT_STATE: &str = "sprintState";
    /// Authoritative sprint record (local area)
    pub const SPRINT_DATA: &str = "sprintData";
}

const SETTINGS_KEYS: &[&str] = &[
    keys::BLOCKED_SITES,
    keys::IS_ENABLED,
    keys::BYPASS_ATTEMPTS,
    keys::FOCUS_TIME,
];

/// Keys whose change requires the rule table to be rebuilt.
pub const RULE_KEYS: &[&str] = &[keys::BLOCKED_SITES, keys::IS_ENABLED];

/// Result of adding sites from free-form input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddSitesOutcome {
    /// Normalized patterns appended to the list
    pub added: Vec<String>,
    /// Raw entries whose pattern was already listed
    pub duplicates: Vec<String>,
}

// =============================================================================
// Settings Store
// =============================================================================

#[derive(Debug, Clone)]
pub struct SettingsStore<S> {
    storage: S,
}

impl<S: Storage> SettingsStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Load all settings, propagating storage failures.
    pub async fn try_load(&self) -> Result<Settings, FocusError> {
        let map = self.storage.get(StorageArea::Sync, SETTINGS_KEYS).await?;
        let defaults = Settings::default();
        Ok(Settings {
            blocked_sites: decode(&map, keys::BLOCKED_SITES).unwrap_or(defaults.blocked_sites),
            is_enabled: decode(&map, keys::IS_ENABLED).unwrap_or(defaults.is_enabled),
            bypass_attempts: decode(&map, keys::BYPASS_ATTEMPTS).unwrap_or(defaults.bypass_attempts),
            focus_time: decode(&map, keys::FOCUS_TIME).unwrap_or(defaults.focus_time),
        })
    }

    /// Load all settings for display; storage failures degrade to defaults.
    pub async fn load(&self) -> Settings {
        match self.try_load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, showing defaults: {e}");
                Settings::default()
            }
        }
    }

    /// Seed the defaults unless a site list already exists.
    ///
    /// Returns `true` when the defaults were written.
    pub async fn install_defaults(&self, default_sites: &[String]) -> Result<bool, FocusError> {
        let map = self.storage.get(StorageArea::Sync, &[keys::BLOCKED_SITES]).await?;
        if map.get(keys::BLOCKED_SITES).is_some_and(|v| !v.is_null()) {
            debug!("Site list already present, keeping it");
            return Ok(false);
        }

        let mut items = StorageMap::new();
        items.insert(keys::BLOCKED_SITES.to_string(), to_value(default_sites)?);
        items.insert(keys::IS_ENABLED.to_string(), Value::Bool(true));
        items.insert(keys::BYPASS_ATTEMPTS.to_string(), Value::from(0u64));
        items.insert(keys::FOCUS_TIME.to_string(), Value::from(0u64));
        self.storage.set(StorageArea::Sync, items).await?;

        info!("Installed {} default blocked sites", default_sites.len());
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Enabled flag
    // -------------------------------------------------------------------------

    pub async fn is_enabled(&self) -> Result<bool, FocusError> {
        let map = self.storage.get(StorageArea::Sync, &[keys::IS_ENABLED]).await?;
        Ok(decode(&map, keys::IS_ENABLED).unwrap_or(true))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), FocusError> {
        self.set_one(keys::IS_ENABLED, &enabled).await
    }

    /// Flip the master switch, returning the new value.
    pub async fn toggle_enabled(&self) -> Result<bool, FocusError> {
        let enabled = !self.is_enabled().await?;
        self.set_enabled(enabled).await?;
        Ok(enabled)
    }

    /// Turn blocking on if it is paused. Returns whether anything changed.
    pub async fn ensure_enabled(&self) -> Result<bool, FocusError> {
        if self.is_enabled().await? {
            return Ok(false);
        }
        self.set_enabled(true).await?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Site list
    // -------------------------------------------------------------------------

    pub async fn blocked_sites(&self) -> Result<Vec<String>, FocusError> {
        let map = self.storage.get(StorageArea::Sync, &[keys::BLOCKED_SITES]).await?;
        Ok(decode(&map, keys::BLOCKED_SITES).unwrap_or_default())
    }

    /// Add every site in newline/comma separated `text`.
    pub async fn add_sites(&self, text: &str) -> Result<AddSitesOutcome, FocusError> {
        let entries = split_site_input(text);
        if entries.is_empty() {
            return Err(FocusError::EmptyInput);
        }

        let mut sites = self.blocked_sites().await?;
        let mut outcome = AddSitesOutcome::default();

        for entry in entries {
            let pattern = normalize(entry);
            if sites.contains(&pattern) {
                outcome.duplicates.push(entry.to_string());
            } else {
                sites.push(pattern.clone());
                outcome.added.push(pattern);
            }
        }

        if !outcome.added.is_empty() {
            self.set_one(keys::BLOCKED_SITES, &sites).await?;
            info!("Added {} blocked sites", outcome.added.len());
        }
        Ok(outcome)
    }

    /// Remove the site at `index`, returning it.
    pub async fn remove_site(&self, index: usize) -> Result<String, FocusError> {
        let mut sites = self.blocked_sites().await?;
        if index >= sites.len() {
            return Err(FocusError::SiteIndexOutOfRange {
                index,
                len: sites.len(),
            });
        }
        let removed = sites.remove(index);
        self.set_one(keys::BLOCKED_SITES, &sites).await?;
        info!("Removed blocked site {removed}");
        Ok(removed)
    }

    /// Replace the site list with `default_sites`.
    pub async fn reset_sites(&self, default_sites: &[String]) -> Result<(), FocusError> {
        self.set_one(keys::BLOCKED_SITES, default_sites).await?;
        info!("Reset blocked sites to {} defaults", default_sites.len());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    /// Count one block override. Returns the new total.
    pub async fn record_bypass(&self) -> Result<u64, FocusError> {
        self.increment(keys::BYPASS_ATTEMPTS, 1).await
    }

    /// Add completed sprint minutes to the focus total. Returns the new total.
    pub async fn add_focus_time(&self, minutes: u32) -> Result<u64, FocusError> {
        self.increment(keys::FOCUS_TIME, u64::from(minutes)).await
    }

    async fn increment(&self, key: &str, by: u64) -> Result<u64, FocusError> {
        let map = self.storage.get(StorageArea::Sync, &[key]).await?;
        let current: u64 = decode(&map, key).unwrap_or(0);
        let next = current.saturating_add(by);
        self.set_one(key, &next).await?;
        Ok(next)
    }

    // -------------------------------------------------------------------------
    // Sprint record
    // -------------------------------------------------------------------------

    pub async fn load_sprint(&self) -> Result<Option<SprintState>, FocusError> {
        let map = self.storage.get(StorageArea::Local, &[keys::SPRINT_DATA]).await?;
        let mut state: Option<SprintState> = decode(&map, keys::SPRINT_DATA);
        if let Some(state) = state.as_mut() {
            state.repair_end_time();
        }
        Ok(state)
    }

    /// Write the sprint record, then its synced mirror.
    ///
    /// Only the local record decides the outcome. Once it is written the
    /// transition has happened, so a failed mirror write is logged and
    /// otherwise ignored.
    pub async fn save_sprint(&self, state: &SprintState) -> Result<(), FocusError> {
        let value = to_value(state)?;

        let mut local = StorageMap::new();
        local.insert(keys::SPRINT_DATA.to_string(), value.clone());
        self.storage.set(StorageArea::Local, local).await?;

        let mut synced = StorageMap::new();
        synced.insert(keys::SPRINT_STATE.to_string(), value);
        if let Err(e) = self.storage.set(StorageArea::Sync, synced).await {
            warn!("Failed to mirror sprint record to sync storage: {e}");
        }
        Ok(())
    }

    async fn set_one<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), FocusError> {
        let mut items = StorageMap::new();
        items.insert(key.to_string(), to_value(value)?);
        self.storage.set(StorageArea::Sync, items).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(map: &StorageMap, key: &str) -> Option<T> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Ignoring malformed '{key}' value: {e}");
            None
        }
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, FocusError> {
    serde_json::to_value(value)
        .map_err(|e| FocusError::Storage(StorageError::new(format!("Failed to encode value: {e}"))))
}
