//! Persistent key-value storage seam
//!
//! Mirrors the extension storage API: two isolated areas, JSON values, and
//! change notifications carrying the old and new value of each changed key.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value mapping exchanged with the storage collaborator.
pub type StorageMap = serde_json::Map<String, Value>;

/// Changed keys of one storage area, as delivered by change notifications.
pub type StorageChanges = BTreeMap<String, StorageChange>;

/// Storage area (scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Retained on this device only
    Local,
    /// Synced across the user's devices
    Sync,
}

impl StorageArea {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sync => "sync",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "local" => Some(Self::Local),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }
}

/// Old and new value of one changed key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// Failure reported by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Persistent key-value storage.
///
/// Individual calls are serialized by the implementation; sequences of calls
/// are not transactional.
#[allow(async_fn_in_trait)]
pub trait Storage {
    /// Values for the requested keys. Missing keys are absent from the map.
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError>;

    /// Write every entry of `items`.
    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError>;

    /// Delete the given keys. Missing keys are ignored.
    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError>;
}

impl<T: Storage + ?Sized> Storage for &T {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError> {
        (**self).get(area, keys).await
    }

    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError> {
        (**self).set(area, items).await
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        (**self).remove(area, keys).await
    }
}

impl<T: Storage + ?Sized> Storage for Rc<T> {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError> {
        (**self).get(area, keys).await
    }

    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError> {
        (**self).set(area, items).await
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        (**self).remove(area, keys).await
    }
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError> {
        (**self).get(area, keys).await
    }

    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError> {
        (**self).set(area, items).await
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        (**self).remove(area, keys).await
    }
}

/// Compute the change set produced by writing `items` over `current`.
///
/// Keys whose value does not change are omitted, matching the platform's
/// change notifications.
pub fn diff_set(current: &StorageMap, items: &StorageMap) -> StorageChanges {
    let mut changes = StorageChanges::new();
    for (key, value) in items {
        let old = current.get(key);
        if old != Some(value) {
            changes.insert(
                key.clone(),
                StorageChange {
                    old_value: old.cloned(),
                    new_value: Some(value.clone()),
                },
            );
        }
    }
    changes
}

/// Compute the change set produced by removing `keys` from `current`.
pub fn diff_remove(current: &StorageMap, keys: &[&str]) -> StorageChanges {
    let mut changes = StorageChanges::new();
    for key in keys {
        if let Some(old) = current.get(*key) {
            changes.insert(
                (*key).to_string(),
                StorageChange {
                    old_value: Some(old.clone()),
                    new_value: None,
                },
            );
        }
    }
    changes
}
