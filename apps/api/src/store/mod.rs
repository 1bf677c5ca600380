//! Local key-value blob store, the device-side home of diary entries.
//!
//! Values are opaque strings. The entry collection is a JSON array under
//! [`ENTRIES_KEY`]; the sync watermark and the auto-sync flag sit next to it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::diary::{DiaryEntry, RawDiaryEntry};

pub mod file;

pub use file::FileStore;

pub const ENTRIES_KEY: &str = "journalEntries";
pub const LAST_SYNC_KEY: &str = "last_sync_time";
pub const AUTO_SYNC_KEY: &str = "auto_sync_enabled";
pub const USERNAME_KEY: &str = "line-username";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Synchronous string-keyed store. Reads never fail; writes may.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Non-persistent store used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values().remove(key);
        Ok(())
    }
}

/// Reads the raw entry collection. Absent, corrupt or non-array content is empty.
pub fn read_entry_values(store: &dyn LocalStore) -> Vec<Value> {
    let Some(blob) = store.get(ENTRIES_KEY) else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(&blob) {
        Ok(Value::Array(values)) => values,
        Ok(other) => {
            warn!(
                "Local entry collection is not an array (found {}), treating as empty",
                json_kind(&other)
            );
            Vec::new()
        }
        Err(e) => {
            warn!("Local entry collection is corrupt, treating as empty: {e}");
            Vec::new()
        }
    }
}

pub fn write_entry_values(store: &dyn LocalStore, values: &[Value]) -> Result<(), StoreError> {
    let blob = serde_json::to_string(values)?;
    store.set(ENTRIES_KEY, &blob)
}

/// Converts one stored record into the canonical shape; `None` for non-objects.
pub fn parse_entry(value: &Value) -> Option<DiaryEntry> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value::<RawDiaryEntry>(value.clone())
        .ok()
        .map(DiaryEntry::from)
}

/// Auto-sync is on unless the stored flag is literally `"false"`.
pub fn auto_sync_enabled(store: &dyn LocalStore) -> bool {
    store.get(AUTO_SYNC_KEY).as_deref() != Some("false")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
