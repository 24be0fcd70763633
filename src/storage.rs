//! Client-local durable storage for filter and selection state.
//!
//! Values are JSON documents addressed by an opaque key; the store does not
//! interpret them.

use crate::core::{Result, SyncError};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait StateStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Reads a JSON document; a corrupt document counts as absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.load(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            tracing::warn!(key, error = %err, "discarding unreadable persisted state");
            Ok(None)
        }
    }
}

pub fn save_json<T: Serialize>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    store.save(key, &encoded)
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock()?.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        atomic_write(&self.path_for(key), value.as_bytes())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            SyncError::Storage(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|err| {
        SyncError::Storage(format!(
            "Failed to write temp file '{}': {}",
            tmp.display(),
            err
        ))
    })?;

    fs::rename(&tmp, path).map_err(|err| {
        SyncError::Storage(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_store_round_trips_json() {
        let store = MemoryStateStore::new();
        save_json(&store, "contacts.selection", &vec!["1", "2"]).unwrap();
        let ids: Option<Vec<String>> = load_json(&store, "contacts.selection").unwrap();
        assert_eq!(ids, Some(vec!["1".to_string(), "2".to_string()]));

        store.remove("contacts.selection").unwrap();
        assert!(store.load("contacts.selection").unwrap().is_none());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let temp = tempdir().expect("temp dir");
        let store = FileStateStore::new(temp.path().join("state"));
        store.save("filters/contacts", "{\"a\":1}").unwrap();

        let reopened = FileStateStore::new(temp.path().join("state"));
        assert_eq!(
            reopened.load("filters/contacts").unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(temp.path().join("state/filters_contacts.json").exists());

        reopened.remove("filters/contacts").unwrap();
        reopened.remove("filters/contacts").unwrap();
        assert!(reopened.load("filters/contacts").unwrap().is_none());
    }

    #[test]
    fn corrupt_documents_load_as_absent() {
        let store = MemoryStateStore::new();
        store.save("broken", "{not json").unwrap();
        let value: Option<Vec<String>> = load_json(&store, "broken").unwrap();
        assert!(value.is_none());
    }
}
