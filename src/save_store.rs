use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const STORE_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum SaveStoreError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize save store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Last persisted blob of one instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSave {
    pub zone: String,
    pub blob: String,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    pub updated_at: String,
}

#[derive(Serialize)]
struct SaveStoreFile<'a> {
    version: u8,
    instances: &'a BTreeMap<String, StoredSave>,
}

#[derive(Deserialize)]
struct SaveStoreFileRaw {
    version: u8,
    #[serde(default)]
    instances: BTreeMap<String, serde_json::Value>,
}

/// File-backed map of instance id to its save blob. Every `put` rewrites the
/// whole file.
pub struct SaveStore {
    file_path: PathBuf,
    instances: BTreeMap<u64, StoredSave>,
}

impl SaveStore {
    pub fn new(file_path: PathBuf) -> Self {
        let instances = load_instances(&file_path);
        debug!(path = %file_path.display(), instances = instances.len(), "save_store_loaded");
        Self {
            file_path,
            instances,
        }
    }

    pub fn get(&self, instance_id: u64) -> Option<&StoredSave> {
        self.instances.get(&instance_id)
    }

    /// Blob for `instance_id`, only if it was written by the same zone.
    pub fn blob_for(&self, instance_id: u64, zone: &str) -> Option<&str> {
        self.instances
            .get(&instance_id)
            .filter(|stored| stored.zone == zone)
            .map(|stored| stored.blob.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (u64, &StoredSave)> {
        self.instances.iter().map(|(id, stored)| (*id, stored))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn next_instance_id(&self) -> u64 {
        self.instances.keys().next_back().map_or(1, |last| last + 1)
    }

    pub fn put(&mut self, instance_id: u64, zone: &str, blob: &str) -> Result<(), SaveStoreError> {
        let unchanged = self
            .instances
            .get(&instance_id)
            .is_some_and(|stored| stored.zone == zone && stored.blob == blob);
        if unchanged {
            return Ok(());
        }
        self.instances.insert(
            instance_id,
            StoredSave {
                zone: zone.to_string(),
                blob: blob.to_string(),
                updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        );
        self.write()
    }

    pub fn remove(&mut self, instance_id: u64) -> Result<bool, SaveStoreError> {
        if self.instances.remove(&instance_id).is_none() {
            return Ok(false);
        }
        self.write()?;
        Ok(true)
    }

    fn write(&self) -> Result<(), SaveStoreError> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|source| SaveStoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let instances: BTreeMap<String, StoredSave> = self
            .instances
            .iter()
            .map(|(id, stored)| (id.to_string(), stored.clone()))
            .collect();
        let text = serde_json::to_string_pretty(&SaveStoreFile {
            version: STORE_VERSION,
            instances: &instances,
        })?;
        fs::write(&self.file_path, text).map_err(|source| SaveStoreError::Write {
            path: self.file_path.clone(),
            source,
        })
    }
}

fn load_instances(path: &Path) -> BTreeMap<u64, StoredSave> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "save_store_read_failed");
            }
            return BTreeMap::new();
        }
    };
    let parsed = match serde_json::from_str::<SaveStoreFileRaw>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(path = %path.display(), version = value.version, "save_store_unsupported_version");
            return BTreeMap::new();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "save_store_parse_failed");
            return BTreeMap::new();
        }
    };

    let mut instances = BTreeMap::new();
    for (key, raw_value) in parsed.instances {
        let Ok(instance_id) = key.trim().parse::<u64>() else {
            warn!(path = %path.display(), key = %key, "save_store_bad_instance_id");
            continue;
        };
        let stored: StoredSave = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(path = %path.display(), instance_id, %error, "save_store_bad_entry");
                continue;
            }
        };
        if stored.zone.trim().is_empty() {
            continue;
        }
        instances.insert(instance_id, stored);
    }
    instances
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!("{}-{}-{}", name, std::process::id(), rand::random::<u32>());
        std::env::temp_dir().join(unique).join("saves.json")
    }

    fn cleanup(path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn put_persists_and_reloads() {
        let path = temp_file("save-store-roundtrip");
        let mut store = SaveStore::new(path.clone());
        assert!(store.is_empty());
        store.put(7, "shadowfang_keep", "S K 3 0 0 0 0").expect("write");
        store.put(9, "razorfen_downs", "T C 0 1").expect("write");

        let reloaded = SaveStore::new(path.clone());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.blob_for(7, "shadowfang_keep"), Some("S K 3 0 0 0 0"));
        assert_eq!(reloaded.blob_for(7, "razorfen_downs"), None);
        assert_eq!(reloaded.next_instance_id(), 10);
        cleanup(&path);
    }

    #[test]
    fn remove_rewrites_the_file() {
        let path = temp_file("save-store-remove");
        let mut store = SaveStore::new(path.clone());
        store.put(1, "black_temple", "B T 0 0 0 0 0 0 0 0 0").expect("write");
        assert!(store.remove(1).expect("write"));
        assert!(!store.remove(1).expect("noop"));
        assert!(SaveStore::new(path.clone()).is_empty());
        cleanup(&path);
    }

    #[test]
    fn unsupported_version_loads_empty() {
        let path = temp_file("save-store-version");
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(&path, r#"{"version": 9, "instances": {}}"#).expect("write file");
        assert!(SaveStore::new(path.clone()).is_empty());

        fs::write(&path, "not json").expect("write file");
        assert!(SaveStore::new(path.clone()).is_empty());
        cleanup(&path);
    }

    #[test]
    fn bad_entries_are_skipped() {
        let path = temp_file("save-store-partial");
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        let raw = r#"{
  "version": 1,
  "instances": {
    "3": { "zone": "razorfen_downs", "blob": "T C 3 16", "updatedAt": "2024-01-01T00:00:00.000Z" },
    "x": { "zone": "razorfen_downs", "blob": "T C 0 0", "updatedAt": "" },
    "4": { "zone": "razorfen_downs" },
    "5": { "zone": " ", "blob": "T C 0 0", "updatedAt": "" }
  }
}"#;
        fs::write(&path, raw).expect("write file");

        let store = SaveStore::new(path.clone());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(3).map(|stored| stored.blob.as_str()), Some("T C 3 16"));
        cleanup(&path);
    }
}
