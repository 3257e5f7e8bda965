//! Local persistent key-value storage.
//!
//! This is intentionally a flat, generic string-to-bytes map with no notion
//! of "application keys" versus "version metadata" baked into its type —
//! version and tombstone bookkeeping live in ordinary keys
//! (`__meta_ver__<key>`, `__meta_del__<key>`) written through the same
//! `get`/`put`/`delete` surface everything else uses. That mirrors how the
//! replication layer this was adapted from treats metadata: it is data, not
//! a schema.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::warn;
use serde::{Deserialize, Serialize};

const META_VER_PREFIX: &str = "__meta_ver__";
const META_DEL_PREFIX: &str = "__meta_del__";

pub fn meta_ver_key(key: &str) -> String {
    format!("{META_VER_PREFIX}{key}")
}

pub fn meta_del_key(key: &str) -> String {
    format!("{META_DEL_PREFIX}{key}")
}

pub fn is_meta_key(key: &str) -> bool {
    key.starts_with(META_VER_PREFIX) || key.starts_with(META_DEL_PREFIX)
}

pub fn base_key_from_meta(meta_key: &str) -> Option<&str> {
    meta_key
        .strip_prefix(META_VER_PREFIX)
        .or_else(|| meta_key.strip_prefix(META_DEL_PREFIX))
}

#[derive(Serialize, Deserialize, Default)]
struct Document {
    entries: HashMap<String, String>,
}

pub struct LocalStore {
    path: PathBuf,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl LocalStore {
    /// Loads `path` if it exists and parses cleanly; otherwise starts empty
    /// and logs why, rather than refusing to start a node over a stale or
    /// hand-edited database file.
    pub fn new(path: PathBuf) -> Self {
        let data = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Document>(&raw) {
                Ok(doc) => doc
                    .entries
                    .into_iter()
                    .filter_map(|(k, v)| match BASE64.decode(v) {
                        Ok(bytes) => Some((k, bytes)),
                        Err(e) => {
                            warn!("Dropping corrupt entry {k} from {path:?}: {e}");
                            None
                        }
                    })
                    .collect(),
                Err(e) => {
                    warn!("Failed to parse store file {path:?}: {e}, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        LocalStore {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    pub fn put(&self, key: &str, value: Vec<u8>) {
        self.data.lock().unwrap().insert(key.to_string(), value);
        self.persist();
    }

    /// Returns true if the key was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.data.lock().unwrap().remove(key).is_some();
        self.persist();
        removed
    }

    /// All literal keys currently stored, meta keys included.
    pub fn all_keys(&self) -> Vec<String> {
        self.data.lock().unwrap().keys().cloned().collect()
    }

    /// Application keys only, meta keys filtered out.
    pub fn base_keys(&self) -> Vec<String> {
        self.data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| !is_meta_key(k))
            .cloned()
            .collect()
    }

    /// Base keys currently tombstoned, derived from which `__meta_del__`
    /// markers are present rather than from the (already-removed) live key.
    pub fn tombstoned_keys(&self) -> Vec<String> {
        self.data
            .lock()
            .unwrap()
            .keys()
            .filter_map(|k| k.strip_prefix(META_DEL_PREFIX))
            .map(|s| s.to_string())
            .collect()
    }

    pub fn version_of(&self, key: &str) -> i64 {
        self.get(&meta_ver_key(key))
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// The timestamp at which `key` was deleted, or 0 if it was never
    /// deleted (or has since been overwritten by a live `put`).
    pub fn deleted_version(&self, key: &str) -> i64 {
        self.get(&meta_del_key(key))
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub fn is_deleted(&self, key: &str) -> bool {
        self.exists(&meta_del_key(key))
    }

    /// Writes a live value with an explicit version, clearing any tombstone.
    /// Used by internal merge paths (`lww`, `replicator`) that already know
    /// the version to stamp; externally-invoked puts go through
    /// `router::save`, which picks the version from the local clock first.
    pub fn put_with_version(&self, key: &str, value: Vec<u8>, version: i64) {
        self.put(key, value);
        self.put(&meta_ver_key(key), version.to_string().into_bytes());
        self.delete(&meta_del_key(key));
    }

    /// Marks `key` deleted at `version`, dropping its live value and version
    /// marker but keeping a tombstone recording the deletion timestamp, so
    /// anti-entropy can propagate the deletion instead of resurrecting the
    /// key from a replica that missed it.
    pub fn delete_with_version(&self, key: &str, version: i64) {
        {
            let mut data = self.data.lock().unwrap();
            data.remove(key);
            data.remove(&meta_ver_key(key));
        }
        self.put(&meta_del_key(key), version.to_string().into_bytes());
    }

    fn persist(&self) {
        let entries = self
            .data
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), BASE64.encode(v)))
            .collect();
        let doc = Document { entries };
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!("Failed to persist store to {:?}: {}", self.path, e);
                }
            }
            Err(e) => warn!("Failed to serialize store: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_store() -> LocalStore {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        drop(file);
        LocalStore::new(path)
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let store = temp_store();
        store.put("k", b"v".to_vec());
        assert_eq!(store.get("k"), Some(b"v".to_vec()));
        assert!(store.delete("k"));
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn version_and_tombstone_tracked_via_meta_keys() {
        let store = temp_store();
        store.put_with_version("k", b"v".to_vec(), 100);
        assert_eq!(store.version_of("k"), 100);
        assert!(!store.is_deleted("k"));
        assert_eq!(store.deleted_version("k"), 0);

        store.delete_with_version("k", 200);
        assert_eq!(store.version_of("k"), 0);
        assert_eq!(store.deleted_version("k"), 200);
        assert!(store.is_deleted("k"));
        assert_eq!(store.get("k"), None);
        assert_eq!(store.tombstoned_keys(), vec!["k".to_string()]);
    }

    #[test]
    fn base_keys_excludes_meta_keys() {
        let store = temp_store();
        store.put_with_version("a", b"1".to_vec(), 1);
        assert_eq!(store.base_keys(), vec!["a".to_string()]);
        assert_eq!(store.all_keys().len(), 2);
    }

    #[test]
    fn reopening_survives_restart() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        {
            let store = LocalStore::new(path.clone());
            store.put_with_version("k", b"persisted".to_vec(), 5);
        }
        let reopened = LocalStore::new(path);
        assert_eq!(reopened.get("k"), Some(b"persisted".to_vec()));
        assert_eq!(reopened.version_of("k"), 5);
    }
}
