//! On-disk cache of recently-seen peer addresses, used by the discoverer as
//! a fallback when DNS discovery turns up nothing (e.g. the node is
//! restarting and the network alias hasn't re-registered it yet).

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use serde::{Deserialize, Serialize};

const MAX_CACHE_AGE_SECS: u64 = 3600;
const MAX_ENTRIES: usize = 10;

#[derive(Serialize, Deserialize, Default)]
struct CacheFile {
    nodes: Vec<String>,
    timestamp: u64,
}

pub fn load(path: &Path) -> Vec<String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    let cache: CacheFile = match serde_json::from_str(&raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("peer cache at {path:?} is corrupt: {e}");
            return Vec::new();
        }
    };

    if now_secs().saturating_sub(cache.timestamp) < MAX_CACHE_AGE_SECS {
        cache.nodes
    } else {
        Vec::new()
    }
}

fn save(path: &Path, nodes: &[String]) {
    let cache = CacheFile {
        nodes: nodes.to_vec(),
        timestamp: now_secs(),
    };
    match serde_json::to_string(&cache) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("failed to write peer cache {path:?}: {e}");
            }
        }
        Err(e) => warn!("failed to serialize peer cache: {e}"),
    }
}

/// Adds `address` to the front of the cache, deduplicated, trimmed to
/// `MAX_ENTRIES` most-recently-seen addresses.
pub fn add(path: &Path, address: &str) {
    let mut nodes = load(path);
    nodes.retain(|n| n != address);
    nodes.insert(0, address.to_string());
    nodes.truncate(MAX_ENTRIES);
    save(path, &nodes);
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn add_then_load_roundtrips() {
        let file = NamedTempFile::new().unwrap();
        add(file.path(), "10.0.0.1:5000");
        add(file.path(), "10.0.0.2:5000");
        let nodes = load(file.path());
        assert_eq!(nodes, vec!["10.0.0.2:5000", "10.0.0.1:5000"]);
    }

    #[test]
    fn adding_duplicate_moves_it_to_front() {
        let file = NamedTempFile::new().unwrap();
        add(file.path(), "a");
        add(file.path(), "b");
        add(file.path(), "a");
        assert_eq!(load(file.path()), vec!["a", "b"]);
    }

    #[test]
    fn missing_file_loads_empty() {
        assert!(load(Path::new("/nonexistent/peer_cache.json")).is_empty());
    }
}
