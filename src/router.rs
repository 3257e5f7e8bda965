//! Client-facing key-value surface: hash a key, find who owns it, and
//! either serve it locally or forward it by RPC. Operates on opaque byte
//! values rather than protobuf messages — callers (the `app` layer, RPC
//! clients) are responsible for their own encoding.
//!
//! RPC failure on `save`/`delete` falls back to writing locally rather than
//! failing the call outright, so a transient partition doesn't lose a
//! write; the next replication cycle reconciles it. `load`/`exists` have no
//! safe local fallback for a key this node doesn't own, so they surface the
//! failure instead.

use std::sync::Arc;

use log::warn;

use crate::error::RouterError;
use crate::hashing::hash_key;
use crate::node::NodeCore;
use crate::proto;
use crate::rpc_client;

pub async fn exists(core: &Arc<NodeCore>, key: &str) -> Result<bool, RouterError> {
    let responsible = responsible_for(core, key).await?;

    if core.is_self(&responsible.address) {
        return Ok(core.store.exists(key) && !core.store.is_deleted(key));
    }

    let mut client = rpc_client::connect(&responsible.address, &core.config)
        .await
        .map_err(|e| RouterError::Internal(e.to_string()))?;
    let resp = client
        .get(proto::KeyMsg { key: key.to_string() })
        .await
        .map_err(|e| RouterError::Internal(e.to_string()))?;
    Ok(resp.into_inner().found)
}

pub async fn load(core: &Arc<NodeCore>, key: &str) -> Result<Vec<u8>, RouterError> {
    let responsible = responsible_for(core, key).await?;

    if core.is_self(&responsible.address) {
        return local_load(core, key);
    }

    match rpc_client::connect(&responsible.address, &core.config).await {
        Ok(mut client) => match client.get(proto::KeyMsg { key: key.to_string() }).await {
            Ok(resp) => {
                let msg = resp.into_inner();
                if msg.found {
                    Ok(msg.value)
                } else {
                    Err(RouterError::NotFound(key.to_string()))
                }
            }
            Err(status) => {
                warn!("load {key} from {}: {status}, trying local fallback", responsible.address);
                replica_fallback_load(core, key)
            }
        },
        Err(e) => {
            warn!("load {key}: {} unreachable ({e}), trying local fallback", responsible.address);
            replica_fallback_load(core, key)
        }
    }
}

fn local_load(core: &Arc<NodeCore>, key: &str) -> Result<Vec<u8>, RouterError> {
    if core.store.is_deleted(key) {
        return Err(RouterError::NotFound(key.to_string()));
    }
    core.store
        .get(key)
        .ok_or_else(|| RouterError::NotFound(key.to_string()))
}

/// Best-effort local lookup used only when the owning node couldn't be
/// reached: a live replica answers the read, but an empty local store says
/// nothing about whether the key truly exists — that's `Unavailable`, not
/// `NotFound`, since only the owner can give an authoritative negative.
fn replica_fallback_load(core: &Arc<NodeCore>, key: &str) -> Result<Vec<u8>, RouterError> {
    if let Some(value) = core.store.get(key) {
        return Ok(value);
    }
    if core.store.is_deleted(key) {
        Err(RouterError::NotFound(key.to_string()))
    } else {
        Err(RouterError::Unavailable(key.to_string()))
    }
}

pub async fn save(core: &Arc<NodeCore>, key: &str, value: Vec<u8>) -> Result<(), RouterError> {
    let responsible = responsible_for(core, key).await?;

    if core.is_self(&responsible.address) {
        let version = core.clock.now_ms();
        core.store.put_with_version(key, value, version);
        return Ok(());
    }

    match rpc_client::connect(&responsible.address, &core.config).await {
        Ok(mut client) => {
            match client
                .put(proto::KeyValueMsg {
                    key: key.to_string(),
                    value: value.clone(),
                })
                .await
            {
                Ok(_) => Ok(()),
                Err(status) => {
                    warn!("save {key} to {}: {status}, writing locally as fallback", responsible.address);
                    let version = core.clock.now_ms();
                    core.store.put_with_version(key, value, version);
                    Ok(())
                }
            }
        }
        Err(e) => {
            warn!("save {key}: {} unreachable ({e}), writing locally as fallback", responsible.address);
            let version = core.clock.now_ms();
            core.store.put_with_version(key, value, version);
            Ok(())
        }
    }
}

pub async fn delete(core: &Arc<NodeCore>, key: &str) -> Result<(), RouterError> {
    let responsible = responsible_for(core, key).await?;

    if core.is_self(&responsible.address) {
        let version = core.clock.now_ms();
        core.store.delete_with_version(key, version);
        return Ok(());
    }

    match rpc_client::connect(&responsible.address, &core.config).await {
        Ok(mut client) => {
            match client.delete(proto::KeyMsg { key: key.to_string() }).await {
                Ok(_) => Ok(()),
                Err(status) => {
                    warn!("delete {key} at {}: {status}, deleting locally as fallback", responsible.address);
                    let version = core.clock.now_ms();
                    core.store.delete_with_version(key, version);
                    Ok(())
                }
            }
        }
        Err(e) => {
            warn!("delete {key}: {} unreachable ({e}), deleting locally as fallback", responsible.address);
            let version = core.clock.now_ms();
            core.store.delete_with_version(key, version);
            Ok(())
        }
    }
}

async fn responsible_for(core: &Arc<NodeCore>, key: &str) -> Result<crate::node::NodeInfo, RouterError> {
    let id = hash_key(key, core.m_bits);
    core.find_successor(id)
        .await
        .map_err(|e| RouterError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::config::Config;
    use crate::store::LocalStore;
    use tempfile::NamedTempFile;

    fn single_node_core() -> Arc<NodeCore> {
        let self_info = crate::node::NodeInfo::new(1, "127.0.0.1:0");
        let config = Config::default();
        let file = NamedTempFile::new().unwrap();
        let store = Arc::new(LocalStore::new(file.path().to_path_buf()));
        NodeCore::new(self_info, config, false, store, Arc::new(Clock::new()))
    }

    #[tokio::test]
    async fn save_then_load_on_single_node_ring() {
        let core = single_node_core();
        save(&core, "hello", b"world".to_vec()).await.unwrap();
        assert_eq!(load(&core, "hello").await.unwrap(), b"world".to_vec());
        assert!(exists(&core, "hello").await.unwrap());
    }

    #[tokio::test]
    async fn load_missing_key_is_not_found() {
        let core = single_node_core();
        let err = load(&core, "missing").await.unwrap_err();
        assert!(matches!(err, RouterError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_then_load_is_not_found() {
        let core = single_node_core();
        save(&core, "k", b"v".to_vec()).await.unwrap();
        delete(&core, "k").await.unwrap();
        assert!(load(&core, "k").await.is_err());
        assert!(!exists(&core, "k").await.unwrap());
    }
}
