//! Anti-entropy and replication: push writes to the K-1 successors that
//! hold replicas, pull from them on join and periodically after, hand data
//! off to a new predecessor, and drop replicas this node is no longer
//! responsible for. Grounded in the system's replicator loop: a
//! fixed-interval background task that runs an aggressive one-time sync on
//! startup, then alternates push replication with a less frequent ownership
//! scan.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;

use crate::hashing::hash_key;
use crate::lww::{self, Record};
use crate::node::{NodeCore, NodeInfo};
use crate::proto;
use crate::rpc_client;
use crate::store::{base_key_from_meta, meta_del_key, meta_ver_key, LocalStore};

const RESOLVE_EVERY_N_CYCLES: u32 = 5;

pub async fn run(core: Arc<NodeCore>) {
    tokio::time::sleep(core.config.replication_interval).await;

    if let Err(e) = initial_sync(&core).await {
        warn!("initial sync failed: {e}");
    }

    let mut interval = tokio::time::interval(core.config.replication_interval);
    let mut cycle = 0u32;
    loop {
        interval.tick().await;
        replicate_data(&core).await;

        cycle += 1;
        if cycle >= RESOLVE_EVERY_N_CYCLES {
            resolve_replicas(&core).await;
            cycle = 0;
        }
    }
}

/// Walks the ring starting at this node's immediate successor, returning up
/// to `count` distinct nodes reached by repeated `FindSuccessor(id+1)`
/// calls. Keeps walking past unreachable hops when possible so a single dead
/// node doesn't shrink the replica set more than necessary.
pub async fn get_successor_list(core: &Arc<NodeCore>, count: usize) -> Vec<NodeInfo> {
    let mut successors = Vec::new();
    let mut current = core.successor();
    if core.is_self(&current.address) {
        return successors;
    }

    if ping(core, &current).await {
        successors.push(current.clone());
    }

    let max_attempts = count * 4;
    for _ in 0..max_attempts {
        if successors.len() >= count {
            break;
        }
        if core.is_self(&current.address) {
            break;
        }

        let next_id = crate::hashing::reduce(current.id.wrapping_add(1), core.m_bits);
        let next = match rpc_client::connect(&current.address, &core.config).await {
            Ok(mut client) => match client.find_successor(proto::IdMsg { id: next_id }).await {
                Ok(resp) => NodeInfo::from(resp.into_inner()),
                Err(_) => break,
            },
            Err(_) => break,
        };

        if next.address == core.address() {
            break;
        }
        if !successors.iter().any(|s: &NodeInfo| s.address == next.address) && ping(core, &next).await {
            successors.push(next.clone());
        }
        current = next;
    }

    successors
}

async fn ping(core: &Arc<NodeCore>, node: &NodeInfo) -> bool {
    if core.is_self(&node.address) {
        return true;
    }
    match rpc_client::connect(&node.address, &core.config).await {
        Ok(mut client) => client.ping(proto::Empty {}).await.is_ok(),
        Err(_) => false,
    }
}

async fn remote_meta_int(core: &Arc<NodeCore>, node: &NodeInfo, key: &str) -> Option<i64> {
    let mut client = rpc_client::connect(&node.address, &core.config).await.ok()?;
    let resp = client.get(proto::KeyMsg { key: key.to_string() }).await.ok()?;
    let msg = resp.into_inner();
    if !msg.found {
        return Some(0);
    }
    String::from_utf8(msg.value).ok()?.parse().ok()
}

async fn replicate_data(core: &Arc<NodeCore>) {
    let successors = get_successor_list(core, core.config.replication_k.saturating_sub(1)).await;
    if successors.is_empty() {
        return;
    }

    let base_keys = core.store.base_keys();
    let tombstones = core.store.tombstoned_keys();

    if base_keys.is_empty() && tombstones.is_empty() {
        return;
    }

    for successor in &successors {
        let mut ok = 0u32;
        let mut failed = 0u32;
        for key in base_keys.iter().chain(tombstones.iter()) {
            match replicate_key_to_node(core, successor, key).await {
                Ok(()) => ok += 1,
                Err(e) => {
                    warn!("replicate {key} to {}: {e}", successor.address);
                    failed += 1;
                }
            }
        }
        if failed == 0 {
            info!("replicated {ok} items to {}", successor.address);
        } else {
            warn!("replicated {ok} items to {} with {failed} failures", successor.address);
        }
    }
}

async fn replicate_key_to_node(core: &Arc<NodeCore>, node: &NodeInfo, key: &str) -> anyhow::Result<()> {
    let local = local_record(&core.store, key);

    let remote_ver = remote_meta_int(core, node, &meta_ver_key(key)).await;
    let remote_del = remote_meta_int(core, node, &meta_del_key(key)).await;
    let remote = Record {
        value: None,
        version: remote_ver.unwrap_or(0),
        deleted: remote_del.unwrap_or(0) != 0,
    };

    if !lww::remote_wins(&remote, &local) {
        return Ok(());
    }

    let mut client = rpc_client::connect(&node.address, &core.config).await?;
    if local.deleted {
        let _ = client.delete(proto::KeyMsg { key: key.to_string() }).await;
        client
            .put(proto::KeyValueMsg {
                key: meta_del_key(key),
                value: local.version.to_string().into_bytes(),
            })
            .await?;
        let _ = client.delete(proto::KeyMsg { key: meta_ver_key(key) }).await;
    } else if let Some(value) = local.value {
        client
            .put(proto::KeyValueMsg {
                key: key.to_string(),
                value,
            })
            .await?;
        client
            .put(proto::KeyValueMsg {
                key: meta_ver_key(key),
                value: local.version.to_string().into_bytes(),
            })
            .await?;
        let _ = client.delete(proto::KeyMsg { key: meta_del_key(key) }).await;
    }
    Ok(())
}

fn local_record(store: &LocalStore, key: &str) -> Record {
    if store.is_deleted(key) {
        Record::tombstone(store.deleted_version(key))
    } else {
        match store.get(key) {
            Some(value) => Record::live(value, store.version_of(key)),
            None => Record::tombstone(0),
        }
    }
}

/// Scans locally-held application keys and hands off any this node is no
/// longer responsible for (and isn't keeping as a replica) to whoever is.
async fn resolve_replicas(core: &Arc<NodeCore>) {
    let keys = core.store.base_keys();
    let mut to_transfer = Vec::new();

    for key in keys {
        let id = hash_key(&key, core.m_bits);
        let responsible = match core.find_successor(id).await {
            Ok(n) => n,
            Err(_) => continue,
        };
        if responsible.address == core.address() {
            continue;
        }
        if !should_keep_replica(core, &responsible).await {
            to_transfer.push((key, responsible));
        }
    }

    for (key, target) in to_transfer {
        let Some(value) = core.store.get(&key) else { continue };
        if let Ok(mut client) = rpc_client::connect(&target.address, &core.config).await {
            let _ = client
                .put(proto::KeyValueMsg {
                    key: key.clone(),
                    value,
                })
                .await;
            let ver = core.store.version_of(&key);
            if ver > 0 {
                let _ = client
                    .put(proto::KeyValueMsg {
                        key: meta_ver_key(&key),
                        value: ver.to_string().into_bytes(),
                    })
                    .await;
            }
            let _ = client.delete(proto::KeyMsg { key: meta_del_key(&key) }).await;
            core.store.delete(&key);
            info!("handed off {key} to {}", target.address);
        }
    }
}

/// True if this node sits within the first `replication_k` successors of
/// `responsible`, i.e. it's a legitimate replica holder rather than a key
/// it should have already shed.
async fn should_keep_replica(core: &Arc<NodeCore>, responsible: &NodeInfo) -> bool {
    if responsible.address == core.address() {
        return true;
    }
    let mut current = responsible.clone();
    for _ in 0..core.config.replication_k.saturating_sub(1) {
        let next_id = crate::hashing::reduce(current.id.wrapping_add(1), core.m_bits);
        let next = match rpc_client::connect(&current.address, &core.config).await {
            Ok(mut client) => match client.find_successor(proto::IdMsg { id: next_id }).await {
                Ok(resp) => NodeInfo::from(resp.into_inner()),
                Err(_) => return false,
            },
            Err(_) => return false,
        };
        if next.address == core.address() {
            return true;
        }
        if next.address == responsible.address {
            return false;
        }
        current = next;
    }
    false
}

async fn fetch_all_keys(core: &Arc<NodeCore>, address: &str) -> anyhow::Result<HashMap<String, Vec<u8>>> {
    let mut client = rpc_client::connect(address, &core.config).await?;
    let resp = client.get_all_keys(proto::Empty {}).await?;
    Ok(resp
        .into_inner()
        .items
        .into_iter()
        .map(|kv| (kv.key, kv.value))
        .collect())
}

fn split_payload(payload: HashMap<String, Vec<u8>>) -> (HashMap<String, Vec<u8>>, HashMap<String, i64>, HashMap<String, i64>) {
    let mut values = HashMap::new();
    let mut versions = HashMap::new();
    let mut removed = HashMap::new();

    for (key, value) in payload {
        if let Some(base) = base_key_from_meta(&key) {
            let n = String::from_utf8(value).ok().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
            if key.starts_with("__meta_ver__") {
                versions.insert(base.to_string(), n);
            } else {
                removed.insert(base.to_string(), n);
            }
        } else {
            values.insert(key, value);
        }
    }
    (values, versions, removed)
}

/// Applies an incoming partition using LWW: an incoming write or tombstone
/// is accepted only if it beats what's already stored locally. This is the
/// shared engine behind the `SetPartition` RPC and the periodic
/// anti-entropy pull — accepting data always, never rejecting a whole
/// partition because part of it lost the merge.
pub fn apply_partition(
    core: &Arc<NodeCore>,
    values: HashMap<String, Vec<u8>>,
    versions: HashMap<String, i64>,
    removed: HashMap<String, i64>,
) {
    let store = &core.store;

    removed.into_par_iter().for_each(|(key, del_ver)| {
        let local = local_record(store, &key);
        let incoming = Record::tombstone(del_ver);
        if lww::remote_wins(&local, &incoming) {
            store.delete_with_version(&key, del_ver);
        }
    });

    values.into_par_iter().for_each(|(key, value)| {
        let version = *versions.get(&key).unwrap_or(&0);
        let local = local_record(store, &key);
        let incoming = Record::live(value.clone(), version);
        if lww::remote_wins(&local, &incoming) {
            store.put_with_version(&key, value, version);
        }
    });
}

/// Resolves `values`/`versions`/`removed` against local state and returns
/// the partition the caller should adopt, applying the losing side locally
/// at the same time. Used by the `ResolveData` RPC when a predecessor is
/// handing its dataset off to this node during the join protocol.
pub fn resolve_data(
    core: &Arc<NodeCore>,
    values: HashMap<String, Vec<u8>>,
    versions: HashMap<String, i64>,
    removed: HashMap<String, i64>,
) -> (HashMap<String, Vec<u8>>, HashMap<String, i64>, HashMap<String, i64>) {
    let store = &core.store;
    let mut res_values = HashMap::new();
    let mut res_versions = HashMap::new();
    let mut res_removed = HashMap::new();

    for (key, incoming_val) in values {
        let inc_ver = *versions.get(&key).unwrap_or(&0);
        let local = local_record(store, &key);
        let incoming = Record::live(incoming_val.clone(), inc_ver);

        if lww::remote_wins(&local, &incoming) {
            store.put_with_version(&key, incoming_val, inc_ver);
        } else if local.deleted {
            res_removed.insert(key, local.version);
        } else if let Some(value) = local.value {
            res_values.insert(key.clone(), value);
            res_versions.insert(key, local.version);
        }
    }

    for (key, inc_del) in removed {
        let local = local_record(store, &key);
        let incoming = Record::tombstone(inc_del);

        if lww::remote_wins(&local, &incoming) {
            store.delete_with_version(&key, inc_del);
        } else if local.deleted {
            res_removed.insert(key, local.version);
        } else if let Some(value) = local.value {
            res_values.insert(key.clone(), value);
            res_versions.insert(key, local.version);
        }
    }

    (res_values, res_versions, res_removed)
}

/// Calls `ResolveData` on `predecessor` with this node's whole dataset and
/// keeps only whatever the predecessor says we should keep — the mechanism
/// by which a node that's losing ownership of a key range sheds data to its
/// new neighbor rather than waiting for the next ownership scan.
pub async fn delegate_to_predecessor(core: &Arc<NodeCore>, predecessor: &NodeInfo) -> anyhow::Result<()> {
    if core.is_self(&predecessor.address) {
        return Ok(());
    }
    let (values, versions, removed) = local_partition(core);
    let mut client = rpc_client::connect(&predecessor.address, &core.config).await?;
    let resp = client
        .resolve_data(proto::PartitionMsg {
            values,
            versions,
            removed,
        })
        .await?
        .into_inner();

    if resp.ok {
        if let Some(partition) = resp.partition {
            apply_partition(core, partition.values, partition.versions, partition.removed);
        }
    }
    Ok(())
}

fn local_partition(core: &Arc<NodeCore>) -> (HashMap<String, Vec<u8>>, HashMap<String, i64>, HashMap<String, i64>) {
    let mut values = HashMap::new();
    let mut versions = HashMap::new();
    let mut removed = HashMap::new();

    for key in core.store.base_keys() {
        if let Some(value) = core.store.get(&key) {
            versions.insert(key.clone(), core.store.version_of(&key));
            values.insert(key, value);
        }
    }
    for key in core.store.tombstoned_keys() {
        removed.insert(key.clone(), core.store.deleted_version(&key));
    }
    (values, versions, removed)
}

/// Aggressively pulls data from every reachable neighbor at join time:
/// alive successors, the predecessor, and the predecessors of the first two
/// successors. Everything fetched is filtered down to keys this node should
/// actually own or replicate before being merged in.
async fn initial_sync(core: &Arc<NodeCore>) -> anyhow::Result<()> {
    info!("starting initial replication sync");
    let mut addresses = std::collections::HashSet::new();

    let successors = get_successor_list(core, core.config.replication_k).await;
    for s in &successors {
        if s.address != core.address() {
            addresses.insert(s.address.clone());
        }
    }
    if let Some(pred) = core.predecessor() {
        if pred.address != core.address() {
            addresses.insert(pred.address.clone());
        }
    }
    for succ in successors.iter().take(2) {
        if let Ok(mut client) = rpc_client::connect(&succ.address, &core.config).await {
            if let Ok(resp) = client.get_predecessor(proto::Empty {}).await {
                let pred: NodeInfo = resp.into_inner().into();
                if !pred.address.is_empty() && pred.address != core.address() && pred.address != succ.address {
                    addresses.insert(pred.address);
                }
            }
        }
    }

    let mut all_values: HashMap<String, Vec<u8>> = HashMap::new();
    let mut all_versions: HashMap<String, i64> = HashMap::new();
    let mut all_removed: HashMap<String, i64> = HashMap::new();

    for address in &addresses {
        match fetch_all_keys(core, address).await {
            Ok(payload) => {
                let (values, versions, removed) = split_payload(payload);
                for (k, v) in versions {
                    let slot = all_versions.entry(k).or_insert(0);
                    if v > *slot {
                        *slot = v;
                    }
                }
                for (k, v) in removed {
                    let slot = all_removed.entry(k).or_insert(0);
                    if v > *slot {
                        *slot = v;
                    }
                }
                for (k, v) in values {
                    all_values.entry(k).or_insert(v);
                }
            }
            Err(e) => warn!("initial sync: fetch from {address} failed: {e}"),
        }
    }

    let mut filtered_values = HashMap::new();
    let mut filtered_versions = HashMap::new();
    for (key, value) in all_values {
        let id = hash_key(&key, core.m_bits);
        let responsible = core.find_successor(id).await?;
        let keep = responsible.address == core.address() || should_keep_replica(core, &responsible).await;
        if keep {
            if let Some(v) = all_versions.get(&key) {
                filtered_versions.insert(key.clone(), *v);
            }
            filtered_values.insert(key, value);
        }
    }

    let mut filtered_removed = HashMap::new();
    for (key, ver) in all_removed {
        let id = hash_key(&key, core.m_bits);
        let responsible = core.find_successor(id).await?;
        if responsible.address == core.address() {
            filtered_removed.insert(key, ver);
        }
    }

    let acquired = filtered_values.len() + filtered_removed.len();
    if acquired > 0 {
        apply_partition(core, filtered_values, filtered_versions, filtered_removed);
    }
    info!("initial sync complete, acquired {acquired} items");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_payload_separates_meta_from_values() {
        let mut payload = HashMap::new();
        payload.insert("k".to_string(), b"v".to_vec());
        payload.insert("__meta_ver__k".to_string(), b"5".to_vec());
        payload.insert("__meta_del__k".to_string(), b"0".to_vec());

        let (values, versions, removed) = split_payload(payload);
        assert_eq!(values.get("k"), Some(&b"v".to_vec()));
        assert_eq!(versions.get("k"), Some(&5));
        assert_eq!(removed.get("k"), Some(&0));
    }
}
