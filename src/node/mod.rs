pub mod finger_table;
pub mod identity;

use std::sync::{Arc, Mutex};

use log::warn;

use crate::clock::Clock;
use crate::config::Config;
use crate::hashing::{is_between, NodeId};
use crate::proto;
use crate::rpc_client;
use crate::store::LocalStore;

pub use finger_table::FingerTable;
pub use identity::{Address, NodeInfo};

/// Shared state for this process's ring membership: identity, finger table,
/// predecessor pointer, local storage and clock. Every background
/// collaborator (stabilizer, replicator, discoverer, timer) and the gRPC
/// service hold an `Arc<NodeCore>` and read or mutate it under its internal
/// locks — there is deliberately no single "god lock" covering all of it, so
/// a stabilize pass and a replication pass never block each other.
pub struct NodeCore {
    pub self_info: NodeInfo,
    pub m_bits: u32,
    pub config: Config,
    pub dev_mode: bool,
    pub store: Arc<LocalStore>,
    pub clock: Arc<Clock>,
    finger: Mutex<FingerTable>,
    predecessor: Mutex<Option<NodeInfo>>,
}

impl NodeCore {
    pub fn new(
        self_info: NodeInfo,
        config: Config,
        dev_mode: bool,
        store: Arc<LocalStore>,
        clock: Arc<Clock>,
    ) -> Arc<Self> {
        let m_bits = config.m_bits;
        let finger = Mutex::new(FingerTable::new_self_ring(&self_info, m_bits));
        Arc::new(NodeCore {
            self_info,
            m_bits,
            config,
            dev_mode,
            store,
            clock,
            finger,
            predecessor: Mutex::new(None),
        })
    }

    pub fn id(&self) -> NodeId {
        self.self_info.id
    }

    pub fn address(&self) -> &str {
        &self.self_info.address
    }

    pub fn is_self(&self, address: &str) -> bool {
        address == self.self_info.address
    }

    pub fn successor(&self) -> NodeInfo {
        self.finger.lock().unwrap().successor().clone()
    }

    pub fn set_successor(&self, node: NodeInfo) {
        self.finger.lock().unwrap().set_successor(node);
    }

    pub fn finger_snapshot(&self) -> Vec<NodeInfo> {
        self.finger.lock().unwrap().entries.clone()
    }

    pub fn set_finger(&self, index: usize, node: NodeInfo) {
        self.finger.lock().unwrap().entries[index] = node;
    }

    pub fn set_fingers(&self, entries: Vec<NodeInfo>) {
        self.finger.lock().unwrap().entries = entries;
    }

    pub fn predecessor(&self) -> Option<NodeInfo> {
        self.predecessor.lock().unwrap().clone()
    }

    pub fn set_predecessor(&self, node: Option<NodeInfo>) {
        *self.predecessor.lock().unwrap() = node;
    }

    /// The best finger this node knows of that sits strictly between itself
    /// and `id`, searched from the farthest-reaching finger down so routing
    /// makes the largest possible jump each hop.
    pub fn closest_preceding_finger(&self, id: NodeId) -> NodeInfo {
        let fingers = self.finger_snapshot();
        for finger in fingers.iter().rev() {
            if is_between(finger.id, self.id(), id, false, false) {
                return finger.clone();
            }
        }
        self.self_info.clone()
    }

    /// Resolves the node responsible for `id`. If `id` falls in
    /// `(self.id, successor.id]` the answer is the immediate successor;
    /// otherwise the query is forwarded by RPC to the closest preceding
    /// finger, which resolves it the same way — each hop is one RPC, and the
    /// recursion bottoms out at the node whose successor covers `id`.
    pub async fn find_successor(&self, id: NodeId) -> anyhow::Result<NodeInfo> {
        let successor = self.successor();
        if is_between(id, self.id(), successor.id, false, true) {
            return Ok(successor);
        }

        let next = self.closest_preceding_finger(id);
        if next.id == self.id() || next.address == self.address() {
            // No finger strictly closer than ourselves: our successor is the
            // best answer we have, even though it doesn't formally cover id.
            return Ok(successor);
        }

        match rpc_client::connect(&next.address, &self.config).await {
            Ok(mut client) => {
                match client.find_successor(proto::IdMsg { id }).await {
                    Ok(resp) => Ok(resp.into_inner().into()),
                    Err(status) => {
                        warn!("find_successor hop to {} failed: {status}", next.address);
                        Ok(successor)
                    }
                }
            }
            Err(e) => {
                warn!("find_successor hop to {} unreachable: {e}", next.address);
                Ok(successor)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn core(id: NodeId, m_bits: u32) -> Arc<NodeCore> {
        let self_info = NodeInfo::new(id, "127.0.0.1:0");
        let mut config = Config::default();
        config.m_bits = m_bits;
        let file = NamedTempFile::new().unwrap();
        let store = Arc::new(LocalStore::new(file.path().to_path_buf()));
        NodeCore::new(self_info, config, false, store, Arc::new(Clock::new()))
    }

    #[test]
    fn fresh_node_is_its_own_successor_and_predecessor_none() {
        let node = core(10, 8);
        assert_eq!(node.successor().id, 10);
        assert!(node.predecessor().is_none());
    }

    #[test]
    fn closest_preceding_finger_falls_back_to_self_on_one_node_ring() {
        let node = core(10, 8);
        let finger = node.closest_preceding_finger(50);
        assert_eq!(finger.id, 10);
    }

    #[tokio::test]
    async fn find_successor_answers_locally_when_id_covered_by_successor() {
        let node = core(10, 8);
        node.set_successor(NodeInfo::new(20, "127.0.0.1:1"));
        let result = node.find_successor(15).await.unwrap();
        assert_eq!(result.id, 20);
    }
}
