use crate::hashing::{finger_start, NodeId};
use crate::node::identity::NodeInfo;

/// The Chord finger table. `entries[i]` is this node's best current guess at
/// the successor of `(self.id + 2^i) mod 2^m_bits`. `entries[0]` is the
/// immediate successor and is sacred: every other routing invariant in the
/// system derives from it being correct.
#[derive(Debug, Clone)]
pub struct FingerTable {
    pub entries: Vec<NodeInfo>,
}

impl FingerTable {
    /// A brand-new finger table with every entry pointing at `self` — the
    /// state of a freshly created one-node ring.
    pub fn new_self_ring(self_info: &NodeInfo, m_bits: u32) -> Self {
        let entries = (0..m_bits).map(|_| self_info.clone()).collect();
        FingerTable { entries }
    }

    pub fn m_bits(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn successor(&self) -> &NodeInfo {
        &self.entries[0]
    }

    pub fn set_successor(&mut self, node: NodeInfo) {
        self.entries[0] = node;
    }

    pub fn start_of(&self, origin: NodeId, index: usize) -> NodeId {
        finger_start(origin, index as u32, self.m_bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_self_ring_points_everywhere_at_self() {
        let me = NodeInfo::new(42, "127.0.0.1:9000");
        let table = FingerTable::new_self_ring(&me, 8);
        assert_eq!(table.entries.len(), 8);
        assert!(table.entries.iter().all(|e| e == &me));
        assert_eq!(table.successor(), &me);
    }
}
