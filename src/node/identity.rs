use crate::hashing::NodeId;
use crate::proto;

pub type Address = String;

/// A node's position and reachability handle on the ring. Neighbors are
/// always held this way rather than as owning references — the ring is
/// cyclic, so a "dead pointer" is just a failed RPC to this address, not a
/// dangling reference to clean up.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub address: Address,
}

impl NodeInfo {
    pub fn new(id: NodeId, address: impl Into<Address>) -> Self {
        NodeInfo {
            id,
            address: address.into(),
        }
    }

    pub fn from_address(address: impl Into<Address>, m_bits: u32) -> Self {
        let address = address.into();
        let id = crate::hashing::hash_address(&address, m_bits);
        NodeInfo { id, address }
    }
}

impl From<NodeInfo> for proto::NodeInfo {
    fn from(n: NodeInfo) -> Self {
        proto::NodeInfo {
            id: n.id,
            address: n.address,
        }
    }
}

impl From<&NodeInfo> for proto::NodeInfo {
    fn from(n: &NodeInfo) -> Self {
        n.clone().into()
    }
}

impl From<proto::NodeInfo> for NodeInfo {
    fn from(n: proto::NodeInfo) -> Self {
        NodeInfo {
            id: n.id,
            address: n.address,
        }
    }
}
