//! Ring identifier hashing and modular-interval arithmetic.
//!
//! Ring identifiers are the low 64 bits of `SHA1(address)`, reduced modulo
//! `2^m_bits`. `m_bits` above 64 isn't representable by this type; see
//! `node::identity` for where that's enforced.

use sha1::{Digest, Sha1};

pub type NodeId = u64;

/// `SHA1(address) mod 2^m_bits`, per §3 of the spec.
pub fn hash_address(address: &str, m_bits: u32) -> NodeId {
    hash_bytes(address.as_bytes(), m_bits)
}

pub fn hash_key(key: &str, m_bits: u32) -> NodeId {
    hash_bytes(key.as_bytes(), m_bits)
}

fn hash_bytes(bytes: &[u8], m_bits: u32) -> NodeId {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();

    let mut low8 = [0u8; 8];
    low8.copy_from_slice(&digest[0..8]);
    let full = u64::from_be_bytes(low8);

    reduce(full, m_bits)
}

/// Reduces `value` modulo `2^m_bits`, tolerating `m_bits == 64` (where
/// `1u64 << 64` would overflow) by treating it as "no reduction needed".
pub fn reduce(value: u64, m_bits: u32) -> NodeId {
    if m_bits >= 64 {
        value
    } else {
        value % (1u64 << m_bits)
    }
}

/// `(self.id + 2^i) mod 2^m_bits`, the start of finger table entry `i`.
pub fn finger_start(origin: NodeId, index: u32, m_bits: u32) -> NodeId {
    let offset = if index >= 64 { 0 } else { 1u64 << index };
    reduce(origin.wrapping_add(offset), m_bits)
}

/// Returns true iff `x` lies in the modular interval between `lower` and
/// `upper`, with each endpoint's inclusion controlled independently. This is
/// the single arbiter of interval membership used by `find_successor`,
/// `closest_preceding_finger`, and the replicator's ownership scan — the
/// spec's open question about the `self.id` boundary is resolved by routing
/// every interval check through here rather than duplicating the logic.
pub fn is_between(
    x: NodeId,
    lower: NodeId,
    upper: NodeId,
    lower_inclusive: bool,
    upper_inclusive: bool,
) -> bool {
    if lower == upper {
        // The whole ring except for the (possibly included) single point.
        let touches_point = x == lower;
        return if lower_inclusive || upper_inclusive {
            true
        } else {
            !touches_point
        };
    }

    let in_range = if lower < upper {
        x > lower && x < upper
    } else {
        x > lower || x < upper
    };

    (in_range) || (lower_inclusive && x == lower) || (upper_inclusive && x == upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_bounded() {
        let m_bits = 8;
        let a = hash_address("127.0.0.1:5000", m_bits);
        let b = hash_address("127.0.0.1:5000", m_bits);
        assert_eq!(a, b);
        assert!(a < 256);
    }

    #[test]
    fn different_addresses_usually_hash_differently() {
        let m_bits = 32;
        let a = hash_address("127.0.0.1:5000", m_bits);
        let b = hash_address("127.0.0.1:5001", m_bits);
        assert_ne!(a, b);
    }

    #[test]
    fn is_between_non_wrapping_half_open() {
        // (10, 20]
        assert!(!is_between(10, 10, 20, false, true));
        assert!(is_between(15, 10, 20, false, true));
        assert!(is_between(20, 10, 20, false, true));
        assert!(!is_between(21, 10, 20, false, true));
    }

    #[test]
    fn is_between_wrapping_interval() {
        // (250, 5) on an 8-bit ring: wraps past 255 back to 0
        assert!(is_between(252, 250, 5, false, false));
        assert!(is_between(2, 250, 5, false, false));
        assert!(!is_between(10, 250, 5, false, false));
    }

    #[test]
    fn is_between_single_node_ring() {
        // lower == upper == self.id: everything but self is "between" when
        // both ends are exclusive (used for closest_preceding_finger on a
        // one-node ring, where no finger should ever qualify).
        assert!(!is_between(7, 7, 7, false, false));
        assert!(is_between(3, 7, 7, false, false));
    }

    #[test]
    fn finger_start_wraps_modularly() {
        assert_eq!(finger_start(250, 3, 8), (250u64 + 8) % 256);
    }
}
