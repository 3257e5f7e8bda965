//! The last-writer-wins merge rule, shared by `SetPartition`, `ResolveData`,
//! and per-key push replication so there is exactly one place that decides
//! which of two conflicting writes survives.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: Option<Vec<u8>>,
    pub version: i64,
    pub deleted: bool,
}

impl Record {
    pub fn live(value: Vec<u8>, version: i64) -> Self {
        Record {
            value: Some(value),
            version,
            deleted: false,
        }
    }

    pub fn tombstone(version: i64) -> Self {
        Record {
            value: None,
            version,
            deleted: true,
        }
    }
}

/// Picks the winner between `local` and `remote`. Higher version wins
/// outright. On an exact tie, a live value beats a tombstone (a concurrent
/// put and delete resolve in favor of the put), and if both sides are the
/// same kind, `local` wins — an arbitrary but stable choice that avoids
/// needless churn when two replicas agree up to the version number.
pub fn merge<'a>(local: &'a Record, remote: &'a Record) -> &'a Record {
    if local.version != remote.version {
        return if local.version > remote.version {
            local
        } else {
            remote
        };
    }

    match (local.deleted, remote.deleted) {
        (false, true) => local,
        (true, false) => remote,
        _ => local,
    }
}

/// True if merging `remote` into `local` would change `local`'s state.
pub fn remote_wins(local: &Record, remote: &Record) -> bool {
    std::ptr::eq(merge(local, remote), remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_version_always_wins() {
        let local = Record::live(b"old".to_vec(), 1);
        let remote = Record::live(b"new".to_vec(), 2);
        assert_eq!(merge(&local, &remote), &remote);
        assert_eq!(merge(&remote, &local), &remote);
    }

    #[test]
    fn tie_prefers_live_value_over_tombstone() {
        let live = Record::live(b"v".to_vec(), 5);
        let dead = Record::tombstone(5);
        assert_eq!(merge(&live, &dead), &live);
        assert_eq!(merge(&dead, &live), &live);
    }

    #[test]
    fn tie_between_equals_prefers_local() {
        let local = Record::live(b"v".to_vec(), 5);
        let remote = Record::live(b"v".to_vec(), 5);
        assert_eq!(merge(&local, &remote), &local);
    }

    #[test]
    fn remote_wins_reports_correctly() {
        let local = Record::live(b"old".to_vec(), 1);
        let remote = Record::live(b"new".to_vec(), 2);
        assert!(remote_wins(&local, &remote));
        assert!(!remote_wins(&remote, &local));
    }
}
