//! Logical wall-clock used for LWW version stamps. Versions need to be
//! comparable across nodes with independently drifting system clocks, so
//! `Timer` (Berkeley algorithm, `timer.rs`) periodically nudges every node's
//! offset toward the group average rather than trusting raw local time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub struct Clock {
    offset_ms: AtomicI64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            offset_ms: AtomicI64::new(0),
        }
    }

    /// Current time in milliseconds since the epoch, adjusted by the
    /// Berkeley offset. This is the value used to stamp new LWW versions.
    pub fn now_ms(&self) -> i64 {
        system_time_ms() + self.offset_ms.load(Ordering::SeqCst)
    }

    /// Shifts this node's clock by `delta_ms`, as computed by the Berkeley
    /// coordinator run. Accumulates rather than replaces, matching repeated
    /// small corrections converging over several rounds instead of one
    /// node's estimate stomping the last.
    pub fn apply_offset(&self, delta_ms: i64) {
        self.offset_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::SeqCst)
    }
}

fn system_time_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_shifts_now_ms() {
        let clock = Clock::new();
        let before = clock.now_ms();
        clock.apply_offset(10_000);
        let after = clock.now_ms();
        assert!(after - before >= 9_900);
    }

    #[test]
    fn offsets_accumulate() {
        let clock = Clock::new();
        clock.apply_offset(100);
        clock.apply_offset(-30);
        assert_eq!(clock.offset_ms(), 70);
    }
}
