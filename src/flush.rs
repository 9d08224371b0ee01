//! Flush policy configuration for view accessors.
//!
//! Controls when writes through a read-write accessor are flushed to the
//! backing store in addition to the flush every accessor performs on dispose.

use std::sync::atomic::{AtomicU64, Ordering};

/// Policy controlling when to flush dirty pages to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Flush only on explicit `flush()` and on dispose.
    #[default]
    Manual,
    /// Flush after every write call.
    Always,
    /// Flush when at least N bytes have been written since the last flush.
    EveryBytes(u64),
    /// Flush after every W write calls.
    EveryWrites(u64),
}

/// Counts writes since the last flush and decides when the policy is due.
#[derive(Debug, Default)]
pub(crate) struct FlushTracker {
    policy: FlushPolicy,
    bytes: AtomicU64,
    writes: AtomicU64,
}

impl FlushTracker {
    pub(crate) fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            bytes: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Record a write of `len` bytes; returns true if a flush is now due.
    pub(crate) fn record(&self, len: u64) -> bool {
        let bytes = self.bytes.fetch_add(len, Ordering::Relaxed) + len;
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        match self.policy {
            FlushPolicy::Manual => false,
            FlushPolicy::Always => true,
            FlushPolicy::EveryBytes(n) => n > 0 && bytes >= n,
            FlushPolicy::EveryWrites(n) => n > 0 && writes >= n,
        }
    }

    /// Forget pending writes after a successful flush.
    pub(crate) fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    /// Bytes written since the last flush.
    pub(crate) fn pending_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
