use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a [`FirehoseHook`](crate::hook::FirehoseHook).
#[derive(Debug, Default)]
pub struct HookStats {
    /// Entries passed to `fire`.
    pub fired: AtomicU64,
    /// Entries accepted by the queue.
    pub enqueued: AtomicU64,
    /// Entries dropped because the queue was full or the loop was gone.
    pub dropped: AtomicU64,
    /// Records accepted by the delivery stream.
    pub delivered: AtomicU64,
    /// Records lost to encoding, delivery or timeout failures.
    pub failed: AtomicU64,
    /// `PutRecordBatch` calls issued.
    pub batches: AtomicU64,
}

/// Point-in-time copy of [`HookStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub fired: u64,
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
    pub batches: u64,
}

impl HookStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fired: self.fired.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}
