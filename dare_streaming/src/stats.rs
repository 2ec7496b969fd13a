use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the streaming worker
#[derive(Debug, Default)]
pub struct StreamingStats {
    pub(crate) requests_executed: AtomicU64,
    pub(crate) invalid_requests: AtomicU64,
    pub(crate) batches_submitted: AtomicU64,
    pub(crate) ring_allocations: AtomicU64,
    pub(crate) temp_allocations: AtomicU64,
    pub(crate) placeholder_substitutions: AtomicU64,
}

/// Point in time copy of [`StreamingStats`]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests_executed: u64,
    pub invalid_requests: u64,
    pub batches_submitted: u64,
    /// Staging allocations served by a resource set's staging buffer
    pub ring_allocations: u64,
    /// Staging allocations that needed a dedicated buffer
    pub temp_allocations: u64,
    pub placeholder_substitutions: u64,
}

impl StreamingStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_executed: self.requests_executed.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            batches_submitted: self.batches_submitted.load(Ordering::Relaxed),
            ring_allocations: self.ring_allocations.load(Ordering::Relaxed),
            temp_allocations: self.temp_allocations.load(Ordering::Relaxed),
            placeholder_substitutions: self.placeholder_substitutions.load(Ordering::Relaxed),
        }
    }
}
