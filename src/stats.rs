//! Process-wide memory gauges.
//!
//! Every allocator instance reports into the same two counters, so a
//! process with per-thread pools still has one place to ask how much
//! memory the pools are sitting on. Updates are relaxed and uncoordinated;
//! reads clamp at zero rather than trusting a transiently interleaved
//! release to stay non-negative.

use std::sync::atomic::{AtomicIsize, Ordering};

/// Gauge that saturates at zero on read.
pub(crate) struct Counter(AtomicIsize);

impl Counter {
    pub(crate) const fn new() -> Self {
        Self(AtomicIsize::new(0))
    }

    pub(crate) fn add(&self, bytes: usize) {
        self.0.fetch_add(bytes as isize, Ordering::Relaxed);
    }

    pub(crate) fn sub(&self, bytes: usize) {
        self.0.fetch_sub(bytes as isize, Ordering::Relaxed);
    }

    pub(crate) fn load(&self, order: Ordering) -> usize {
        self.0.load(order).max(0) as usize
    }
}

/// Bytes currently held in pool regions across every live allocator.
pub(crate) static POOL_HEAP_BYTES: Counter = Counter::new();

/// Bytes currently held by live oversized allocations.
pub(crate) static OVERSIZED_BYTES: Counter = Counter::new();

/// Snapshot of the process-wide gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Bytes currently held in pool regions across every live allocator.
    pub pool_heap_bytes: usize,
    /// Bytes currently held by live oversized allocations.
    pub oversized_bytes: usize,
}

/// Read the process-wide gauges.
///
/// The value is a best-effort snapshot: allocators update the gauges
/// independently, so a reading taken while other threads allocate can mix
/// before/after states.
#[must_use]
pub fn snapshot() -> ProcessStats {
    ProcessStats {
        pool_heap_bytes: POOL_HEAP_BYTES.load(Ordering::Relaxed),
        oversized_bytes: OVERSIZED_BYTES.load(Ordering::Relaxed),
    }
}
