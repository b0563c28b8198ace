//! Atomic counters for engine observability.
//!
//! All counters use relaxed ordering; they are diagnostic, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global engine operation counters.
pub struct EngineMetrics {
    /// Units read straight from the handle (buffer windows empty).
    pub raw_reads: AtomicU64,
    /// Units written straight to the handle.
    pub raw_writes: AtomicU64,
    /// Facility decode calls.
    pub decode_calls: AtomicU64,
    /// Facility encode calls.
    pub encode_calls: AtomicU64,
    /// Conversions that ended in an error outcome.
    pub conversion_failures: AtomicU64,
    /// Pushbacks absorbed by the handle's own unget.
    pub handle_ungets: AtomicU64,
    /// Pushbacks that had to use the engine's putback cell.
    pub putback_cells: AtomicU64,
    /// Homing sequences written by endwrite.
    pub homing_sequences: AtomicU64,
    /// Bulk transfers that moved fewer units than requested.
    pub short_transfers: AtomicU64,
    /// Successful seeks (by offset or to a position).
    pub seeks: AtomicU64,
}

impl EngineMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw_reads: AtomicU64::new(0),
            raw_writes: AtomicU64::new(0),
            decode_calls: AtomicU64::new(0),
            encode_calls: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
            handle_ungets: AtomicU64::new(0),
            putback_cells: AtomicU64::new(0),
            homing_sequences: AtomicU64::new(0),
            short_transfers: AtomicU64::new(0),
            seeks: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            raw_reads: Self::get(&self.raw_reads),
            raw_writes: Self::get(&self.raw_writes),
            decode_calls: Self::get(&self.decode_calls),
            encode_calls: Self::get(&self.encode_calls),
            conversion_failures: Self::get(&self.conversion_failures),
            handle_ungets: Self::get(&self.handle_ungets),
            putback_cells: Self::get(&self.putback_cells),
            homing_sequences: Self::get(&self.homing_sequences),
            short_transfers: Self::get(&self.short_transfers),
            seeks: Self::get(&self.seeks),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub raw_reads: u64,
    pub raw_writes: u64,
    pub decode_calls: u64,
    pub encode_calls: u64,
    pub conversion_failures: u64,
    pub handle_ungets: u64,
    pub putback_cells: u64,
    pub homing_sequences: u64,
    pub short_transfers: u64,
    pub seeks: u64,
}

impl MetricsSnapshot {
    /// Named counter values, in declaration order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, u64); 10] {
        [
            ("raw_reads", self.raw_reads),
            ("raw_writes", self.raw_writes),
            ("decode_calls", self.decode_calls),
            ("encode_calls", self.encode_calls),
            ("conversion_failures", self.conversion_failures),
            ("handle_ungets", self.handle_ungets),
            ("putback_cells", self.putback_cells),
            ("homing_sequences", self.homing_sequences),
            ("short_transfers", self.short_transfers),
            ("seeks", self.seeks),
        ]
    }
}

static GLOBAL_METRICS: EngineMetrics = EngineMetrics::new();

/// Access the global metrics singleton.
#[must_use]
pub fn global_metrics() -> &'static EngineMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = EngineMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn increment_works() {
        let m = EngineMetrics::new();
        EngineMetrics::inc(&m.putback_cells);
        EngineMetrics::inc(&m.putback_cells);
        EngineMetrics::inc(&m.seeks);
        let snap = m.snapshot();
        assert_eq!(snap.putback_cells, 2);
        assert_eq!(snap.seeks, 1);
        assert_eq!(snap.entries()[6], ("putback_cells", 2));
    }
}
