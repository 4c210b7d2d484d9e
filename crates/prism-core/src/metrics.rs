//! The named instruments a pattern runtime exposes for operational visibility
//! (§6.4). Modeled on the teacher's `observability::MetricsProvider` facade, scaled
//! down to the counter/gauge shapes this runtime actually needs — no histograms or
//! attribute sets, since §6.4 only calls for named running totals and depth gauges.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;

/// A monotonically increasing named total.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A point-in-time value that can move in either direction, e.g. queue depth.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Names of the counters every producer/consumer pattern instance maintains (§6.4).
pub mod names {
    pub const MESSAGES_PUBLISHED: &str = "messages_published";
    pub const MESSAGES_FAILED: &str = "messages_failed";
    pub const MESSAGES_CONSUMED: &str = "messages_consumed";
    pub const MESSAGES_RETRIED: &str = "messages_retried";
    pub const DLQ_WRITES: &str = "dlq_writes";
    pub const CLAIM_CHECK_OFFLOADS: &str = "claim_check_offloads";
    pub const CLAIM_CHECK_RESOLUTIONS: &str = "claim_check_resolutions";
}

/// A process-local table of named counters and gauges, created lazily on first
/// access so callers never need an upfront registration pass.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: DashMap<&'static str, Counter>,
    gauges: DashMap<&'static str, Gauge>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &'static str) -> dashmap::mapref::one::RefMut<'_, &'static str, Counter> {
        self.counters.entry(name).or_default()
    }

    pub fn gauge(&self, name: &'static str) -> dashmap::mapref::one::RefMut<'_, &'static str, Gauge> {
        self.gauges.entry(name).or_default()
    }

    pub fn incr_counter(&self, name: &'static str) {
        self.counter(name).incr();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|entry| (*entry.key(), entry.value().get()))
                .collect(),
            gauges: self
                .gauges
                .iter()
                .map(|entry| (*entry.key(), entry.value().get()))
                .collect(),
        }
    }
}

/// An immutable point-in-time read of every instrument, suitable for logging or a
/// diagnostics endpoint.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub gauges: Vec<(&'static str, i64)>,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.counters {
            writeln!(f, "{name}={value}")?;
        }
        for (name, value) in &self.gauges {
            writeln!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_calls() {
        let registry = MetricsRegistry::new();
        registry.incr_counter(names::MESSAGES_PUBLISHED);
        registry.incr_counter(names::MESSAGES_PUBLISHED);
        assert_eq!(registry.counter(names::MESSAGES_PUBLISHED).get(), 2);
    }

    #[test]
    fn gauge_tracks_current_depth() {
        let registry = MetricsRegistry::new();
        registry.gauge("queue_depth").add(5);
        registry.gauge("queue_depth").add(-2);
        assert_eq!(registry.gauge("queue_depth").get(), 3);
    }

    #[test]
    fn snapshot_reflects_current_values() {
        let registry = MetricsRegistry::new();
        registry.incr_counter(names::DLQ_WRITES);
        let snapshot = registry.snapshot();
        assert!(snapshot.counters.contains(&(names::DLQ_WRITES, 1)));
    }
}
