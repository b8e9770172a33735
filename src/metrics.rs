//! Metrics collector (spec §4.13): counters, gauges, and per-operation latency percentiles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;

/// Reservoir size for per-operation latency sampling.
const RESERVOIR_SIZE: usize = 1000;

#[derive(Default)]
struct OpCounters {
    calls: AtomicU64,
    errors: AtomicU64,
}

struct Reservoir {
    samples: ArrayQueue<u64>,
}

impl Reservoir {
    fn new() -> Self {
        Reservoir { samples: ArrayQueue::new(RESERVOIR_SIZE) }
    }

    fn record(&self, micros: u64) {
        // force_push drops the oldest sample once the ring is full; this is a rolling window,
        // not a statistically unbiased reservoir sample, but meets the spec's "rolling sample".
        self.samples.force_push(micros);
    }

    fn percentiles(&self) -> Percentiles {
        let mut values: Vec<u64> = self.samples.iter().copied().collect();
        values.sort_unstable();
        Percentiles {
            p50: percentile_of(&values, 0.50),
            p95: percentile_of(&values, 0.95),
            p99: percentile_of(&values, 0.99),
        }
    }
}

fn percentile_of(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Percentiles {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

/// A point-in-time view of every tracked counter and gauge.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub calls_by_op: HashMap<String, u64>,
    pub errors_by_op: HashMap<String, u64>,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub attr_cache_hits: u64,
    pub attr_cache_misses: u64,
    pub read_ahead_hits: u64,
    pub read_ahead_misses: u64,
    pub auth_failures: u64,
    pub active_connections: i64,
    pub active_workers: i64,
    pub queued_tasks: i64,
    pub latency_by_op: HashMap<String, Percentiles>,
}

/// Thread-safe counters, gauges, and latency reservoirs, keyed by operation name where per-op
/// breakdown applies.
pub struct Metrics {
    op_counters: Mutex<HashMap<String, OpCounters>>,
    op_latency: Mutex<HashMap<String, Reservoir>>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    attr_cache_hits: AtomicU64,
    attr_cache_misses: AtomicU64,
    read_ahead_hits: AtomicU64,
    read_ahead_misses: AtomicU64,
    auth_failures: AtomicU64,
    active_connections: AtomicI64,
    active_workers: AtomicI64,
    queued_tasks: AtomicI64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            op_counters: Mutex::new(HashMap::new()),
            op_latency: Mutex::new(HashMap::new()),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            attr_cache_hits: AtomicU64::new(0),
            attr_cache_misses: AtomicU64::new(0),
            read_ahead_hits: AtomicU64::new(0),
            read_ahead_misses: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            active_workers: AtomicI64::new(0),
            queued_tasks: AtomicI64::new(0),
        }
    }

    pub fn record_call(&self, op: &str, elapsed: Duration, failed: bool) {
        {
            let mut counters = self.op_counters.lock().expect("metrics lock poisoned");
            let entry = counters.entry(op.to_string()).or_default();
            entry.calls.fetch_add(1, Ordering::Relaxed);
            if failed {
                entry.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        let mut latency = self.op_latency.lock().expect("metrics lock poisoned");
        latency.entry(op.to_string()).or_insert_with(Reservoir::new).record(elapsed.as_micros() as u64);
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_attr_cache(&self, hit: bool) {
        if hit {
            self.attr_cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.attr_cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_read_ahead(&self, hit: bool) {
        if hit {
            self.read_ahead_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_ahead_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_connections(&self, n: i64) {
        self.active_connections.store(n, Ordering::Relaxed);
    }

    pub fn set_active_workers(&self, n: i64) {
        self.active_workers.store(n, Ordering::Relaxed);
    }

    pub fn set_queued_tasks(&self, n: i64) {
        self.queued_tasks.store(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.op_counters.lock().expect("metrics lock poisoned");
        let latency = self.op_latency.lock().expect("metrics lock poisoned");
        let mut calls_by_op = HashMap::new();
        let mut errors_by_op = HashMap::new();
        for (op, c) in counters.iter() {
            calls_by_op.insert(op.clone(), c.calls.load(Ordering::Relaxed));
            errors_by_op.insert(op.clone(), c.errors.load(Ordering::Relaxed));
        }
        let latency_by_op = latency.iter().map(|(op, r)| (op.clone(), r.percentiles())).collect();
        MetricsSnapshot {
            calls_by_op,
            errors_by_op,
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            attr_cache_hits: self.attr_cache_hits.load(Ordering::Relaxed),
            attr_cache_misses: self.attr_cache_misses.load(Ordering::Relaxed),
            read_ahead_hits: self.read_ahead_hits.load(Ordering::Relaxed),
            read_ahead_misses: self.read_ahead_misses.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            latency_by_op,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_calls_and_errors_per_operation() {
        let metrics = Metrics::new();
        metrics.record_call("read", Duration::from_micros(10), false);
        metrics.record_call("read", Duration::from_micros(20), true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.calls_by_op["read"], 2);
        assert_eq!(snapshot.errors_by_op["read"], 1);
    }

    #[test]
    fn percentiles_are_computed_from_a_sorted_sample() {
        let metrics = Metrics::new();
        for i in 1..=100u64 {
            metrics.record_call("write", Duration::from_micros(i), false);
        }
        let snapshot = metrics.snapshot();
        let p = snapshot.latency_by_op["write"];
        assert!(p.p50 < p.p95);
        assert!(p.p95 <= p.p99);
    }

    #[test]
    fn reservoir_caps_at_its_configured_size() {
        let reservoir = Reservoir::new();
        for i in 0..(RESERVOIR_SIZE as u64 + 500) {
            reservoir.record(i);
        }
        assert_eq!(reservoir.samples.len(), RESERVOIR_SIZE);
    }

    #[test]
    fn gauges_reflect_the_latest_set_value() {
        let metrics = Metrics::new();
        metrics.set_active_connections(5);
        metrics.set_active_workers(3);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_connections, 5);
        assert_eq!(snapshot.active_workers, 3);
    }
}
