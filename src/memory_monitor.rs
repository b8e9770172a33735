//! Memory-pressure monitor (spec §4.12, optional): watches process memory usage and shrinks
//! cache capacities when a high watermark is crossed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::attr_cache::AttrCache;
use crate::read_ahead::ReadAheadBuffer;

/// Capacity floors the monitor will not shrink caches below.
const MIN_ATTR_CACHE_ENTRIES: usize = 100;
const MIN_READ_AHEAD_FILES: usize = 10;
const MIN_READ_AHEAD_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureConfig {
    pub check_interval: Duration,
    pub high_watermark: f64,
    pub low_watermark: f64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        PressureConfig { check_interval: Duration::from_secs(30), high_watermark: 0.8, low_watermark: 0.6 }
    }
}

/// A source of the process's current memory usage fraction (0.0-1.0), injected so the monitor
/// is testable without reading real process metrics.
pub trait UsageSource: Send + Sync {
    fn usage_fraction(&self) -> f64;
}

/// Tracks whether the monitor is currently in a pressure state, and applies/reverts the
/// cache-capacity reduction exactly once per transition.
pub struct MemoryMonitor {
    config: PressureConfig,
    in_pressure: AtomicBool,
    base_attr_capacity: usize,
    base_read_ahead_files: usize,
    base_read_ahead_bytes: usize,
}

impl MemoryMonitor {
    pub fn new(config: PressureConfig, base_attr_capacity: usize, base_read_ahead_files: usize, base_read_ahead_bytes: usize) -> Self {
        MemoryMonitor {
            config,
            in_pressure: AtomicBool::new(false),
            base_attr_capacity,
            base_read_ahead_files,
            base_read_ahead_bytes,
        }
    }

    pub fn is_in_pressure(&self) -> bool {
        self.in_pressure.load(Ordering::Relaxed)
    }

    /// Samples `source` once and, on a watermark crossing, resizes `attr_cache`/`read_ahead`
    /// accordingly. Returns `true` if a transition happened.
    pub fn tick(&self, source: &dyn UsageSource, attr_cache: &AttrCache, read_ahead: &ReadAheadBuffer) -> bool {
        let usage = source.usage_fraction();
        let was_in_pressure = self.in_pressure.load(Ordering::Relaxed);
        if !was_in_pressure && usage >= self.config.high_watermark {
            let reduction = (1.0 - self.config.low_watermark / usage).clamp(0.1, 0.9);
            let keep = 1.0 - reduction;
            let new_attr_cap = ((self.base_attr_capacity as f64 * keep) as usize).max(MIN_ATTR_CACHE_ENTRIES);
            let new_ra_files = ((self.base_read_ahead_files as f64 * keep) as usize).max(MIN_READ_AHEAD_FILES);
            let new_ra_bytes = ((self.base_read_ahead_bytes as f64 * keep) as usize).max(MIN_READ_AHEAD_BYTES);
            attr_cache.resize(new_attr_cap);
            read_ahead.resize(new_ra_files, new_ra_bytes);
            self.in_pressure.store(true, Ordering::Relaxed);
            true
        } else if was_in_pressure && usage <= self.config.low_watermark {
            attr_cache.resize(self.base_attr_capacity);
            read_ahead.resize(self.base_read_ahead_files, self.base_read_ahead_bytes);
            self.in_pressure.store(false, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    struct FixedUsage(f64);
    impl UsageSource for FixedUsage {
        fn usage_fraction(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn crossing_high_watermark_shrinks_caches() {
        let monitor = MemoryMonitor::new(PressureConfig::default(), 10_000, 1000, 100 << 20);
        let attr = AttrCache::new(10_000, StdDuration::from_secs(5));
        let ra = ReadAheadBuffer::new(1000, 100 << 20, 100 << 20);
        let transitioned = monitor.tick(&FixedUsage(0.85), &attr, &ra);
        assert!(transitioned);
        assert!(monitor.is_in_pressure());
        let (_, cap) = attr.stats();
        assert!(cap < 10_000);
        assert!(cap >= MIN_ATTR_CACHE_ENTRIES);
    }

    #[test]
    fn dropping_below_low_watermark_restores_base_capacities() {
        let monitor = MemoryMonitor::new(PressureConfig::default(), 10_000, 1000, 100 << 20);
        let attr = AttrCache::new(10_000, StdDuration::from_secs(5));
        let ra = ReadAheadBuffer::new(1000, 100 << 20, 100 << 20);
        monitor.tick(&FixedUsage(0.9), &attr, &ra);
        monitor.tick(&FixedUsage(0.5), &attr, &ra);
        assert!(!monitor.is_in_pressure());
        let (_, cap) = attr.stats();
        assert_eq!(cap, 10_000);
    }

    #[test]
    fn usage_between_watermarks_does_not_transition() {
        let monitor = MemoryMonitor::new(PressureConfig::default(), 10_000, 1000, 100 << 20);
        let attr = AttrCache::new(10_000, StdDuration::from_secs(5));
        let ra = ReadAheadBuffer::new(1000, 100 << 20, 100 << 20);
        assert!(!monitor.tick(&FixedUsage(0.7), &attr, &ra));
    }

    #[test]
    fn capacity_reduction_never_crosses_the_configured_floors() {
        let monitor = MemoryMonitor::new(PressureConfig::default(), 100, 10, 1 << 20);
        let attr = AttrCache::new(100, StdDuration::from_secs(5));
        let ra = ReadAheadBuffer::new(10, 1 << 20, 1 << 20);
        monitor.tick(&FixedUsage(0.99), &attr, &ra);
        let (_, cap) = attr.stats();
        assert_eq!(cap, MIN_ATTR_CACHE_ENTRIES);
    }
}
