//! Metrics collection for flow tables.
//!
//! Counters are relaxed atomics so a snapshot can be taken from another
//! thread while the owning core keeps updating them.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/* ---------------------------------------------------------------- *
 * Simple Counter
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        let c = Counter::new();
        c.value.store(self.value(), Ordering::Relaxed);
        c
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn decrement(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Gauge {
    fn clone(&self) -> Self {
        let g = Gauge::new();
        g.set(self.value());
        g
    }
}

/* ---------------------------------------------------------------- *
 * Histogram
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<u64>,
    underflow: AtomicU64,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Histogram with inclusive upper `boundaries`, which must be sorted and
    /// non-empty.
    pub fn new(boundaries: Vec<u64>) -> Self {
        assert!(!boundaries.is_empty(), "histogram needs at least one bucket");
        let buckets = (0..boundaries.len()).map(|_| AtomicU64::new(0)).collect();

        Self {
            buckets,
            boundaries,
            underflow: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    pub fn exponential(min: u64, max: u64, buckets: usize) -> Self {
        assert!(min > 0 && min < max && buckets > 1);
        let factor = (max as f64 / min as f64).powf(1.0 / (buckets as f64 - 1.0));
        let mut boundaries = Vec::with_capacity(buckets);
        let mut value = min;
        for _ in 0..buckets {
            boundaries.push(value);
            value = ((value as f64 * factor).ceil() as u64).max(value + 1);
        }
        Self::new(boundaries)
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);

        if value < self.boundaries[0] {
            self.underflow.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.boundaries.iter().position(|&b| value <= b) {
            Some(idx) => {
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn average(&self) -> f64 {
        let c = self.count();
        if c == 0 {
            0.0
        } else {
            self.sum() as f64 / c as f64
        }
    }

    /// Smallest bucket boundary at or below which `q` of the observations
    /// fall. Observations beyond the last boundary report the maximum seen.
    pub fn quantile(&self, q: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }
        let target = ((total as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = self.underflow.load(Ordering::Relaxed);
        if seen >= target {
            return self.boundaries[0];
        }
        for (&b, bucket) in self.boundaries.iter().zip(self.buckets.iter()) {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= target {
                return b;
            }
        }
        self.max()
    }

    pub fn counts(&self) -> Vec<(u64, u64)> {
        self.boundaries
            .iter()
            .zip(self.buckets.iter())
            .map(|(&b, bucket)| (b, bucket.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }
}

impl Clone for Histogram {
    fn clone(&self) -> Self {
        Self {
            buckets: self
                .buckets
                .iter()
                .map(|b| AtomicU64::new(b.load(Ordering::Relaxed)))
                .collect(),
            boundaries: self.boundaries.clone(),
            underflow: AtomicU64::new(self.underflow.load(Ordering::Relaxed)),
            overflow: AtomicU64::new(self.overflow.load(Ordering::Relaxed)),
            sum: AtomicU64::new(self.sum()),
            count: AtomicU64::new(self.count()),
            max: AtomicU64::new(self.max()),
        }
    }
}

/* ---------------------------------------------------------------- *
 * Aggregate metrics for a flow tracker
 * ---------------------------------------------------------------- */

#[derive(Debug, Default, Clone)]
pub struct TrackerMetrics {
    // Table operations
    pub inserts: Counter,
    /// Inserts of a key that was already present
    pub updates: Counter,
    pub lookup_hits: Counter,
    pub lookup_misses: Counter,
    pub removals: Counter,
    pub capacity_rejections: Counter,

    // Occupancy
    pub flows_v4: Gauge,
    pub flows_v6: Gauge,

    // Packet analysis
    pub packets_analyzed: Counter,
    pub packets_undecodable: Counter,
}

impl TrackerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain-value copy, suitable for printing or serializing.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inserts: self.inserts.value(),
            updates: self.updates.value(),
            lookup_hits: self.lookup_hits.value(),
            lookup_misses: self.lookup_misses.value(),
            removals: self.removals.value(),
            capacity_rejections: self.capacity_rejections.value(),
            flows_v4: self.flows_v4.value(),
            flows_v6: self.flows_v6.value(),
            packets_analyzed: self.packets_analyzed.value(),
            packets_undecodable: self.packets_undecodable.value(),
        }
    }
}

/// Point-in-time values of [`TrackerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub inserts: u64,
    pub updates: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub removals: u64,
    pub capacity_rejections: u64,
    pub flows_v4: u64,
    pub flows_v6: u64,
    pub packets_analyzed: u64,
    pub packets_undecodable: u64,
}
