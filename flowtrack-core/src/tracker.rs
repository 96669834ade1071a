//! The flow tracker: one fixed-capacity table per address family.
//!
//! A tracker is owned by a single packet-processing path. Every mutating
//! operation takes `&mut self`, so sharing one tracker between cores needs
//! external synchronization; the intended layout is one tracker per core
//! with flows hashed to cores.

use flowtrack_common::metrics::{Gauge, MetricsSnapshot, TrackerMetrics};
use flowtrack_common::{Error, FlowKey, FlowKeyV4, FlowKeyV6, FlowRecord, Result, SlotId};
use log::debug;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::config::TrackerConfig;
use crate::table::FlowTable;

/// Key shapes a [`FlowTracker`] has a table for.
///
/// Resolves a key type to its family's table at compile time, so a key can
/// only ever be looked up in the table of its own family.
pub trait TrackedKey: FlowKey + 'static {
    fn table<T: Copy + Default>(tracker: &FlowTracker<T>) -> &FlowTable<Self, T>;

    /// The family table together with the tracker's metrics.
    fn parts_mut<T: Copy + Default>(
        tracker: &mut FlowTracker<T>,
    ) -> (&mut FlowTable<Self, T>, &TrackerMetrics);

    /// Live-flow gauge of this family.
    fn gauge(metrics: &TrackerMetrics) -> &Gauge;
}

impl TrackedKey for FlowKeyV4 {
    #[inline]
    fn table<T: Copy + Default>(tracker: &FlowTracker<T>) -> &FlowTable<Self, T> {
        &tracker.ipv4
    }

    #[inline]
    fn parts_mut<T: Copy + Default>(
        tracker: &mut FlowTracker<T>,
    ) -> (&mut FlowTable<Self, T>, &TrackerMetrics) {
        (&mut tracker.ipv4, &*tracker.metrics)
    }

    #[inline]
    fn gauge(metrics: &TrackerMetrics) -> &Gauge {
        &metrics.flows_v4
    }
}

impl TrackedKey for FlowKeyV6 {
    #[inline]
    fn table<T: Copy + Default>(tracker: &FlowTracker<T>) -> &FlowTable<Self, T> {
        &tracker.ipv6
    }

    #[inline]
    fn parts_mut<T: Copy + Default>(
        tracker: &mut FlowTracker<T>,
    ) -> (&mut FlowTable<Self, T>, &TrackerMetrics) {
        (&mut tracker.ipv6, &*tracker.metrics)
    }

    #[inline]
    fn gauge(metrics: &TrackerMetrics) -> &Gauge {
        &metrics.flows_v6
    }
}

/// Per-flow state for IPv4 and IPv6 traffic.
pub struct FlowTracker<T = FlowRecord> {
    config: TrackerConfig,
    ipv4: FlowTable<FlowKeyV4, T>,
    ipv6: FlowTable<FlowKeyV6, T>,
    metrics: Arc<TrackerMetrics>,
}

impl<T: Copy + Default> FlowTracker<T> {
    /// Create a tracker holding up to `max_flows` flows per family.
    pub fn new(max_flows: u32) -> Result<Self> {
        Self::with_config(TrackerConfig::new(max_flows))
    }

    pub fn with_config(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let ipv4 = FlowTable::new(config.max_flows)?;
        let ipv6 = FlowTable::new(config.max_flows)?;

        debug!("Created flow tracker: max_flows={}", config.max_flows);

        Ok(Self {
            config,
            ipv4,
            ipv6,
            metrics: Arc::new(TrackerMetrics::new()),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Capacity of each family table.
    pub fn capacity(&self) -> u32 {
        self.config.max_flows
    }

    /// Shared handle to the live metrics.
    pub fn metrics(&self) -> Arc<TrackerMetrics> {
        Arc::clone(&self.metrics)
    }

    #[inline]
    pub(crate) fn live_metrics(&self) -> &TrackerMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /* ------------------------------------------------------------ *
     * Generic operations
     * ------------------------------------------------------------ */

    /// Track `key` with `record`.
    ///
    /// A key that is already tracked keeps its slot and has its record
    /// overwritten. Fails with [`Error::CapacityExceeded`] when the family
    /// table is full and `key` is new, leaving the table unchanged.
    pub fn add_flow<K: TrackedKey>(&mut self, key: K, record: T) -> Result<SlotId> {
        let (table, metrics) = K::parts_mut(self);
        match table.insert(key, record) {
            Ok((slot, true)) => {
                metrics.inserts.increment();
                K::gauge(metrics).increment();
                if table.is_full() {
                    debug!("{} flow table reached capacity ({})", K::FAMILY, table.capacity());
                }
                Ok(slot)
            }
            Ok((slot, false)) => {
                metrics.updates.increment();
                Ok(slot)
            }
            Err(e) => {
                if matches!(e, Error::CapacityExceeded { .. }) {
                    metrics.capacity_rejections.increment();
                }
                Err(e)
            }
        }
    }

    /// Record of `key`, if tracked.
    #[inline]
    pub fn get_flow_data<K: TrackedKey>(&self, key: &K) -> Option<&T> {
        let found = K::table(self).get(key);
        self.count_lookup(found.is_some());
        found
    }

    /// Mutable record of `key`, for in-place updates.
    #[inline]
    pub fn get_flow_data_mut<K: TrackedKey>(&mut self, key: &K) -> Option<&mut T> {
        let (table, metrics) = K::parts_mut(self);
        let found = table.get_mut(key);
        if found.is_some() {
            metrics.lookup_hits.increment();
        } else {
            metrics.lookup_misses.increment();
        }
        found
    }

    /// Slot currently assigned to `key`.
    pub fn slot_of<K: TrackedKey>(&self, key: &K) -> Option<SlotId> {
        K::table(self).slot_of(key)
    }

    /// Stop tracking `key`, freeing its slot.
    pub fn remove_flow<K: TrackedKey>(&mut self, key: &K) -> Result<()> {
        let (table, metrics) = K::parts_mut(self);
        table.remove(key)?;
        metrics.removals.increment();
        K::gauge(metrics).decrement();
        Ok(())
    }

    /// Number of tracked flows of `K`'s family.
    pub fn len<K: TrackedKey>(&self) -> usize {
        K::table(self).len()
    }

    #[inline]
    fn count_lookup(&self, hit: bool) {
        if hit {
            self.metrics.lookup_hits.increment();
        } else {
            self.metrics.lookup_misses.increment();
        }
    }

    /* ------------------------------------------------------------ *
     * Per-family helpers
     * ------------------------------------------------------------ */

    pub fn add_flow_v4(
        &mut self,
        src_addr: Ipv4Addr,
        src_port: u16,
        dst_addr: Ipv4Addr,
        dst_port: u16,
        protocol: u8,
        record: T,
    ) -> Result<SlotId> {
        self.add_flow(FlowKeyV4::new(src_addr, src_port, dst_addr, dst_port, protocol), record)
    }

    pub fn add_flow_v6(&mut self, key: FlowKeyV6, record: T) -> Result<SlotId> {
        self.add_flow(key, record)
    }

    pub fn get_flow_data_v4(
        &self,
        src_addr: Ipv4Addr,
        src_port: u16,
        dst_addr: Ipv4Addr,
        dst_port: u16,
        protocol: u8,
    ) -> Option<&T> {
        self.get_flow_data(&FlowKeyV4::new(src_addr, src_port, dst_addr, dst_port, protocol))
    }

    pub fn get_flow_data_v6(&self, key: &FlowKeyV6) -> Option<&T> {
        self.get_flow_data(key)
    }

    pub fn remove_flow_v4(&mut self, key: &FlowKeyV4) -> Result<()> {
        self.remove_flow(key)
    }

    pub fn remove_flow_v6(&mut self, key: &FlowKeyV6) -> Result<()> {
        self.remove_flow(key)
    }

    pub fn len_v4(&self) -> usize {
        self.ipv4.len()
    }

    pub fn len_v6(&self) -> usize {
        self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }

    /// Tracked IPv4 flows, in no particular order.
    pub fn flows_v4(&self) -> impl Iterator<Item = (FlowKeyV4, &T)> + '_ {
        self.ipv4.iter()
    }

    /// Tracked IPv6 flows, in no particular order.
    pub fn flows_v6(&self) -> impl Iterator<Item = (FlowKeyV6, &T)> + '_ {
        self.ipv6.iter()
    }

    /// Longest probe sequence in either family's index.
    pub fn max_probe_len(&self) -> usize {
        self.ipv4.max_probe_len().max(self.ipv6.max_probe_len())
    }

    /// Forget every flow of both families.
    pub fn clear(&mut self) {
        self.ipv4.clear();
        self.ipv6.clear();
        self.metrics.flows_v4.set(0);
        self.metrics.flows_v6.set(0);
    }

    /// Release the tracker and all of its storage.
    pub fn destroy(self) {
        debug!(
            "Destroying flow tracker ({} IPv4, {} IPv6 flows)",
            self.len_v4(),
            self.len_v6()
        );
    }
}
