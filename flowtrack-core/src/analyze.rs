//! Per-packet entry point.
//!
//! Each packet either refreshes its flow (new `end_ts`, TTL folded into the
//! aggregate) or, for a flow not seen before, creates it with `start_ts` set
//! to the packet timestamp.

use flowtrack_common::capture::PacketHeader;
use flowtrack_common::{AnyFlowKey, Error, FlowKeyV4, FlowKeyV6, FlowRecord, Result, SlotId};
use log::trace;

use crate::extract::{self, Observation};
use crate::tracker::{FlowTracker, TrackedKey};

/// Result of folding one packet into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analysis {
    /// Slot of the flow's record.
    pub slot: SlotId,
    /// Whether this packet created the flow.
    pub new_flow: bool,
}

impl FlowTracker<FlowRecord> {
    /// Fold a packet seen at `ts` (microseconds) with the given TTL into the
    /// flow of `key`.
    ///
    /// Fails with [`Error::CapacityExceeded`] if the flow is new and its
    /// family table is full; nothing is recorded in that case.
    pub fn analyze<K: TrackedKey>(&mut self, ts: u64, key: K, ttl: u8) -> Result<Analysis> {
        let (table, metrics) = K::parts_mut(self);
        metrics.packets_analyzed.increment();

        if let Some((slot, record)) = table.entry_mut(&key) {
            metrics.lookup_hits.increment();
            record.observe(ts, ttl);
            return Ok(Analysis { slot, new_flow: false });
        }
        metrics.lookup_misses.increment();

        let mut record = FlowRecord::new(ts);
        record.observe(ts, ttl);

        match table.insert(key, record) {
            Ok((slot, _)) => {
                metrics.inserts.increment();
                K::gauge(metrics).increment();
                trace!("new flow {:?} in {}", key, slot);
                Ok(Analysis { slot, new_flow: true })
            }
            Err(e) => {
                if matches!(e, Error::CapacityExceeded { .. }) {
                    metrics.capacity_rejections.increment();
                    trace!("dropping {:?}: {}", key, e);
                }
                Err(e)
            }
        }
    }

    pub fn analyze_v4(&mut self, ts: u64, key: &FlowKeyV4, ttl: u8) -> Result<Analysis> {
        self.analyze(ts, *key, ttl)
    }

    pub fn analyze_v6(&mut self, ts: u64, key: &FlowKeyV6, ttl: u8) -> Result<Analysis> {
        self.analyze(ts, *key, ttl)
    }

    /// Fold an extracted observation of either family.
    pub fn analyze_observation(&mut self, obs: &Observation) -> Result<Analysis> {
        match obs.key {
            AnyFlowKey::V4(key) => self.analyze(obs.timestamp_us, key, obs.ttl),
            AnyFlowKey::V6(key) => self.analyze(obs.timestamp_us, key, obs.ttl),
        }
    }

    /// Extract the flow from a capture record and fold it in.
    ///
    /// Records the reference extractor cannot decode are counted and
    /// reported as [`Error::Packet`].
    pub fn analyze_packet(&mut self, header: &PacketHeader) -> Result<Analysis> {
        match extract::extract(header) {
            Ok(obs) => self.analyze_observation(&obs),
            Err(e) => {
                self.live_metrics().packets_undecodable.increment();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::synthesize_frame;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn key_v4(n: u8) -> FlowKeyV4 {
        FlowKeyV4::new(
            Ipv4Addr::new(10, 0, 0, n),
            1000 + n as u16,
            Ipv4Addr::new(10, 0, 1, 1),
            443,
            6,
        )
    }

    #[test]
    fn test_first_packet_creates_flow() {
        let mut tracker: FlowTracker = FlowTracker::new(4).unwrap();
        let a = tracker.analyze_v4(100, &key_v4(1), 64).unwrap();
        assert!(a.new_flow);

        let record = tracker.get_flow_data(&key_v4(1)).unwrap();
        assert_eq!(record.start_ts, 100);
        assert_eq!(record.end_ts, 100);
        assert_eq!(record.packets(), 1);
        assert_eq!(record.ttl_aggregate.average(), 64);
    }

    #[test]
    fn test_later_packets_update_flow() {
        let mut tracker: FlowTracker = FlowTracker::new(4).unwrap();
        let first = tracker.analyze_v4(100, &key_v4(1), 64).unwrap();
        let second = tracker.analyze_v4(250, &key_v4(1), 128).unwrap();
        let third = tracker.analyze_v4(300, &key_v4(1), 32).unwrap();

        assert!(!second.new_flow && !third.new_flow);
        assert_eq!(first.slot, third.slot);

        let record = tracker.get_flow_data(&key_v4(1)).unwrap();
        assert_eq!(record.start_ts, 100);
        assert_eq!(record.end_ts, 300);
        assert_eq!(record.packets(), 3);
        assert_eq!(record.ttl_aggregate.average(), 74);
        assert_eq!(tracker.len_v4(), 1);
    }

    #[test]
    fn test_end_ts_follows_latest_packet_even_backwards() {
        let mut tracker: FlowTracker = FlowTracker::new(4).unwrap();
        assert!(tracker.analyze_v4(200, &key_v4(1), 64).unwrap().new_flow);
        assert!(!tracker.analyze_v4(100, &key_v4(1), 64).unwrap().new_flow);

        let record = tracker.get_flow_data(&key_v4(1)).unwrap();
        assert_eq!(record.start_ts, 200);
        assert_eq!(record.end_ts, 100);
        assert_eq!(record.packets(), 2);
        assert_eq!(record.duration_us(), 0);

        tracker.analyze_v4(350, &key_v4(1), 64).unwrap();
        let record = tracker.get_flow_data(&key_v4(1)).unwrap();
        assert_eq!(record.start_ts, 200);
        assert_eq!(record.duration_us(), 150);
    }

    #[test]
    fn test_full_table_rejects_new_flows_only() {
        let mut tracker: FlowTracker = FlowTracker::new(1).unwrap();
        tracker.analyze_v4(1, &key_v4(1), 10).unwrap();

        assert!(matches!(
            tracker.analyze_v4(2, &key_v4(2), 10),
            Err(Error::CapacityExceeded { .. })
        ));
        assert!(tracker.analyze_v4(3, &key_v4(1), 20).is_ok());
        assert_eq!(tracker.get_flow_data(&key_v4(1)).unwrap().packets(), 2);
        assert!(tracker.get_flow_data(&key_v4(2)).is_none());

        let snap = tracker.metrics_snapshot();
        assert_eq!(snap.packets_analyzed, 3);
        assert_eq!(snap.capacity_rejections, 1);
        assert_eq!(snap.flows_v4, 1);
    }

    #[test]
    fn test_v6_analysis_is_separate() {
        let mut tracker: FlowTracker = FlowTracker::new(1).unwrap();
        let v6 = FlowKeyV6::new(Ipv6Addr::LOCALHOST, 1, Ipv6Addr::LOCALHOST, 2, 17);
        tracker.analyze_v4(10, &key_v4(1), 64).unwrap();
        assert!(tracker.analyze_v6(20, &v6, 255).unwrap().new_flow);
        assert_eq!(tracker.get_flow_data_v6(&v6).unwrap().start_ts, 20);
    }

    #[test]
    fn test_analyze_packet() {
        let mut tracker: FlowTracker = FlowTracker::new(8).unwrap();
        let key: AnyFlowKey = key_v4(3).into();
        let pkt = PacketHeader::new(5_000, 0, synthesize_frame(&key, 61, 100));

        assert!(tracker.analyze_packet(&pkt).unwrap().new_flow);
        assert!(!tracker.analyze_packet(&pkt).unwrap().new_flow);
        assert_eq!(tracker.get_flow_data(&key_v4(3)).unwrap().ttl_aggregate.average(), 61);

        let garbage = PacketHeader::new(6_000, 0, vec![0u8; 4]);
        assert!(matches!(tracker.analyze_packet(&garbage), Err(Error::Packet(_))));
        assert_eq!(tracker.metrics_snapshot().packets_undecodable, 1);
    }
}
