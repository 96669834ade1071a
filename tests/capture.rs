//! Capture files fed through the tracker.

use bytes::Bytes;
use flowtrack::capture::encode_capture;
use flowtrack::extract::synthesize_frame;
use flowtrack::{AnyFlowKey, CaptureReader, Error, FlowKeyV4, FlowKeyV6, FlowTracker, PacketHeader};
use std::net::{Ipv4Addr, Ipv6Addr};

fn keys() -> Vec<AnyFlowKey> {
    vec![
        FlowKeyV4::new(Ipv4Addr::new(10, 1, 0, 1), 40000, Ipv4Addr::new(10, 1, 0, 2), 80, 6)
            .into(),
        FlowKeyV4::new(
            Ipv4Addr::new(10, 1, 0, 3),
            40001,
            Ipv4Addr::new(10, 1, 0, 2),
            53,
            17,
        )
        .into(),
        FlowKeyV6::new(
            Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
            50000,
            Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2),
            443,
            6,
        )
        .into(),
    ]
}

#[test]
fn test_replay_encoded_capture() {
    let keys = keys();
    let records: Vec<PacketHeader> = (0..30u64)
        .map(|i| {
            let key = &keys[(i % 3) as usize];
            PacketHeader::new(1_000 + i, 0, synthesize_frame(key, 60 + (i % 3) as u8, 32))
        })
        .collect();

    let capture: Bytes = encode_capture(&records).unwrap();

    let mut tracker: FlowTracker = FlowTracker::new(16).unwrap();
    let mut created = 0;
    for header in CaptureReader::new(capture) {
        if tracker.analyze_packet(&header.unwrap()).unwrap().new_flow {
            created += 1;
        }
    }

    assert_eq!(created, 3);
    let metrics = tracker.metrics_snapshot();
    assert_eq!(metrics.packets_analyzed, 30);
    assert_eq!(metrics.inserts, 3);
    assert_eq!(metrics.lookup_hits, 27);
    assert_eq!(tracker.len_v4(), 2);
    assert_eq!(tracker.len_v6(), 1);

    for (n, key) in keys.iter().enumerate() {
        let r = match key {
            AnyFlowKey::V4(k) => tracker.get_flow_data(k),
            AnyFlowKey::V6(k) => tracker.get_flow_data(k),
        }
        .unwrap();
        assert_eq!(r.packets(), 10);
        assert_eq!(r.start_ts, 1_000 + n as u64);
        assert_eq!(r.end_ts, 1_027 + n as u64);
        assert_eq!(r.ttl_aggregate.average(), 60 + n as u16);
    }

}

#[test]
fn test_undecodable_records_are_skipped() {
    let good = PacketHeader::new(5, 0, synthesize_frame(&keys()[0], 64, 0));
    let bad = PacketHeader::new(6, 0, vec![0xffu8; 20]);
    let capture = encode_capture([&good, &bad, &good]).unwrap();

    let mut tracker: FlowTracker = FlowTracker::new(4).unwrap();
    let results: Vec<_> = CaptureReader::new(capture)
        .map(|h| tracker.analyze_packet(&h.unwrap()))
        .collect();

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::Packet(_))));
    assert!(results[2].is_ok());
    assert_eq!(tracker.metrics_snapshot().packets_undecodable, 1);
    assert_eq!(tracker.len_v4(), 1);
}
