//! Flow keys and per-flow records.
//!
//! Keys are stored as their packed wire layout so that equality and hashing
//! run over every byte of the key and nothing else. The same layout is what
//! a kernel-side producer writes into a BPF hash map, hence the `Pod` impls.

use aya::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::hash::flow_hash;
use crate::ttl::TtlAggregate;

/// Length of an IPv6 address in bytes.
pub const IPV6_ADDR_LEN: usize = 16;

/// Packed size of an IPv4 5-tuple.
pub const FLOW_KEY_V4_LEN: usize = 4 + 4 + 2 + 2 + 1;

/// Packed size of an IPv6 5-tuple.
pub const FLOW_KEY_V6_LEN: usize = IPV6_ADDR_LEN * 2 + 2 + 2 + 1;

/// Default number of flows tracked per address family.
pub const DEFAULT_MAX_FLOWS: u32 = 1024;

/// IP protocol numbers the tools know by name.
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_ICMPV6: u8 = 58;

/// Dense index of a flow's record within its family table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    /// The slot as an array index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

/// Address family of a flow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressFamily {
    /// IPv4 5-tuples.
    V4 = 4,
    /// IPv6 5-tuples.
    V6 = 6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// A fixed-width, byte-comparable flow key.
///
/// Implemented by exactly one key shape per address family. Tables are
/// generic over this trait, which keeps the two families from ever being
/// compared or hashed against each other.
pub trait FlowKey: Copy + Eq + Default + fmt::Debug {
    /// Family this key shape belongs to.
    const FAMILY: AddressFamily;

    /// The packed byte representation of the key.
    fn as_bytes(&self) -> &[u8];

    /// Jenkins hash of the full byte representation.
    #[inline]
    fn flow_hash(&self) -> u32 {
        flow_hash(self.as_bytes())
    }
}

/* ---------------------------------------------------------------- *
 * IPv4
 * ---------------------------------------------------------------- */

/// IPv4 5-tuple.
///
/// Layout: dst_addr, src_addr, dst_port, src_port (all network order),
/// protocol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FlowKeyV4([u8; FLOW_KEY_V4_LEN]);

impl FlowKeyV4 {
    /// Build a key from its five fields.
    pub fn new(
        src_addr: Ipv4Addr,
        src_port: u16,
        dst_addr: Ipv4Addr,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        let mut bytes = [0u8; FLOW_KEY_V4_LEN];
        bytes[0..4].copy_from_slice(&dst_addr.octets());
        bytes[4..8].copy_from_slice(&src_addr.octets());
        bytes[8..10].copy_from_slice(&dst_port.to_be_bytes());
        bytes[10..12].copy_from_slice(&src_port.to_be_bytes());
        bytes[12] = protocol;
        Self(bytes)
    }

    /// Build a key from host-order integer addresses, as handed over by a
    /// C-style caller.
    pub fn from_raw(
        src_addr: u32,
        src_port: u16,
        dst_addr: u32,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        Self::new(Ipv4Addr::from(src_addr), src_port, Ipv4Addr::from(dst_addr), dst_port, protocol)
    }

    /// Reinterpret a packed key.
    pub fn from_bytes(bytes: [u8; FLOW_KEY_V4_LEN]) -> Self {
        Self(bytes)
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[0], self.0[1], self.0[2], self.0[3])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[4], self.0[5], self.0[6], self.0[7])
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.0[8], self.0[9]])
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.0[10], self.0[11]])
    }

    pub fn protocol(&self) -> u8 {
        self.0[12]
    }

    /// The key seen from the other direction of the conversation.
    pub fn reversed(&self) -> Self {
        Self::new(
            self.dst_addr(),
            self.dst_port(),
            self.src_addr(),
            self.src_port(),
            self.protocol(),
        )
    }
}

impl FlowKey for FlowKeyV4 {
    const FAMILY: AddressFamily = AddressFamily::V4;

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for FlowKeyV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowKeyV4({})", self)
    }
}

impl fmt::Display for FlowKeyV4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} proto {}",
            self.src_addr(),
            self.src_port(),
            self.dst_addr(),
            self.dst_port(),
            self.protocol()
        )
    }
}

/* ---------------------------------------------------------------- *
 * IPv6
 * ---------------------------------------------------------------- */

/// IPv6 5-tuple, same field order as [`FlowKeyV4`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FlowKeyV6(#[serde(with = "key_v6_bytes")] [u8; FLOW_KEY_V6_LEN]);

impl FlowKeyV6 {
    /// Build a key from its five fields.
    pub fn new(
        src_addr: Ipv6Addr,
        src_port: u16,
        dst_addr: Ipv6Addr,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        let mut bytes = [0u8; FLOW_KEY_V6_LEN];
        bytes[0..16].copy_from_slice(&dst_addr.octets());
        bytes[16..32].copy_from_slice(&src_addr.octets());
        bytes[32..34].copy_from_slice(&dst_port.to_be_bytes());
        bytes[34..36].copy_from_slice(&src_port.to_be_bytes());
        bytes[36] = protocol;
        Self(bytes)
    }

    /// Reinterpret a packed key.
    pub fn from_bytes(bytes: [u8; FLOW_KEY_V6_LEN]) -> Self {
        Self(bytes)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; IPV6_ADDR_LEN];
        octets.copy_from_slice(&self.0[0..16]);
        Ipv6Addr::from(octets)
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; IPV6_ADDR_LEN];
        octets.copy_from_slice(&self.0[16..32]);
        Ipv6Addr::from(octets)
    }

    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.0[32], self.0[33]])
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.0[34], self.0[35]])
    }

    pub fn protocol(&self) -> u8 {
        self.0[36]
    }

    /// The key seen from the other direction of the conversation.
    pub fn reversed(&self) -> Self {
        Self::new(
            self.dst_addr(),
            self.dst_port(),
            self.src_addr(),
            self.src_port(),
            self.protocol(),
        )
    }
}

// Arrays longer than 32 have no std `Default`.
impl Default for FlowKeyV6 {
    fn default() -> Self {
        Self([0u8; FLOW_KEY_V6_LEN])
    }
}

impl FlowKey for FlowKeyV6 {
    const FAMILY: AddressFamily = AddressFamily::V6;

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for FlowKeyV6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowKeyV6({})", self)
    }
}

impl fmt::Display for FlowKeyV6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]:{} -> [{}]:{} proto {}",
            self.src_addr(),
            self.src_port(),
            self.dst_addr(),
            self.dst_port(),
            self.protocol()
        )
    }
}

/// serde only derives for arrays up to 32 elements.
mod key_v6_bytes {
    use super::FLOW_KEY_V6_LEN;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &[u8; FLOW_KEY_V6_LEN],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; FLOW_KEY_V6_LEN], D::Error> {
        let v: Vec<u8> = Vec::deserialize(d)?;
        v.as_slice().try_into().map_err(|_| {
            D::Error::custom(format!("expected {} key bytes, got {}", FLOW_KEY_V6_LEN, v.len()))
        })
    }
}

/// A key of either family, as produced by the packet extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnyFlowKey {
    V4(FlowKeyV4),
    V6(FlowKeyV6),
}

impl AnyFlowKey {
    pub fn family(&self) -> AddressFamily {
        match self {
            AnyFlowKey::V4(_) => AddressFamily::V4,
            AnyFlowKey::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for AnyFlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyFlowKey::V4(key) => fmt::Display::fmt(key, f),
            AnyFlowKey::V6(key) => fmt::Display::fmt(key, f),
        }
    }
}

impl From<FlowKeyV4> for AnyFlowKey {
    fn from(key: FlowKeyV4) -> Self {
        AnyFlowKey::V4(key)
    }
}

impl From<FlowKeyV6> for AnyFlowKey {
    fn from(key: FlowKeyV6) -> Self {
        AnyFlowKey::V6(key)
    }
}

/* ---------------------------------------------------------------- *
 * Flow record
 * ---------------------------------------------------------------- */

/// Per-flow application data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct FlowRecord {
    /// Timestamp of the first packet, in microseconds.
    pub start_ts: u64,
    /// Timestamp of the latest packet, in microseconds.
    pub end_ts: u64,
    /// Packed packet count and TTL sum.
    pub ttl_aggregate: TtlAggregate,
}

impl FlowRecord {
    /// Record for a flow first seen at `ts`, with no packets folded in yet.
    pub fn new(ts: u64) -> Self {
        Self {
            start_ts: ts,
            end_ts: ts,
            ttl_aggregate: TtlAggregate::default(),
        }
    }

    /// Fold one packet observed at `ts` with the given TTL into the record.
    #[inline]
    pub fn observe(&mut self, ts: u64, ttl: u8) {
        self.end_ts = ts;
        self.ttl_aggregate = self.ttl_aggregate.update(u16::from(ttl));
    }

    /// Number of packets folded into the record.
    pub fn packets(&self) -> u64 {
        self.ttl_aggregate.packet_count()
    }

    /// Microseconds between the first and the latest packet.
    pub fn duration_us(&self) -> u64 {
        self.end_ts.saturating_sub(self.start_ts)
    }
}

unsafe impl Pod for FlowKeyV4 {}
unsafe impl Pod for FlowKeyV6 {}
unsafe impl Pod for FlowRecord {}
unsafe impl Pod for SlotId {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_key_sizes_have_no_padding() {
        assert_eq!(mem::size_of::<FlowKeyV4>(), 13);
        assert_eq!(mem::size_of::<FlowKeyV6>(), 37);
        assert_eq!(mem::size_of::<FlowRecord>(), 24);
    }

    #[test]
    fn test_v4_field_layout() {
        let key = FlowKeyV4::new(
            Ipv4Addr::new(10, 0, 0, 1),
            1111,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
            IPPROTO_TCP,
        );

        assert_eq!(
            key.as_bytes(),
            &[10, 0, 0, 2, 10, 0, 0, 1, 0, 80, 0x04, 0x57, 6]
        );
        assert_eq!(key.src_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(key.dst_addr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(key.src_port(), 1111);
        assert_eq!(key.dst_port(), 80);
        assert_eq!(key.protocol(), IPPROTO_TCP);
        assert_eq!(key.to_string(), "10.0.0.1:1111 -> 10.0.0.2:80 proto 6");
    }

    #[test]
    fn test_v4_from_raw_matches_typed() {
        let raw = FlowKeyV4::from_raw(0x0a00_0001, 1111, 0x0a00_0002, 80, 6);
        let typed = FlowKeyV4::new(
            Ipv4Addr::new(10, 0, 0, 1),
            1111,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
            6,
        );
        assert_eq!(raw, typed);
        assert_eq!(raw.flow_hash(), typed.flow_hash());
    }

    #[test]
    fn test_every_field_participates_in_equality() {
        let a = Ipv4Addr::new(192, 168, 1, 1);
        let b = Ipv4Addr::new(192, 168, 1, 2);
        let base = FlowKeyV4::new(a, 1000, b, 53, IPPROTO_UDP);

        assert_ne!(base, FlowKeyV4::new(b, 1000, b, 53, IPPROTO_UDP));
        assert_ne!(base, FlowKeyV4::new(a, 1001, b, 53, IPPROTO_UDP));
        assert_ne!(base, FlowKeyV4::new(a, 1000, a, 53, IPPROTO_UDP));
        assert_ne!(base, FlowKeyV4::new(a, 1000, b, 54, IPPROTO_UDP));
        assert_ne!(base, FlowKeyV4::new(a, 1000, b, 53, IPPROTO_TCP));
        assert_eq!(base, FlowKeyV4::new(a, 1000, b, 53, IPPROTO_UDP));
    }

    #[test]
    fn test_reversed_swaps_endpoints() {
        let key = FlowKeyV4::new(Ipv4Addr::new(1, 1, 1, 1), 1, Ipv4Addr::new(2, 2, 2, 2), 2, 17);
        let rev = key.reversed();
        assert_eq!(rev.src_addr(), Ipv4Addr::new(2, 2, 2, 2));
        assert_eq!(rev.dst_port(), 1);
        assert_eq!(rev.reversed(), key);
    }

    #[test]
    fn test_v6_layout_and_display() {
        let src: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let dst: Ipv6Addr = "2001:db8::2".parse().unwrap();
        let key = FlowKeyV6::new(src, 5555, dst, 443, IPPROTO_TCP);

        assert_eq!(&key.as_bytes()[0..16], &dst.octets());
        assert_eq!(&key.as_bytes()[16..32], &src.octets());
        assert_eq!(key.src_addr(), src);
        assert_eq!(key.dst_addr(), dst);
        assert_eq!(key.src_port(), 5555);
        assert_eq!(key.dst_port(), 443);
        assert_eq!(key.to_string(), "[2001:db8::1]:5555 -> [2001:db8::2]:443 proto 6");
        assert_eq!(FlowKeyV6::default().as_bytes(), &[0u8; FLOW_KEY_V6_LEN]);
    }

    #[test]
    fn test_v6_serde_round_trip() {
        let key = FlowKeyV6::new(Ipv6Addr::LOCALHOST, 1, Ipv6Addr::UNSPECIFIED, 2, 17);
        let json = serde_json::to_string(&key).unwrap();
        let back: FlowKeyV6 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<FlowKeyV6>("[1,2,3]").is_err());
    }

    #[test]
    fn test_record_observe() {
        let mut record = FlowRecord::new(100);
        record.observe(150, 64);
        record.observe(175, 62);

        assert_eq!(record.start_ts, 100);
        assert_eq!(record.end_ts, 175);
        assert_eq!(record.packets(), 2);
        assert_eq!(record.ttl_aggregate.average(), 63);
        assert_eq!(record.duration_us(), 75);
    }
}
