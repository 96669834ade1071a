//! Reference flow extractor for capture records.
//!
//! Reads an Ethernet II frame carrying IPv4 or IPv6 and pulls out the
//! 5-tuple and the TTL (hop limit for IPv6). TCP and UDP contribute ports;
//! other transports, non-first IPv4 fragments and IPv6 extension header
//! chains are tracked with ports 0. This is deliberately shallow: it exists
//! to feed the tracker from captures, not to be a general packet parser.

use bytes::{BufMut, Bytes, BytesMut};
use flowtrack_common::capture::PacketHeader;
use flowtrack_common::types::{IPPROTO_TCP, IPPROTO_UDP};
use flowtrack_common::{AnyFlowKey, Error, FlowKeyV4, FlowKeyV6, Result};
use std::net::{Ipv4Addr, Ipv6Addr};

pub const ETH_HDR_SIZE: usize = 14;
pub const IPV4_MIN_HDR_SIZE: usize = 20;
pub const IPV6_HDR_SIZE: usize = 40;

pub const ETH_P_IPV4: u16 = 0x0800;
pub const ETH_P_IPV6: u16 = 0x86DD;
pub const ETH_P_8021Q: u16 = 0x8100;
pub const ETH_P_8021AD: u16 = 0x88A8;

/// What the tracker needs to know about one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Capture timestamp in microseconds.
    pub timestamp_us: u64,
    pub key: AnyFlowKey,
    /// IPv4 TTL or IPv6 hop limit.
    pub ttl: u8,
}

fn malformed(what: &str) -> Error {
    Error::Packet(what.to_string())
}

#[inline]
fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Transport ports at `offset`, or zeros for port-less protocols.
fn ports(data: &[u8], offset: usize, protocol: u8) -> Result<(u16, u16)> {
    match protocol {
        IPPROTO_TCP | IPPROTO_UDP => {
            if data.len() < offset + 4 {
                return Err(malformed("truncated transport header"));
            }
            Ok((be16(data, offset), be16(data, offset + 2)))
        }
        _ => Ok((0, 0)),
    }
}

fn parse_ipv4(data: &[u8]) -> Result<(AnyFlowKey, u8)> {
    if data.len() < IPV4_MIN_HDR_SIZE {
        return Err(malformed("truncated IPv4 header"));
    }
    let ver_ihl = data[0];
    if ver_ihl >> 4 != 4 {
        return Err(Error::Packet(format!("bad IPv4 version {}", ver_ihl >> 4)));
    }
    let ihl = ((ver_ihl & 0x0f) as usize) * 4;
    if ihl < IPV4_MIN_HDR_SIZE || data.len() < ihl {
        return Err(Error::Packet(format!("bad IPv4 header length {}", ihl)));
    }

    let ttl = data[8];
    let protocol = data[9];
    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

    let fragment_offset = be16(data, 6) & 0x1fff;
    let (src_port, dst_port) = if fragment_offset == 0 {
        ports(data, ihl, protocol)?
    } else {
        (0, 0)
    };

    let key = FlowKeyV4::new(src, src_port, dst, dst_port, protocol);
    Ok((AnyFlowKey::V4(key), ttl))
}

fn parse_ipv6(data: &[u8]) -> Result<(AnyFlowKey, u8)> {
    if data.len() < IPV6_HDR_SIZE {
        return Err(malformed("truncated IPv6 header"));
    }
    if data[0] >> 4 != 6 {
        return Err(Error::Packet(format!("bad IPv6 version {}", data[0] >> 4)));
    }

    let next_header = data[6];
    let hop_limit = data[7];
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&data[8..24]);
    dst.copy_from_slice(&data[24..40]);

    let (src_port, dst_port) = ports(data, IPV6_HDR_SIZE, next_header)?;

    let key = FlowKeyV6::new(
        Ipv6Addr::from(src),
        src_port,
        Ipv6Addr::from(dst),
        dst_port,
        next_header,
    );
    Ok((AnyFlowKey::V6(key), hop_limit))
}

/// Extract the flow key and TTL from an Ethernet frame.
pub fn parse_frame(frame: &[u8]) -> Result<(AnyFlowKey, u8)> {
    if frame.len() < ETH_HDR_SIZE {
        return Err(malformed("truncated Ethernet header"));
    }

    // Skip any VLAN tags the capture layer left in place.
    let mut offset = 12;
    let mut eth_type = be16(frame, offset);
    while eth_type == ETH_P_8021Q || eth_type == ETH_P_8021AD {
        offset += 4;
        if frame.len() < offset + 2 {
            return Err(malformed("truncated VLAN tag"));
        }
        eth_type = be16(frame, offset);
    }

    let l3 = &frame[offset + 2..];
    match eth_type {
        ETH_P_IPV4 => parse_ipv4(l3),
        ETH_P_IPV6 => parse_ipv6(l3),
        other => Err(Error::Packet(format!("unsupported EtherType {:#06x}", other))),
    }
}

/// Extract an [`Observation`] from a capture record.
pub fn extract(header: &PacketHeader) -> Result<Observation> {
    let (key, ttl) = parse_frame(header.data())?;
    Ok(Observation {
        timestamp_us: header.timestamp_us(),
        key,
        ttl,
    })
}

/// Build a minimal Ethernet frame for `key` with the given TTL and
/// `payload_len` zero bytes after the transport header.
///
/// Checksums are left zero. Used to synthesize captures.
pub fn synthesize_frame(key: &AnyFlowKey, ttl: u8, payload_len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(ETH_HDR_SIZE + IPV6_HDR_SIZE + 20 + payload_len);
    buf.put_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    buf.put_slice(&[0x02, 0, 0, 0, 0, 0x01]);

    let (protocol, src_port, dst_port) = match key {
        AnyFlowKey::V4(k) => (k.protocol(), k.src_port(), k.dst_port()),
        AnyFlowKey::V6(k) => (k.protocol(), k.src_port(), k.dst_port()),
    };
    let l4_len = match protocol {
        IPPROTO_TCP => 20,
        IPPROTO_UDP => 8,
        _ => 0,
    };

    match key {
        AnyFlowKey::V4(k) => {
            buf.put_u16(ETH_P_IPV4);
            buf.put_u8(0x45);
            buf.put_u8(0);
            buf.put_u16((IPV4_MIN_HDR_SIZE + l4_len + payload_len) as u16);
            buf.put_u16(0); // id
            buf.put_u16(0x4000); // DF
            buf.put_u8(ttl);
            buf.put_u8(protocol);
            buf.put_u16(0);
            buf.put_slice(&k.src_addr().octets());
            buf.put_slice(&k.dst_addr().octets());
        }
        AnyFlowKey::V6(k) => {
            buf.put_u16(ETH_P_IPV6);
            buf.put_u32(0x6000_0000);
            buf.put_u16((l4_len + payload_len) as u16);
            buf.put_u8(protocol);
            buf.put_u8(ttl);
            buf.put_slice(&k.src_addr().octets());
            buf.put_slice(&k.dst_addr().octets());
        }
    }

    match protocol {
        IPPROTO_TCP => {
            buf.put_u16(src_port);
            buf.put_u16(dst_port);
            buf.put_u32(0); // seq
            buf.put_u32(0); // ack
            buf.put_u16(0x5010); // data offset 5, ACK
            buf.put_u16(0xffff);
            buf.put_u32(0);
        }
        IPPROTO_UDP => {
            buf.put_u16(src_port);
            buf.put_u16(dst_port);
            buf.put_u16((8 + payload_len) as u16);
            buf.put_u16(0);
        }
        _ => {}
    }

    buf.put_bytes(0, payload_len);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrack_common::types::IPPROTO_ICMP;

    fn v4(proto: u8) -> AnyFlowKey {
        FlowKeyV4::new(
            Ipv4Addr::new(10, 0, 0, 1),
            1111,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
            proto,
        )
        .into()
    }

    #[test]
    fn test_parse_synthesized_ipv4_tcp() {
        let frame = synthesize_frame(&v4(IPPROTO_TCP), 64, 10);
        assert_eq!(frame.len(), ETH_HDR_SIZE + 20 + 20 + 10);
        let (key, ttl) = parse_frame(&frame).unwrap();
        assert_eq!(key, v4(IPPROTO_TCP));
        assert_eq!(ttl, 64);
    }

    #[test]
    fn test_parse_synthesized_ipv6_udp() {
        let key: AnyFlowKey = FlowKeyV6::new(
            "fe80::1".parse().unwrap(),
            5353,
            "ff02::fb".parse().unwrap(),
            5353,
            IPPROTO_UDP,
        )
        .into();
        let frame = synthesize_frame(&key, 255, 0);
        assert_eq!(parse_frame(&frame).unwrap(), (key, 255));
    }

    #[test]
    fn test_portless_protocol() {
        let frame = synthesize_frame(&v4(IPPROTO_ICMP), 32, 8);
        let (key, _) = parse_frame(&frame).unwrap();
        match key {
            AnyFlowKey::V4(k) => {
                assert_eq!(k.src_port(), 0);
                assert_eq!(k.dst_port(), 0);
                assert_eq!(k.protocol(), IPPROTO_ICMP);
            }
            other => panic!("unexpected key {}", other),
        }
    }

    #[test]
    fn test_vlan_tag_skipped() {
        let plain = synthesize_frame(&v4(IPPROTO_UDP), 7, 0);
        let mut tagged = BytesMut::new();
        tagged.put_slice(&plain[..12]);
        tagged.put_u16(ETH_P_8021Q);
        tagged.put_u16(42);
        tagged.put_slice(&plain[12..]);
        assert_eq!(parse_frame(&tagged).unwrap(), (v4(IPPROTO_UDP), 7));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_frame(&[0u8; 10]).is_err());

        let frame = synthesize_frame(&v4(IPPROTO_TCP), 64, 0);
        assert!(parse_frame(&frame[..ETH_HDR_SIZE + 10]).is_err());
        assert!(parse_frame(&frame[..ETH_HDR_SIZE + 22]).is_err());

        let mut arp = frame.to_vec();
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert!(matches!(parse_frame(&arp), Err(Error::Packet(_))));
    }

    #[test]
    fn test_extract_carries_timestamp() {
        let header = PacketHeader::new(123_456, 0, synthesize_frame(&v4(IPPROTO_TCP), 60, 0));
        let obs = extract(&header).unwrap();
        assert_eq!(obs.timestamp_us, 123_456);
        assert_eq!(obs.ttl, 60);
        assert_eq!(obs.key, v4(IPPROTO_TCP));
    }
}
