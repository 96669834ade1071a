//! Capture record encoding and decoding.
//!
//! The capture layer hands packets over as packed records:
//!
//! ```text
//! +--------------------------------------+-----------+-----------------+
//! | u64 LE: ts (bits 0..48), vlan 48..60 | u16 LE len| len payload     |
//! +--------------------------------------+-----------+-----------------+
//! ```
//!
//! The timestamp is in microseconds. The payload starts at the Ethernet
//! header with any VLAN tag already stripped into the `vlan` field.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;

/// Size of the fixed record prefix.
pub const PACKET_HEADER_LEN: usize = 8 + 2;

/// Largest timestamp representable in a record.
pub const MAX_TIMESTAMP_US: u64 = (1 << 48) - 1;

/// Largest VLAN tag representable in a record.
pub const MAX_VLAN: u16 = (1 << 12) - 1;

/// One captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    timestamp_us: u64,
    vlan: u16,
    data: Bytes,
}

impl PacketHeader {
    /// Create a record; the timestamp and VLAN tag are truncated to the
    /// record's field widths.
    pub fn new(timestamp_us: u64, vlan: u16, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp_us: timestamp_us & MAX_TIMESTAMP_US,
            vlan: vlan & MAX_VLAN,
            data: data.into(),
        }
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn vlan(&self) -> u16 {
        self.vlan
    }

    /// Payload length as carried in the record.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Total encoded size of this record.
    pub fn encoded_len(&self) -> usize {
        PACKET_HEADER_LEN + self.data.len()
    }

    /// Encode this record into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        let len = u16::try_from(self.data.len()).map_err(|_| {
            Error::Packet(format!("payload of {} bytes does not fit a record", self.data.len()))
        })?;

        buf.reserve(self.encoded_len());
        buf.put_u64_le(self.timestamp_us | (u64::from(self.vlan) << 48));
        buf.put_u16_le(len);
        buf.extend_from_slice(&self.data);
        Ok(())
    }

    /// Decode a single record from `buf` **in-place**.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < PACKET_HEADER_LEN {
            return Err(Error::Packet(format!(
                "buffer too small for record header: {} bytes",
                buf.remaining()
            )));
        }

        let word = buf.get_u64_le();
        let len = buf.get_u16_le() as usize;

        if buf.remaining() < len {
            return Err(Error::Packet(format!(
                "truncated record: payload requires {} bytes but only {} available",
                len,
                buf.remaining()
            )));
        }

        Ok(Self {
            timestamp_us: word & MAX_TIMESTAMP_US,
            vlan: ((word >> 48) as u16) & MAX_VLAN,
            data: buf.copy_to_bytes(len),
        })
    }
}

/// Iterator over back-to-back records in a capture buffer.
///
/// Yields an error and stops at the first truncated record.
pub struct CaptureReader {
    buf: Bytes,
    failed: bool,
}

impl CaptureReader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            failed: false,
        }
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

impl Iterator for CaptureReader {
    type Item = Result<PacketHeader, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.buf.has_remaining() {
            return None;
        }
        let record = PacketHeader::decode(&mut self.buf);
        if let Err(e) = &record {
            debug!("Capture ends in a bad record ({} bytes left): {}", self.buf.remaining(), e);
            self.failed = true;
        }
        Some(record)
    }
}

/// Encode a sequence of records into one capture buffer.
pub fn encode_capture<'a>(
    records: impl IntoIterator<Item = &'a PacketHeader>,
) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    for record in records {
        record.encode(&mut buf)?;
    }
    Ok(buf.freeze())
}
