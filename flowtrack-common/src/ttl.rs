//! Running TTL average packed into one machine word.
//!
//! The low 28 bits hold the packet count, the remaining 36 bits the sum of
//! observed TTLs. One addition updates both. Counts at or above 2^28 carry
//! into the sum and corrupt the encoding; that is the hard limit of this
//! representation, checked only in debug builds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bits reserved for the packet count.
pub const TTL_COUNT_BITS: u32 = 28;

/// Mask selecting the packet count.
pub const TTL_COUNT_MASK: u64 = (1 << TTL_COUNT_BITS) - 1;

/// Largest packet count the encoding can hold.
pub const TTL_MAX_PACKETS: u64 = TTL_COUNT_MASK;

/// Add `new_ttl` to the sum and one to the count of an encoded word.
#[inline]
pub fn update_ttl(word: u64, new_ttl: u16) -> u64 {
    debug_assert!(
        word & TTL_COUNT_MASK < TTL_MAX_PACKETS,
        "TTL aggregate packet count overflow"
    );
    word.wrapping_add(u64::from(new_ttl) << TTL_COUNT_BITS)
        .wrapping_add(1)
}

/// Integer average TTL of an encoded word.
///
/// # Panics
///
/// Panics if no packet has been folded into `word`.
#[inline]
pub fn average_ttl(word: u64) -> u16 {
    let packets = word & TTL_COUNT_MASK;
    assert!(packets > 0, "average of an empty TTL aggregate");
    ((word >> TTL_COUNT_BITS) / packets) as u16
}

/// Typed wrapper over the encoded word, stored inline in
/// [`FlowRecord`](crate::types::FlowRecord).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TtlAggregate(pub u64);

impl TtlAggregate {
    /// Aggregate with no packets.
    pub const EMPTY: TtlAggregate = TtlAggregate(0);

    #[inline]
    #[must_use]
    pub fn update(self, new_ttl: u16) -> Self {
        TtlAggregate(update_ttl(self.0, new_ttl))
    }

    /// # Panics
    ///
    /// Panics on an empty aggregate, see [`average_ttl`].
    #[inline]
    pub fn average(self) -> u16 {
        average_ttl(self.0)
    }

    /// Average, or `None` if nothing was observed yet.
    pub fn checked_average(self) -> Option<u16> {
        if self.is_empty() {
            None
        } else {
            Some(self.average())
        }
    }

    pub fn packet_count(self) -> u64 {
        self.0 & TTL_COUNT_MASK
    }

    pub fn ttl_sum(self) -> u64 {
        self.0 >> TTL_COUNT_BITS
    }

    pub fn is_empty(self) -> bool {
        self.packet_count() == 0
    }

    /// The raw encoded word.
    pub fn into_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TtlAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.checked_average() {
            Some(avg) => write!(f, "avg ttl {} over {} packets", avg, self.packet_count()),
            None => write!(f, "no packets"),
        }
    }
}
