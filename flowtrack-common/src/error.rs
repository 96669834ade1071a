//! Error types for flowtrack.

use thiserror::Error;

use crate::types::AddressFamily;

/// All recoverable errors that can occur within flowtrack.
///
/// Programmer errors (averaging an empty TTL aggregate, addressing a slot
/// outside the table) are not represented here; they panic.
#[derive(Error, Debug)]
pub enum Error {
    /// Insert of a new key into a table that already holds `capacity` flows.
    #[error("{family} flow table is full ({capacity} flows)")]
    CapacityExceeded {
        family: AddressFamily,
        capacity: u32,
    },

    /// Lookup or removal of a key that is not in the table.
    #[error("flow not found")]
    NotFound,

    /// Table storage could not be reserved at construction.
    #[error("could not allocate storage for {0} flows")]
    Allocation(u32),

    /// Requested capacity is zero or above the supported limit.
    #[error("invalid flow table capacity: {0}")]
    InvalidCapacity(u64),

    /// Error decoding a capture record or extracting a flow from it.
    #[error("packet error: {0}")]
    Packet(String),
}

