//! Common types and utilities for flowtrack.
//!
//! This crate provides the flow key shapes, the per-flow record and its TTL
//! aggregate, the capture record format, and the error and metrics types
//! shared by the flow tables and the command-line tools.

pub mod capture;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod ttl;
pub mod types;

/// Reexport of common types
pub use error::Error;
pub use ttl::TtlAggregate;
pub use types::{AddressFamily, AnyFlowKey, FlowKey, FlowKeyV4, FlowKeyV6, FlowRecord, SlotId};
pub type Result<T> = std::result::Result<T, Error>;
