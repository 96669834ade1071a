//! Line-rate flow tracking.
//!
//! This crate re-exports the workspace libraries under one name. The key
//! types, the per-flow record, the TTL aggregate and the capture format come
//! from `flowtrack-common`; the hash index, the flow store and the
//! [`FlowTracker`] built on them come from `flowtrack-core`.

pub use flowtrack_common::{capture, hash, metrics, ttl, types};
pub use flowtrack_core::{extract, index, store, table};

pub use flowtrack_common::capture::{CaptureReader, PacketHeader};
pub use flowtrack_common::metrics::{MetricsSnapshot, TrackerMetrics};
pub use flowtrack_common::{
    AddressFamily, AnyFlowKey, Error, FlowKey, FlowKeyV4, FlowKeyV6, FlowRecord, Result, SlotId,
    TtlAggregate,
};
pub use flowtrack_core::{Analysis, FlowTracker, Observation, TrackedKey, TrackerConfig};
