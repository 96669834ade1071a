//! Fixed-capacity flow tables for line-rate flow tracking.
//!
//! A [`FlowTracker`] keeps one table per address family. Each table pairs a
//! [`HashIndex`], which maps a 5-tuple to a dense slot, with a
//! [`FlowStore`] holding the per-flow record at that slot. Storage is
//! reserved once at construction; inserts, lookups and removals never
//! allocate.
//!
//! ```
//! use flowtrack_core::FlowTracker;
//! use flowtrack_common::FlowRecord;
//! use std::net::Ipv4Addr;
//!
//! let mut tracker = FlowTracker::new(1024).unwrap();
//! let src = Ipv4Addr::new(10, 0, 0, 1);
//! let dst = Ipv4Addr::new(10, 0, 0, 2);
//!
//! tracker.add_flow_v4(src, 1111, dst, 80, 6, FlowRecord::new(100)).unwrap();
//! assert_eq!(tracker.get_flow_data_v4(src, 1111, dst, 80, 6).unwrap().start_ts, 100);
//! ```

pub mod analyze;
pub mod config;
pub mod extract;
pub mod index;
pub mod store;
pub mod table;
pub mod tracker;

pub use analyze::Analysis;
pub use config::TrackerConfig;
pub use extract::Observation;
pub use index::HashIndex;
pub use store::FlowStore;
pub use table::FlowTable;
pub use tracker::{FlowTracker, TrackedKey};
