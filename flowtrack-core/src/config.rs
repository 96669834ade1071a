//! Tracker configuration.

use flowtrack_common::types::DEFAULT_MAX_FLOWS;
use flowtrack_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::index::MAX_CAPACITY;

/// Sizing of a [`FlowTracker`](crate::FlowTracker), fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Flows tracked per address family. Both the IPv4 and the IPv6 table
    /// get this capacity.
    pub max_flows: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_flows: DEFAULT_MAX_FLOWS,
        }
    }
}

impl TrackerConfig {
    pub fn new(max_flows: u32) -> Self {
        Self { max_flows }
    }

    /// Check the values before any storage is reserved.
    pub fn validate(&self) -> Result<()> {
        if self.max_flows == 0 || self.max_flows > MAX_CAPACITY {
            return Err(Error::InvalidCapacity(u64::from(self.max_flows)));
        }
        Ok(())
    }
}
