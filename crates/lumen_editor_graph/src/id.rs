// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monotonic identifier generation for graph objects.
//!
//! Every node, port, link and frame gets a process-lifetime unique integer
//! id drawn from a single shared counter. Integer ids (rather than uuids)
//! are what the persisted graph format carries, so imported ids must be
//! observed to keep the counter ahead of them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Draw the next unique raw id.
pub(crate) fn fresh_raw() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Advance the counter past an id that entered the process from outside
/// (deserialization, frame import), so later ids can never collide with it.
pub(crate) fn observe_raw(raw: u64) {
    NEXT_ID.fetch_max(raw + 1, Ordering::Relaxed);
}

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Draw a fresh node ID
    pub fn fresh() -> Self {
        Self(fresh_raw())
    }

    /// Get the raw integer value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Unique identifier for a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub u64);

impl PortId {
    /// Draw a fresh port ID
    pub fn fresh() -> Self {
        Self(fresh_raw())
    }

    /// Get the raw integer value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl LinkId {
    /// Draw a fresh link ID
    pub fn fresh() -> Self {
        Self(fresh_raw())
    }

    /// Get the raw integer value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Unique identifier for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl FrameId {
    /// Draw a fresh frame ID
    pub fn fresh() -> Self {
        Self(fresh_raw())
    }

    /// Get the raw integer value
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let a = NodeId::fresh();
        let b = NodeId::fresh();
        let c = PortId::fresh();
        assert!(b.raw() > a.raw());
        assert!(c.raw() > b.raw());
    }

    #[test]
    fn test_observe_advances_counter() {
        let seen = fresh_raw() + 1000;
        observe_raw(seen);
        assert!(NodeId::fresh().raw() > seen);
    }
}
