// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content adapter contract.
//!
//! A node wraps an opaque content object owned by the hosting application.
//! The canvas never interprets that content itself; everything it needs —
//! display name, class name, port layout, persisted payload — comes through
//! this trait. Concrete adapters are registered per kind in the
//! [`TypeLedger`](crate::registry::TypeLedger).

use crate::port::TypeTag;
use std::collections::BTreeSet;

/// Declaration of one port as produced by a content adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Port name, unique within its direction on the owning node
    pub name: String,
    /// Accepted type tags; empty means "accept anything not excluded"
    pub accepted: BTreeSet<TypeTag>,
    /// Explicitly rejected type tags
    pub excluded: BTreeSet<TypeTag>,
}

impl PortSpec {
    /// A port accepting a single concrete type
    pub fn new(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            accepted: BTreeSet::from([tag]),
            excluded: BTreeSet::new(),
        }
    }

    /// A port accepting several types
    pub fn accepting(name: impl Into<String>, tags: impl IntoIterator<Item = TypeTag>) -> Self {
        Self {
            name: name.into(),
            accepted: tags.into_iter().collect(),
            excluded: BTreeSet::new(),
        }
    }

    /// A wildcard port accepting any type not excluded
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepted: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    /// Exclude a type tag
    pub fn without(mut self, tag: TypeTag) -> Self {
        self.excluded.insert(tag);
        self
    }
}

/// Capability interface over one kind of node content.
pub trait NodeContent {
    /// Stable class name used as the ledger lookup key
    fn class_name(&self) -> &str;

    /// Name shown in the node header
    fn display_name(&self) -> String;

    /// Ordered input port declarations
    fn input_ports(&self) -> Vec<PortSpec>;

    /// Ordered output port declarations
    fn output_ports(&self) -> Vec<PortSpec>;

    /// Persisted payload for this content's own fields
    fn serialize(&self) -> serde_json::Value;

    /// Clone behind the trait object
    fn clone_box(&self) -> Box<dyn NodeContent>;
}

impl Clone for Box<dyn NodeContent> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl std::fmt::Debug for Box<dyn NodeContent> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContent")
            .field("class_name", &self.class_name())
            .finish()
    }
}
