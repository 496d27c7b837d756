// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions.

use crate::content::NodeContent;
use crate::id::{self, FrameId, NodeId, PortId};
use crate::port::{Port, PortDirection};
use egui::Pos2;

/// A positioned, collapsible visual wrapper around one content object.
///
/// The node owns its ports; the canvas owns the node. Content is opaque —
/// everything the editor needs from it goes through the
/// [`NodeContent`] adapter.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Position in graph space
    pub position: Pos2,
    /// Whether the node is collapsed to its header
    pub collapsed: bool,
    /// The frame enclosing this node, if any
    pub frame: Option<FrameId>,
    /// Input ports, in adapter declaration order
    pub inputs: Vec<Port>,
    /// Output ports, in adapter declaration order
    pub outputs: Vec<Port>,
    /// Opaque content object
    pub content: Box<dyn NodeContent>,
}

impl Node {
    /// Create a node with a fresh id, instantiating ports from the content
    /// adapter's declarations
    pub fn new(content: Box<dyn NodeContent>) -> Self {
        Self::with_id(NodeId::fresh(), content)
    }

    /// Create a node with a caller-provided id (deserialization paths).
    ///
    /// The id is observed so later fresh ids cannot collide with it.
    pub fn with_id(node_id: NodeId, content: Box<dyn NodeContent>) -> Self {
        id::observe_raw(node_id.raw());
        let inputs = content
            .input_ports()
            .iter()
            .map(|spec| Port::from_spec(node_id, PortDirection::Input, spec))
            .collect();
        let outputs = content
            .output_ports()
            .iter()
            .map(|spec| Port::from_spec(node_id, PortDirection::Output, spec))
            .collect();
        Self {
            id: node_id,
            position: Pos2::ZERO,
            collapsed: false,
            frame: None,
            inputs,
            outputs,
            content,
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Pos2::new(x, y);
        self
    }

    /// Name shown in the header
    pub fn display_name(&self) -> String {
        self.content.display_name()
    }

    /// Ledger lookup key of the wrapped content
    pub fn class_name(&self) -> &str {
        self.content.class_name()
    }

    /// Get a port by ID
    pub fn port(&self, port_id: PortId) -> Option<&Port> {
        self.inputs
            .iter()
            .find(|p| p.id == port_id)
            .or_else(|| self.outputs.iter().find(|p| p.id == port_id))
    }

    /// Get a mutable port by ID
    pub fn port_mut(&mut self, port_id: PortId) -> Option<&mut Port> {
        self.inputs
            .iter_mut()
            .find(|p| p.id == port_id)
            .or_else(|| self.outputs.iter_mut().find(|p| p.id == port_id))
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::FloatValue;

    #[test]
    fn test_ports_built_from_adapter() {
        let node = Node::new(Box::new(FloatValue::default()));
        assert!(node.inputs.is_empty());
        assert_eq!(node.outputs.len(), 1);
        assert_eq!(node.outputs[0].name, "Value");
        assert_eq!(node.outputs[0].owner, node.id);
        assert_eq!(node.outputs[0].direction, PortDirection::Output);
    }

    #[test]
    fn test_port_lookup_by_id() {
        let node = Node::new(Box::new(FloatValue::default()));
        let out_id = node.outputs[0].id;
        assert!(node.port(out_id).is_some());
        assert!(node.port(PortId(u64::MAX)).is_none());
    }
}
