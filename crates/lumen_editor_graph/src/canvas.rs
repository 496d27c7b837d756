// SPDX-License-Identifier: MIT OR Apache-2.0
//! The graph canvas: exclusive owner of all nodes, links and frames for one
//! editing session.
//!
//! Objects live in arenas keyed by generated integer ids; nothing outside
//! the canvas holds references into them. Structural edits (connect, delete
//! with reconnect, copy/paste, splice-insert, frame lifecycle) all live
//! here, and every mutation is announced on the event bus.

use crate::events::{LogEntry, StateManager};
use crate::frame::{Band, Frame, FramePort, ResizeHandle};
use crate::geometry::{self, Camera};
use crate::history::{
    CameraState, EditableState, FramePortState, FrameState, LinkState, NodeState, PortState,
};
use crate::id::{self, FrameId, LinkId, NodeId, PortId};
use crate::link::Link;
use crate::node::Node;
use crate::port::{CompatibilityState, Port, PortDirection};
use crate::registry::EditorRegistries;
use egui::{Pos2, Rect, Vec2};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Why a connection could not be made
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LinkError {
    /// Port not found
    #[error("Port not found: {0:?}")]
    PortNotFound(PortId),

    /// Link not found
    #[error("Link not found: {0:?}")]
    LinkNotFound(LinkId),

    /// Both ports share a direction
    #[error("Cannot connect two ports with the same direction")]
    SameDirection,

    /// Both ports belong to the same node
    #[error("Cannot connect a node to itself")]
    SameNode,

    /// The input side already has a connection
    #[error("Input port is already connected: {0:?}")]
    InputOccupied(PortId),

    /// The declared type sets do not overlap
    #[error("Incompatible port types")]
    TypeIncompatible,

    /// The connection would close a dependency cycle
    #[error("Connection would create a cycle")]
    WouldCycle,
}

/// Why a captured state could not be restored
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// No content factory registered for a node kind
    #[error("Unregistered node kind: {0}")]
    UnknownKind(String),

    /// A link references a node that is not part of the state
    #[error("Link references a missing node: {0:?}")]
    DanglingLink(LinkId),
}

/// A copied node, positions relative to the copy origin
#[derive(Debug, Clone)]
pub struct ClipboardNode {
    /// Content class name
    pub kind: String,
    /// Persisted content payload
    pub payload: serde_json::Value,
    /// Offset from the selection origin
    pub offset: Vec2,
    /// Collapsed flag carried over
    pub collapsed: bool,
}

/// A copied link, endpoints as (entry index, port index) pairs
#[derive(Debug, Clone, Copy)]
pub struct ClipboardLink {
    /// Index of the source entry in [`Clipboard::nodes`]
    pub from_node: usize,
    /// Index into the source node's outputs
    pub from_output: usize,
    /// Index of the target entry in [`Clipboard::nodes`]
    pub to_node: usize,
    /// Index into the target node's inputs
    pub to_input: usize,
}

/// Snapshot of a copied selection: nodes plus the links internal to it.
/// Links that crossed the selection boundary are never captured.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    /// Copied nodes
    pub nodes: Vec<ClipboardNode>,
    /// Links whose both endpoints were inside the selection
    pub links: Vec<ClipboardLink>,
}

impl Clipboard {
    /// Whether anything was captured
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Current selection of one canvas
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected nodes
    pub nodes: HashSet<NodeId>,
    /// Selected links
    pub links: HashSet<LinkId>,
    /// Selected frames
    pub frames: HashSet<FrameId>,
}

impl Selection {
    /// Whether nothing is selected
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty() && self.frames.is_empty()
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.links.clear();
        self.frames.clear();
    }
}

/// Owner of the complete editable graph for one session.
pub struct GraphCanvas {
    nodes: IndexMap<NodeId, Node>,
    links: IndexMap<LinkId, Link>,
    frames: IndexMap<FrameId, Frame>,
    /// Pan/zoom state
    pub camera: Camera,
    /// Current selection
    pub selection: Selection,
    /// Notification channels for this session
    pub events: StateManager,
    /// Grid cell size used for drop snapping
    pub grid_size: f32,
    focused_frame: Option<FrameId>,
}

impl GraphCanvas {
    /// Create an empty canvas
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            frames: IndexMap::new(),
            camera: Camera::default(),
            selection: Selection::default(),
            events: StateManager::new(),
            grid_size: geometry::GRID_SIZE,
            focused_frame: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// All nodes, in insertion order
    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// All links, in insertion order
    pub fn links(&self) -> impl DoubleEndedIterator<Item = &Link> {
        self.links.values()
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Get a frame by ID
    pub fn frame(&self, frame_id: FrameId) -> Option<&Frame> {
        self.frames.get(&frame_id)
    }

    /// Get a mutable frame by ID
    pub fn frame_mut(&mut self, frame_id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(&frame_id)
    }

    /// All frames, in insertion order
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = &Frame> {
        self.frames.values()
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Find a port and its owning node
    pub fn find_port(&self, port_id: PortId) -> Option<(&Node, &Port)> {
        self.nodes
            .values()
            .find_map(|n| n.port(port_id).map(|p| (n, p)))
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node to the canvas
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let node_id = node.id;
        self.nodes.insert(node_id, node);
        self.events.on_node_created.notify(&node_id);
        self.events.on_rebuild_required.notify(&());
        node_id
    }

    /// Remove a node, severing its links and frame membership
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let doomed_links: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.involves_node(node_id))
            .map(|l| l.id)
            .collect();
        for link_id in doomed_links {
            self.disconnect(link_id);
        }

        let node = self.nodes.shift_remove(&node_id)?;
        if let Some(frame_id) = node.frame {
            if let Some(frame) = self.frames.get_mut(&frame_id) {
                frame.nodes.remove(&node_id);
            }
            self.refresh_frame_ports(frame_id);
        }
        self.selection.nodes.remove(&node_id);
        self.events.on_node_removed.notify(&node_id);
        self.events.on_rebuild_required.notify(&());
        Some(node)
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Commit a link between two ports (either argument order).
    ///
    /// The endpoints are oriented output→input; all compatibility rules are
    /// enforced here, so a successful return means the invariants hold.
    pub fn connect(&mut self, a: PortId, b: PortId) -> Result<LinkId, LinkError> {
        let (_, port_a) = self.find_port(a).ok_or(LinkError::PortNotFound(a))?;
        let (_, port_b) = self.find_port(b).ok_or(LinkError::PortNotFound(b))?;

        if port_a.direction == port_b.direction {
            return Err(LinkError::SameDirection);
        }
        let (out_port, in_port) = if port_a.direction == PortDirection::Output {
            (port_a, port_b)
        } else {
            (port_b, port_a)
        };
        if out_port.owner == in_port.owner {
            return Err(LinkError::SameNode);
        }
        if in_port.is_connected() {
            return Err(LinkError::InputOccupied(in_port.id));
        }
        if !out_port.types_overlap(in_port) {
            return Err(LinkError::TypeIncompatible);
        }
        if self.reaches(in_port.owner, out_port.owner) {
            return Err(LinkError::WouldCycle);
        }

        let (from_node, from_port) = (out_port.owner, out_port.id);
        let (to_node, to_port) = (in_port.owner, in_port.id);

        let link = Link::new(from_node, from_port, to_node, to_port);
        let link_id = link.id;
        self.links.insert(link_id, link);

        if let Some(port) = self.port_mut(from_port) {
            port.link_count += 1;
        }
        if let Some(port) = self.port_mut(to_port) {
            port.link_count = 1;
            port.connected_to = Some(from_port);
        }

        self.refresh_enclosing_frame_ports(from_node);
        self.refresh_enclosing_frame_ports(to_node);
        self.events.on_link_created.notify(&link_id);
        self.events.on_rebuild_required.notify(&());
        Ok(link_id)
    }

    /// Sever a link, restoring both ports' pre-connection state
    pub fn disconnect(&mut self, link_id: LinkId) -> Option<Link> {
        let link = self.links.shift_remove(&link_id)?;
        if let Some(port) = self.port_mut(link.from_port) {
            port.link_count = port.link_count.saturating_sub(1);
        }
        if let Some(port) = self.port_mut(link.to_port) {
            port.link_count = 0;
            port.connected_to = None;
        }
        self.refresh_enclosing_frame_ports(link.from_node);
        self.refresh_enclosing_frame_ports(link.to_node);
        self.selection.links.remove(&link_id);
        self.events.on_link_removed.notify(&link_id);
        self.events.on_rebuild_required.notify(&());
        Some(link)
    }

    /// Full tri-state compatibility check between two ports
    pub fn check_compatibility(&self, a: PortId, b: PortId) -> CompatibilityState {
        let (Some((_, port_a)), Some((_, port_b))) = (self.find_port(a), self.find_port(b)) else {
            return CompatibilityState::TypeIncompatible;
        };
        if port_a.direction == port_b.direction || !port_a.types_overlap(port_b) {
            return CompatibilityState::TypeIncompatible;
        }
        let (out_port, in_port) = if port_a.direction == PortDirection::Output {
            (port_a, port_b)
        } else {
            (port_b, port_a)
        };
        if self.reaches(in_port.owner, out_port.owner) {
            return CompatibilityState::HierarchyIssue;
        }
        CompatibilityState::Compatible
    }

    /// Whether `to` is reachable downstream from `from`
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            for link in self.links.values() {
                if link.from_node == current {
                    if link.to_node == to {
                        return true;
                    }
                    stack.push(link.to_node);
                }
            }
        }
        false
    }

    fn port_mut(&mut self, port_id: PortId) -> Option<&mut Port> {
        self.nodes.values_mut().find_map(|n| n.port_mut(port_id))
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete the current selection.
    ///
    /// With `auto_reconnect`, each downstream input orphaned by a removed
    /// node is rewired to the first still-live upstream output with an
    /// overlapping type, consuming each source at most once (so at most
    /// `min(incoming, outgoing)` new links appear per node). The pairing
    /// order follows the removed node's port declaration order and is an
    /// implementation detail, not a stable contract.
    pub fn delete_selection(&mut self, auto_reconnect: bool) {
        let doomed: BTreeSet<NodeId> = self.selection.nodes.iter().copied().collect();
        let doomed_links: Vec<LinkId> = self.selection.links.iter().copied().collect();
        let doomed_frames: Vec<FrameId> = self.selection.frames.iter().copied().collect();

        let mut planned: Vec<(PortId, PortId)> = Vec::new();
        if auto_reconnect {
            for node_id in &doomed {
                let Some(node) = self.nodes.get(node_id) else {
                    continue;
                };
                // Live upstream outputs feeding this node, in input order.
                let mut sources: Vec<PortId> = node
                    .inputs
                    .iter()
                    .filter_map(|p| p.connected_to)
                    .filter(|src| {
                        self.find_port(*src)
                            .is_some_and(|(owner, _)| !doomed.contains(&owner.id))
                    })
                    .collect();
                // Downstream inputs about to be orphaned, in output order.
                let mut orphans: Vec<PortId> = Vec::new();
                for out in &node.outputs {
                    for link in self.links.values() {
                        if link.from_port == out.id && !doomed.contains(&link.to_node) {
                            orphans.push(link.to_port);
                        }
                    }
                }
                for orphan in orphans {
                    let Some((_, orphan_port)) = self.find_port(orphan) else {
                        continue;
                    };
                    let pick = sources.iter().position(|src| {
                        self.find_port(*src)
                            .is_some_and(|(_, sp)| sp.types_overlap(orphan_port))
                    });
                    if let Some(index) = pick {
                        planned.push((sources.remove(index), orphan));
                    }
                }
            }
        }

        for link_id in doomed_links {
            self.disconnect(link_id);
        }
        for node_id in &doomed {
            self.remove_node(*node_id);
        }
        for frame_id in doomed_frames {
            self.remove_frame(frame_id);
        }
        for (source, orphan) in planned {
            if let Err(err) = self.connect(source, orphan) {
                tracing::debug!("auto-reconnect skipped a pair: {err}");
            }
        }

        self.selection.clear();
        self.events.on_selection_changed.notify(&());
    }

    // ------------------------------------------------------------------
    // Copy / paste
    // ------------------------------------------------------------------

    /// Capture the selected nodes and their internal connectivity
    pub fn copy_selection(&self) -> Clipboard {
        let picked: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| self.selection.nodes.contains(&n.id))
            .collect();
        let Some(origin) = picked
            .iter()
            .map(|n| n.position)
            .reduce(|a, b| Pos2::new(a.x.min(b.x), a.y.min(b.y)))
        else {
            return Clipboard::default();
        };

        let index_of: BTreeMap<NodeId, usize> =
            picked.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let nodes = picked
            .iter()
            .map(|n| ClipboardNode {
                kind: n.class_name().to_string(),
                payload: n.content.serialize(),
                offset: n.position - origin,
                collapsed: n.collapsed,
            })
            .collect();

        let mut links = Vec::new();
        for link in self.links.values() {
            let (Some(&from_node), Some(&to_node)) =
                (index_of.get(&link.from_node), index_of.get(&link.to_node))
            else {
                continue; // boundary link: dropped, never retargeted
            };
            let from_output = picked[from_node]
                .outputs
                .iter()
                .position(|p| p.id == link.from_port);
            let to_input = picked[to_node]
                .inputs
                .iter()
                .position(|p| p.id == link.to_port);
            if let (Some(from_output), Some(to_input)) = (from_output, to_input) {
                links.push(ClipboardLink {
                    from_node,
                    from_output,
                    to_node,
                    to_input,
                });
            }
        }

        Clipboard { nodes, links }
    }

    /// Paste a clipboard at a target position; returns the new node ids.
    ///
    /// Every node gets a fresh id and a ceil-snapped position so the paste
    /// never lands back on the originals' grid cells.
    pub fn paste(
        &mut self,
        clipboard: &Clipboard,
        registries: &EditorRegistries,
        at: Pos2,
    ) -> Vec<NodeId> {
        let mut created: Vec<Option<NodeId>> = Vec::with_capacity(clipboard.nodes.len());
        for entry in &clipboard.nodes {
            let content = registries
                .types
                .deserialize(&entry.kind, &entry.payload)
                .or_else(|| registries.types.create(&entry.kind));
            let Some(content) = content else {
                self.log_warning(format!("Skipped pasting unregistered kind '{}'", entry.kind));
                created.push(None);
                continue;
            };
            let position = geometry::snap_ceil(at + entry.offset, self.grid_size);
            let mut node = Node::new(content).with_position(position.x, position.y);
            node.collapsed = entry.collapsed;
            created.push(Some(self.add_node(node)));
        }

        for link in &clipboard.links {
            let (Some(&Some(from_node)), Some(&Some(to_node))) =
                (created.get(link.from_node), created.get(link.to_node))
            else {
                continue;
            };
            let from_port = self
                .node(from_node)
                .and_then(|n| n.outputs.get(link.from_output).map(|p| p.id));
            let to_port = self
                .node(to_node)
                .and_then(|n| n.inputs.get(link.to_input).map(|p| p.id));
            if let (Some(from_port), Some(to_port)) = (from_port, to_port) {
                if let Err(err) = self.connect(from_port, to_port) {
                    tracing::debug!("paste could not recreate a link: {err}");
                }
            }
        }

        let new_ids: Vec<NodeId> = created.into_iter().flatten().collect();
        self.selection.clear();
        self.selection.nodes.extend(new_ids.iter().copied());
        self.events.on_selection_changed.notify(&());
        new_ids
    }

    // ------------------------------------------------------------------
    // Smart insert
    // ------------------------------------------------------------------

    /// Splice a node into an existing link, rewiring source→node→target
    /// through the first type-compatible port pair on each side.
    pub fn splice_into_link(&mut self, node_id: NodeId, link_id: LinkId) -> Result<(), LinkError> {
        let link = self
            .links
            .get(&link_id)
            .cloned()
            .ok_or(LinkError::LinkNotFound(link_id))?;
        let (_, source) = self
            .find_port(link.from_port)
            .ok_or(LinkError::PortNotFound(link.from_port))?;
        let (_, target) = self
            .find_port(link.to_port)
            .ok_or(LinkError::PortNotFound(link.to_port))?;
        let node = self
            .nodes
            .get(&node_id)
            .ok_or(LinkError::PortNotFound(link.from_port))?;

        let incoming = node
            .inputs
            .iter()
            .find(|p| !p.is_connected() && p.types_overlap(source))
            .map(|p| p.id);
        let outgoing = node
            .outputs
            .iter()
            .find(|p| p.types_overlap(target))
            .map(|p| p.id);
        let (Some(incoming), Some(outgoing)) = (incoming, outgoing) else {
            return Err(LinkError::TypeIncompatible);
        };

        let (source_port, target_port) = (link.from_port, link.to_port);
        self.disconnect(link_id);
        self.connect(source_port, incoming)?;
        self.connect(outgoing, target_port)?;
        Ok(())
    }

    /// Chain a node downstream of an existing node through the first
    /// compatible output/input pair.
    pub fn insert_after_node(
        &mut self,
        existing: NodeId,
        inserted: NodeId,
    ) -> Result<LinkId, LinkError> {
        let source = self
            .nodes
            .get(&existing)
            .ok_or(LinkError::TypeIncompatible)?;
        let sink = self
            .nodes
            .get(&inserted)
            .ok_or(LinkError::TypeIncompatible)?;
        let mut pair = None;
        'search: for out in &source.outputs {
            for input in &sink.inputs {
                if !input.is_connected() && out.types_overlap(input) {
                    pair = Some((out.id, input.id));
                    break 'search;
                }
            }
        }
        match pair {
            Some((a, b)) => self.connect(a, b),
            None => Err(LinkError::TypeIncompatible),
        }
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Add a frame
    pub fn add_frame(&mut self, frame: Frame) -> FrameId {
        let frame_id = frame.id;
        self.frames.insert(frame_id, frame);
        self.events.on_frame_created.notify(&frame_id);
        frame_id
    }

    /// Create a frame around the selected nodes and enclose them
    pub fn create_frame_around_selection(&mut self, name: impl Into<String>) -> Option<FrameId> {
        let bounds = geometry::selection_bounds(self)?.expand2(Vec2::new(40.0, 50.0));
        let frame_id = self.add_frame(Frame::new(name, bounds));
        let members: Vec<NodeId> = self.selection.nodes.iter().copied().collect();
        for node_id in members {
            self.enclose_node(frame_id, node_id);
        }
        Some(frame_id)
    }

    /// Put a node into a frame (a node belongs to at most one frame)
    pub fn enclose_node(&mut self, frame_id: FrameId, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        if let Some(previous) = node.frame.replace(frame_id) {
            if previous != frame_id {
                if let Some(old_frame) = self.frames.get_mut(&previous) {
                    old_frame.nodes.remove(&node_id);
                }
            }
        }
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            frame.nodes.insert(node_id);
        }
    }

    /// Enclose every frameless node fully contained in the frame bounds
    pub fn adopt_contained_nodes(&mut self, frame_id: FrameId) {
        let Some(frame) = self.frames.get(&frame_id) else {
            return;
        };
        let bounds = frame.bounds;
        let adoptable: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.frame.is_none() && bounds.contains_rect(geometry::node_rect(n)))
            .map(|n| n.id)
            .collect();
        for node_id in adoptable {
            self.enclose_node(frame_id, node_id);
        }
    }

    /// Remove a frame, orphaning (not deleting) its nodes
    pub fn remove_frame(&mut self, frame_id: FrameId) -> Option<Frame> {
        let frame = self.frames.shift_remove(&frame_id)?;
        for node_id in &frame.nodes {
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.frame = None;
                // Exposure is only legal while enclosed.
                for port in node.inputs.iter_mut().chain(node.outputs.iter_mut()) {
                    port.exposed_on_frame = false;
                }
            }
        }
        if self.focused_frame == Some(frame_id) {
            self.focused_frame = None;
        }
        self.selection.frames.remove(&frame_id);
        self.events.on_frame_removed.notify(&frame_id);
        Some(frame)
    }

    /// Collapse a frame to its band, synthesizing frame ports for every
    /// interior port that is exposed or carries a boundary-crossing link.
    pub fn collapse_frame(&mut self, frame_id: FrameId) {
        let Some(frame) = self.frames.get(&frame_id) else {
            return;
        };
        if frame.collapsed {
            return;
        }
        let (input_ports, output_ports) = self.build_frame_ports(frame_id);
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            frame.input_ports = input_ports;
            frame.output_ports = output_ports;
            frame.apply_collapse();
        }
        self.events.on_rebuild_required.notify(&());
    }

    /// Expand a collapsed frame, dropping its frame-port proxies
    pub fn expand_frame(&mut self, frame_id: FrameId) {
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            if frame.collapsed {
                frame.apply_expand();
                self.events.on_rebuild_required.notify(&());
            }
        }
    }

    /// Recompute a collapsed frame's port proxies (after link changes)
    fn refresh_frame_ports(&mut self, frame_id: FrameId) {
        let collapsed = self.frames.get(&frame_id).is_some_and(|f| f.collapsed);
        if !collapsed {
            return;
        }
        let (input_ports, output_ports) = self.build_frame_ports(frame_id);
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            frame.input_ports = input_ports;
            frame.output_ports = output_ports;
        }
    }

    fn refresh_enclosing_frame_ports(&mut self, node_id: NodeId) {
        if let Some(frame_id) = self.nodes.get(&node_id).and_then(|n| n.frame) {
            self.refresh_frame_ports(frame_id);
        }
    }

    fn build_frame_ports(&self, frame_id: FrameId) -> (Vec<FramePort>, Vec<FramePort>) {
        let Some(frame) = self.frames.get(&frame_id) else {
            return (Vec::new(), Vec::new());
        };

        // (exposed, position, port id) so exposed ports sort first, in
        // their recorded order; unexposed crossing ports follow by id.
        let mut sides: [Vec<(bool, i32, PortId)>; 2] = [Vec::new(), Vec::new()];
        for node_id in &frame.nodes {
            let Some(node) = self.nodes.get(node_id) else {
                continue;
            };
            for port in node.ports() {
                let crossing = self.links.values().any(|l| {
                    l.involves_port(port.id) && {
                        let other = if l.from_port == port.id {
                            l.to_node
                        } else {
                            l.from_node
                        };
                        !frame.nodes.contains(&other)
                    }
                });
                if port.exposed_on_frame || crossing {
                    let side = match port.direction {
                        PortDirection::Input => &mut sides[0],
                        PortDirection::Output => &mut sides[1],
                    };
                    side.push((!port.exposed_on_frame, port.exposed_position, port.id));
                }
            }
        }

        let mut build = |entries: &mut Vec<(bool, i32, PortId)>, direction: PortDirection| {
            entries.sort();
            let total = entries.len();
            entries
                .iter()
                .enumerate()
                .map(|(slot, (_, _, inner))| FramePort {
                    id: PortId::fresh(),
                    inner: *inner,
                    direction,
                    band: Band::for_slot(slot, total),
                    slot,
                })
                .collect::<Vec<_>>()
        };
        let inputs = build(&mut sides[0], PortDirection::Input);
        let outputs = build(&mut sides[1], PortDirection::Output);
        (inputs, outputs)
    }

    /// Expose an interior port on its frame boundary. Returns false when
    /// the owner is not enclosed by a frame (exposure is illegal then).
    pub fn set_port_exposed(&mut self, port_id: PortId, exposed: bool, position: i32) -> bool {
        let Some(owner) = self.find_port(port_id).map(|(n, _)| n.id) else {
            return false;
        };
        let Some(frame_id) = self.nodes.get(&owner).and_then(|n| n.frame) else {
            return false;
        };
        if let Some(port) = self.port_mut(port_id) {
            port.exposed_on_frame = exposed;
            port.exposed_position = position;
        }
        self.refresh_frame_ports(frame_id);
        true
    }

    /// Resolve a frame-port proxy to the interior port it delegates to
    pub fn resolve_frame_port(&self, frame_id: FrameId, proxy_id: PortId) -> Option<PortId> {
        self.frames
            .get(&frame_id)?
            .frame_port(proxy_id)
            .map(|fp| fp.inner)
    }

    /// Resize a frame by dragging one handle
    pub fn resize_frame(&mut self, frame_id: FrameId, handle: ResizeHandle, delta: Vec2) {
        if let Some(frame) = self.frames.get_mut(&frame_id) {
            frame.resize(handle, delta);
        }
    }

    // ------------------------------------------------------------------
    // Focus mode
    // ------------------------------------------------------------------

    /// Hide everything except one frame and its members
    pub fn enter_focus(&mut self, frame_id: FrameId) {
        if self.frames.contains_key(&frame_id) {
            self.focused_frame = Some(frame_id);
            self.events.on_rebuild_required.notify(&());
        }
    }

    /// Leave focus mode
    pub fn exit_focus(&mut self) {
        if self.focused_frame.take().is_some() {
            self.events.on_rebuild_required.notify(&());
        }
    }

    /// The frame currently focused, if any
    pub fn focused_frame(&self) -> Option<FrameId> {
        self.focused_frame
    }

    /// Whether a node is currently shown
    pub fn is_node_visible(&self, node_id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&node_id) else {
            return false;
        };
        if let Some(frame_id) = node.frame {
            if self.frames.get(&frame_id).is_some_and(|f| f.collapsed) {
                return false;
            }
        }
        match self.focused_frame {
            Some(focused) => node.frame == Some(focused),
            None => true,
        }
    }

    /// Whether a frame is currently shown
    pub fn is_frame_visible(&self, frame_id: FrameId) -> bool {
        match self.focused_frame {
            Some(focused) => focused == frame_id,
            None => true,
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Select a node, optionally keeping the existing selection
    pub fn select_node(&mut self, node_id: NodeId, additive: bool) {
        if !additive {
            self.selection.clear();
        }
        self.selection.nodes.insert(node_id);
        self.events.on_selection_changed.notify(&());
    }

    /// Select a link, optionally keeping the existing selection
    pub fn select_link(&mut self, link_id: LinkId, additive: bool) {
        if !additive {
            self.selection.clear();
        }
        self.selection.links.insert(link_id);
        self.events.on_selection_changed.notify(&());
    }

    /// Select a frame, optionally keeping the existing selection
    pub fn select_frame(&mut self, frame_id: FrameId, additive: bool) {
        if !additive {
            self.selection.clear();
        }
        self.selection.frames.insert(frame_id);
        self.events.on_selection_changed.notify(&());
    }

    /// Clear the selection
    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.events.on_selection_changed.notify(&());
        }
    }

    // ------------------------------------------------------------------
    // Movement and layout
    // ------------------------------------------------------------------

    /// Move specific nodes by a delta
    pub fn translate_nodes(&mut self, ids: &[NodeId], delta: Vec2) {
        for node_id in ids {
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.position += delta;
            }
        }
    }

    /// Move a frame and its enclosed nodes together
    pub fn translate_frame(&mut self, frame_id: FrameId, delta: Vec2) {
        let members: Vec<NodeId> = match self.frames.get_mut(&frame_id) {
            Some(frame) => {
                frame.translate(delta);
                frame.nodes.iter().copied().collect()
            }
            None => return,
        };
        self.translate_nodes(&members, delta);
    }

    /// Move the whole selection by a delta.
    ///
    /// Selected frames move with their members; a selected node whose own
    /// frame is also selected follows the frame move only (frame wins).
    pub fn move_selection(&mut self, delta: Vec2) {
        let frames: Vec<FrameId> = self.selection.frames.iter().copied().collect();
        for frame_id in &frames {
            self.translate_frame(*frame_id, delta);
        }
        let loose: Vec<NodeId> = self
            .selection
            .nodes
            .iter()
            .copied()
            .filter(|id| {
                self.nodes
                    .get(id)
                    .and_then(|n| n.frame)
                    .map_or(true, |f| !self.selection.frames.contains(&f))
            })
            .collect();
        self.translate_nodes(&loose, delta);
    }

    /// Fit the camera to the visible content
    pub fn zoom_to_fit(&mut self, viewport: Rect) {
        let mut bounds: Option<Rect> = None;
        let mut include = |rect: Rect| {
            bounds = Some(match bounds {
                Some(b) => b.union(rect),
                None => rect,
            });
        };
        for node in self.nodes.values() {
            if self.is_node_visible(node.id) {
                include(geometry::node_rect(node));
            }
        }
        for frame in self.frames.values() {
            if self.is_frame_visible(frame.id) {
                include(frame.bounds);
            }
        }
        let Some(bounds) = bounds else {
            return;
        };

        let fit = (viewport.width() / bounds.width().max(1.0))
            .min(viewport.height() / bounds.height().max(1.0));
        self.camera.zoom = (fit * 0.9).clamp(geometry::MIN_ZOOM, geometry::MAX_ZOOM);
        self.camera.offset = -bounds.center().to_vec2();
    }

    /// Re-layout nodes in columns by dependency depth
    pub fn auto_arrange(&mut self) {
        let mut depth: BTreeMap<NodeId, usize> = BTreeMap::new();
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for node_id in &ids {
            self.depth_of(*node_id, &mut depth, &mut HashSet::new());
        }

        let mut columns: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for node_id in &ids {
            columns
                .entry(depth.get(node_id).copied().unwrap_or(0))
                .or_default()
                .push(*node_id);
        }

        for (column, members) in &columns {
            let x = *column as f32 * (geometry::NODE_WIDTH + 80.0);
            let mut y = 0.0;
            for node_id in members {
                if let Some(node) = self.nodes.get_mut(node_id) {
                    node.position = geometry::snap_floor(Pos2::new(x, y), self.grid_size);
                }
                let height = self
                    .nodes
                    .get(node_id)
                    .map_or(0.0, |n| geometry::node_rect(n).height());
                y += height + 40.0;
            }
        }
        self.events.on_rebuild_required.notify(&());
    }

    fn depth_of(
        &self,
        node_id: NodeId,
        depth: &mut BTreeMap<NodeId, usize>,
        visiting: &mut HashSet<NodeId>,
    ) -> usize {
        if let Some(d) = depth.get(&node_id) {
            return *d;
        }
        if !visiting.insert(node_id) {
            return 0;
        }
        let d = self
            .links
            .values()
            .filter(|l| l.to_node == node_id)
            .map(|l| l.from_node)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|upstream| self.depth_of(upstream, depth, visiting) + 1)
            .max()
            .unwrap_or(0);
        visiting.remove(&node_id);
        depth.insert(node_id, d);
        d
    }

    // ------------------------------------------------------------------
    // State capture / restore
    // ------------------------------------------------------------------

    /// Ask the embedding shell to record a history snapshot
    pub fn request_store(&self) {
        self.events.on_store_required.notify(&());
    }

    fn log_warning(&self, message: String) {
        tracing::warn!("{message}");
        self.events.on_log.notify(&LogEntry::warning(message));
    }

    /// Serialize the full editable state in canonical order
    pub fn capture_state(&self) -> EditableState {
        let port_state = |p: &Port| PortState {
            id: p.id,
            name: p.name.clone(),
            exposed_on_frame: p.exposed_on_frame,
            exposed_position: p.exposed_position,
            accepted: p.accepted.clone(),
            excluded: p.excluded.clone(),
        };
        let nodes = self
            .nodes
            .values()
            .map(|n| {
                (
                    n.id,
                    NodeState {
                        kind: n.class_name().to_string(),
                        x: n.position.x,
                        y: n.position.y,
                        collapsed: n.collapsed,
                        frame: n.frame,
                        inputs: n.inputs.iter().map(port_state).collect(),
                        outputs: n.outputs.iter().map(port_state).collect(),
                        content: n.content.serialize(),
                    },
                )
            })
            .collect();
        let links = self
            .links
            .values()
            .map(|l| {
                (
                    l.id,
                    LinkState {
                        from_node: l.from_node,
                        from_port: l.from_port,
                        to_node: l.to_node,
                        to_port: l.to_port,
                        visible: l.visible,
                    },
                )
            })
            .collect();
        let frame_port_state = |fp: &FramePort| FramePortState {
            id: fp.id,
            inner: fp.inner,
            band: fp.band,
            slot: fp.slot,
        };
        let frames = self
            .frames
            .values()
            .map(|f| {
                (
                    f.id,
                    FrameState {
                        name: f.name.clone(),
                        color: f.color,
                        x: f.bounds.min.x,
                        y: f.bounds.min.y,
                        width: f.bounds.width(),
                        height: f.bounds.height(),
                        collapsed: f.collapsed,
                        expanded: f.expanded_bounds.map(|r| {
                            [r.min.x, r.min.y, r.width(), r.height()]
                        }),
                        nodes: f.nodes.clone(),
                        input_ports: f.input_ports.iter().map(frame_port_state).collect(),
                        output_ports: f.output_ports.iter().map(frame_port_state).collect(),
                        comments: f.comments.clone(),
                    },
                )
            })
            .collect();
        EditableState {
            nodes,
            links,
            frames,
            camera: CameraState {
                x: self.camera.offset.x,
                y: self.camera.offset.y,
                zoom: self.camera.zoom,
            },
        }
    }

    /// Rebuild the live object graph from a captured state, preserving
    /// every node/port/link/frame id exactly.
    pub fn restore_state(
        &mut self,
        state: &EditableState,
        registries: &EditorRegistries,
    ) -> Result<(), SnapshotError> {
        let mut nodes: IndexMap<NodeId, Node> = IndexMap::new();
        for (node_id, ns) in &state.nodes {
            let content = registries
                .types
                .deserialize(&ns.kind, &ns.content)
                .ok_or_else(|| SnapshotError::UnknownKind(ns.kind.clone()))?;
            let rebuild_port = |ps: &PortState, direction: PortDirection| {
                id::observe_raw(ps.id.raw());
                Port {
                    id: ps.id,
                    name: ps.name.clone(),
                    direction,
                    owner: *node_id,
                    connected_to: None,
                    link_count: 0,
                    exposed_on_frame: ps.exposed_on_frame,
                    exposed_position: ps.exposed_position,
                    accepted: ps.accepted.clone(),
                    excluded: ps.excluded.clone(),
                }
            };
            id::observe_raw(node_id.raw());
            let node = Node {
                id: *node_id,
                position: Pos2::new(ns.x, ns.y),
                collapsed: ns.collapsed,
                frame: ns.frame,
                inputs: ns
                    .inputs
                    .iter()
                    .map(|ps| rebuild_port(ps, PortDirection::Input))
                    .collect(),
                outputs: ns
                    .outputs
                    .iter()
                    .map(|ps| rebuild_port(ps, PortDirection::Output))
                    .collect(),
                content,
            };
            nodes.insert(*node_id, node);
        }

        let mut links: IndexMap<LinkId, Link> = IndexMap::new();
        for (link_id, ls) in &state.links {
            if !nodes.contains_key(&ls.from_node) || !nodes.contains_key(&ls.to_node) {
                return Err(SnapshotError::DanglingLink(*link_id));
            }
            id::observe_raw(link_id.raw());
            links.insert(
                *link_id,
                Link {
                    id: *link_id,
                    from_node: ls.from_node,
                    from_port: ls.from_port,
                    to_node: ls.to_node,
                    to_port: ls.to_port,
                    visible: ls.visible,
                },
            );
            if let Some(port) = nodes
                .get_mut(&ls.from_node)
                .and_then(|n| n.port_mut(ls.from_port))
            {
                port.link_count += 1;
            }
            if let Some(port) = nodes
                .get_mut(&ls.to_node)
                .and_then(|n| n.port_mut(ls.to_port))
            {
                port.link_count = 1;
                port.connected_to = Some(ls.from_port);
            }
        }

        let mut frames: IndexMap<FrameId, Frame> = IndexMap::new();
        for (frame_id, fs) in &state.frames {
            id::observe_raw(frame_id.raw());
            let rebuild_frame_port = |fps: &FramePortState, direction: PortDirection| {
                id::observe_raw(fps.id.raw());
                FramePort {
                    id: fps.id,
                    inner: fps.inner,
                    direction,
                    band: fps.band,
                    slot: fps.slot,
                }
            };
            frames.insert(
                *frame_id,
                Frame {
                    id: *frame_id,
                    name: fs.name.clone(),
                    color: fs.color,
                    bounds: Rect::from_min_size(
                        Pos2::new(fs.x, fs.y),
                        Vec2::new(fs.width, fs.height),
                    ),
                    collapsed: fs.collapsed,
                    nodes: fs.nodes.clone(),
                    input_ports: fs
                        .input_ports
                        .iter()
                        .map(|fp| rebuild_frame_port(fp, PortDirection::Input))
                        .collect(),
                    output_ports: fs
                        .output_ports
                        .iter()
                        .map(|fp| rebuild_frame_port(fp, PortDirection::Output))
                        .collect(),
                    comments: fs.comments.clone(),
                    expanded_bounds: fs.expanded.map(|[x, y, w, h]| {
                        Rect::from_min_size(Pos2::new(x, y), Vec2::new(w, h))
                    }),
                },
            );
        }

        self.nodes = nodes;
        self.links = links;
        self.frames = frames;
        self.camera.offset = Vec2::new(state.camera.x, state.camera.y);
        self.camera.zoom = state.camera.zoom;
        self.selection.clear();
        self.focused_frame = None;
        self.events.on_selection_changed.notify(&());
        self.events.on_rebuild_required.notify(&());
        Ok(())
    }
}

impl Default for GraphCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GraphCanvas {
    fn drop(&mut self) {
        self.events.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryStack;
    use crate::kinds::{self, Add, FloatValue, Lerp, MaterialOutput};

    fn registries() -> EditorRegistries {
        let mut registries = EditorRegistries::new();
        kinds::register_standard_kinds(&mut registries);
        registries
    }

    fn float_node(canvas: &mut GraphCanvas, x: f32, y: f32) -> NodeId {
        canvas.add_node(Node::new(Box::new(FloatValue::default())).with_position(x, y))
    }

    fn add_node_kind(canvas: &mut GraphCanvas, x: f32, y: f32) -> NodeId {
        canvas.add_node(Node::new(Box::new(Add::default())).with_position(x, y))
    }

    fn out0(canvas: &GraphCanvas, node: NodeId) -> PortId {
        canvas.node(node).expect("node").outputs[0].id
    }

    fn in_port(canvas: &GraphCanvas, node: NodeId, index: usize) -> PortId {
        canvas.node(node).expect("node").inputs[index].id
    }

    #[test]
    fn test_connect_then_disconnect_restores_port_state() {
        let mut canvas = GraphCanvas::new();
        let source = float_node(&mut canvas, 0.0, 0.0);
        let sink = add_node_kind(&mut canvas, 300.0, 0.0);
        let (a, b) = (out0(&canvas, source), in_port(&canvas, sink, 0));

        let before_out = canvas.find_port(a).expect("port").1.clone();
        let before_in = canvas.find_port(b).expect("port").1.clone();

        let link = canvas.connect(a, b).expect("compatible");
        assert!(canvas.find_port(b).expect("port").1.is_connected());
        assert_eq!(
            canvas.find_port(b).expect("port").1.connected_to,
            Some(a)
        );

        canvas.disconnect(link);
        assert_eq!(*canvas.find_port(a).expect("port").1, before_out);
        assert_eq!(*canvas.find_port(b).expect("port").1, before_in);
        assert_eq!(canvas.link_count(), 0);
    }

    #[test]
    fn test_connect_rejects_occupied_input() {
        let mut canvas = GraphCanvas::new();
        let first = float_node(&mut canvas, 0.0, 0.0);
        let second = float_node(&mut canvas, 0.0, 200.0);
        let sink = add_node_kind(&mut canvas, 300.0, 0.0);
        let input = in_port(&canvas, sink, 0);

        canvas.connect(out0(&canvas, first), input).expect("first link");
        let err = canvas.connect(out0(&canvas, second), input);
        assert_eq!(err, Err(LinkError::InputOccupied(input)));
        assert_eq!(canvas.link_count(), 1);
    }

    #[test]
    fn test_connect_rejects_cycles_and_reports_hierarchy_issue() {
        let mut canvas = GraphCanvas::new();
        let first = add_node_kind(&mut canvas, 0.0, 0.0);
        let second = add_node_kind(&mut canvas, 300.0, 0.0);

        canvas
            .connect(out0(&canvas, first), in_port(&canvas, second, 0))
            .expect("forward link");
        let back = canvas.connect(out0(&canvas, second), in_port(&canvas, first, 0));
        assert_eq!(back, Err(LinkError::WouldCycle));
        assert_eq!(
            canvas.check_compatibility(out0(&canvas, second), in_port(&canvas, first, 0)),
            CompatibilityState::HierarchyIssue
        );
    }

    #[test]
    fn test_delete_with_reconnect_bridges_the_gap() {
        let mut canvas = GraphCanvas::new();
        let source = float_node(&mut canvas, 0.0, 0.0);
        let middle = add_node_kind(&mut canvas, 300.0, 0.0);
        let sink =
            canvas.add_node(Node::new(Box::new(MaterialOutput::default())).with_position(600.0, 0.0));

        canvas
            .connect(out0(&canvas, source), in_port(&canvas, middle, 0))
            .expect("link in");
        let metallic = in_port(&canvas, sink, 1);
        canvas.connect(out0(&canvas, middle), metallic).expect("link out");

        canvas.select_node(middle, false);
        canvas.delete_selection(true);

        assert_eq!(canvas.node_count(), 2);
        // min(1 incoming, 1 outgoing) = 1 bridged link, no dangling refs.
        assert_eq!(canvas.link_count(), 1);
        let bridged = canvas.links().next().expect("link");
        assert_eq!(bridged.from_node, source);
        assert_eq!(bridged.to_port, metallic);
        assert!(!canvas.links().any(|l| l.involves_node(middle)));
    }

    #[test]
    fn test_reconnect_is_bounded_by_min_of_in_out() {
        let mut canvas = GraphCanvas::new();
        let feed_a = float_node(&mut canvas, 0.0, 0.0);
        let feed_b = float_node(&mut canvas, 0.0, 200.0);
        let middle = canvas.add_node(Node::new(Box::new(Lerp::default())).with_position(300.0, 0.0));
        let sink_a = add_node_kind(&mut canvas, 600.0, 0.0);
        let sink_b = add_node_kind(&mut canvas, 600.0, 200.0);

        canvas
            .connect(out0(&canvas, feed_a), in_port(&canvas, middle, 0))
            .expect("feed a");
        canvas
            .connect(out0(&canvas, feed_b), in_port(&canvas, middle, 1))
            .expect("feed b");
        canvas
            .connect(out0(&canvas, middle), in_port(&canvas, sink_a, 0))
            .expect("out a");
        canvas
            .connect(out0(&canvas, middle), in_port(&canvas, sink_b, 0))
            .expect("out b");

        canvas.select_node(middle, false);
        canvas.delete_selection(true);

        // k = 2 incoming, m = 2 outgoing: at most 2 new links, none dangling.
        assert_eq!(canvas.link_count(), 2);
        assert!(!canvas.links().any(|l| l.involves_node(middle)));
        assert!(canvas.links().all(|l| l.from_node == feed_a || l.from_node == feed_b));
    }

    #[test]
    fn test_delete_then_undo_scenario() {
        let registries = registries();
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        let b =
            canvas.add_node(Node::new(Box::new(MaterialOutput::default())).with_position(200.0, 0.0));
        let a_out = out0(&canvas, a);
        let b_in = in_port(&canvas, b, 1);
        canvas.connect(a_out, b_in).expect("compatible");

        let mut history = HistoryStack::new(canvas.capture_state());

        canvas.select_node(b, false);
        canvas.delete_selection(false);
        assert!(history.store(canvas.capture_state()));
        assert_eq!(canvas.node_count(), 1);
        assert_eq!(canvas.link_count(), 0);

        history.undo(&mut canvas, &registries).expect("undo applies");
        assert_eq!(canvas.node_count(), 2);
        assert_eq!(canvas.link_count(), 1);
        let link = canvas.links().next().expect("link");
        // Identity is restored, not just equivalent content.
        assert_eq!(link.from_port, a_out);
        assert_eq!(link.to_port, b_in);
        assert_eq!(link.to_node, b);
    }

    #[test]
    fn test_undo_redo_round_trip_is_identity() {
        let registries = registries();
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        let sink = add_node_kind(&mut canvas, 300.0, 100.0);
        canvas
            .connect(out0(&canvas, a), in_port(&canvas, sink, 0))
            .expect("link");

        let mut history = HistoryStack::new(canvas.capture_state());
        canvas.node_mut(a).expect("node").position = Pos2::new(500.0, 500.0);
        history.store(canvas.capture_state());

        let snapshot = canvas.capture_state();
        history.undo(&mut canvas, &registries).expect("undo");
        history.redo(&mut canvas, &registries).expect("redo");
        assert_eq!(canvas.capture_state(), snapshot);
    }

    #[test]
    fn test_undo_with_unregistered_kind_resets_history() {
        let registries = registries();
        let empty_registries = EditorRegistries::new();
        let mut canvas = GraphCanvas::new();
        float_node(&mut canvas, 0.0, 0.0);

        let mut history = HistoryStack::new(canvas.capture_state());
        float_node(&mut canvas, 200.0, 0.0);
        history.store(canvas.capture_state());

        // Applying against registries that know nothing must not leave a
        // half-valid stack behind.
        assert!(history.undo(&mut canvas, &empty_registries).is_err());
        assert!(!history.can_undo());
        assert!(!history.can_redo());

        // A fresh stack over working registries still functions.
        let mut history = HistoryStack::new(canvas.capture_state());
        let node_id = canvas.nodes().next().expect("node").id;
        canvas.node_mut(node_id).expect("node").position =
            Pos2::new(50.0, 50.0);
        history.store(canvas.capture_state());
        assert!(history.undo(&mut canvas, &registries).is_ok());
    }

    #[test]
    fn test_paste_creates_fresh_ids_and_drops_boundary_links() {
        let registries = registries();
        let mut canvas = GraphCanvas::new();
        let feed_a = float_node(&mut canvas, 0.0, 0.0);
        let feed_b = float_node(&mut canvas, 0.0, 200.0);
        let mix = add_node_kind(&mut canvas, 300.0, 100.0);
        let outside =
            canvas.add_node(Node::new(Box::new(MaterialOutput::default())).with_position(600.0, 100.0));

        canvas
            .connect(out0(&canvas, feed_a), in_port(&canvas, mix, 0))
            .expect("internal 1");
        canvas
            .connect(out0(&canvas, feed_b), in_port(&canvas, mix, 1))
            .expect("internal 2");
        // This one crosses the selection boundary and must not be copied.
        canvas
            .connect(out0(&canvas, mix), in_port(&canvas, outside, 1))
            .expect("boundary");

        canvas.selection.nodes.extend([feed_a, feed_b, mix]);
        let clipboard = canvas.copy_selection();
        assert_eq!(clipboard.nodes.len(), 3);
        assert_eq!(clipboard.links.len(), 2);

        let pasted = canvas.paste(&clipboard, &registries, Pos2::new(50.0, 50.0));
        assert_eq!(pasted.len(), 3);
        assert_eq!(canvas.node_count(), 7);
        // 3 original links + 2 recreated internal links.
        assert_eq!(canvas.link_count(), 5);
        for new_id in &pasted {
            assert!(![feed_a, feed_b, mix, outside].contains(new_id));
        }
        // No pasted link touches an original node.
        let originals = [feed_a, feed_b, mix];
        let new_links: Vec<&Link> = canvas
            .links()
            .filter(|l| pasted.contains(&l.from_node) || pasted.contains(&l.to_node))
            .collect();
        assert_eq!(new_links.len(), 2);
        for link in new_links {
            assert!(!originals.contains(&link.from_node));
            assert!(link.to_node != outside);
        }
    }

    #[test]
    fn test_frame_collapse_carries_crossing_link_and_expand_restores() {
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        let b = add_node_kind(&mut canvas, 300.0, 0.0);
        let c =
            canvas.add_node(Node::new(Box::new(MaterialOutput::default())).with_position(700.0, 0.0));

        canvas
            .connect(out0(&canvas, a), in_port(&canvas, b, 0))
            .expect("interior link");
        let crossing = canvas
            .connect(out0(&canvas, b), in_port(&canvas, c, 1))
            .expect("crossing link");

        canvas.selection.nodes.extend([a, b]);
        let frame_id = canvas
            .create_frame_around_selection("Group")
            .expect("frame");
        let members_before = canvas.frame(frame_id).expect("frame").nodes.clone();

        canvas.collapse_frame(frame_id);
        let frame = canvas.frame(frame_id).expect("frame");
        assert!(frame.collapsed);
        // Exactly one boundary marker, carrying the crossing link's source.
        assert!(frame.input_ports.is_empty());
        assert_eq!(frame.output_ports.len(), 1);
        assert_eq!(frame.output_ports[0].inner, out0(&canvas, b));
        assert!(!canvas.is_node_visible(a));
        // The crossing link now attaches to the frame boundary.
        let (from, _) = geometry::link_endpoints(&canvas, canvas.link(crossing).expect("link"))
            .expect("routed");
        assert_eq!(
            from,
            frame.frame_port_anchor(&frame.output_ports[0])
        );

        canvas.expand_frame(frame_id);
        let frame = canvas.frame(frame_id).expect("frame");
        assert!(!frame.collapsed);
        assert!(frame.output_ports.is_empty());
        assert_eq!(frame.nodes, members_before);
        assert_eq!(canvas.link_count(), 2);
        assert_eq!(
            canvas.link(crossing).expect("link").from_port,
            out0(&canvas, b)
        );
    }

    #[test]
    fn test_frame_capture_restore_preserves_proxy_identity() {
        let registries = registries();
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        let b = add_node_kind(&mut canvas, 700.0, 0.0);
        canvas
            .connect(out0(&canvas, a), in_port(&canvas, b, 0))
            .expect("link");
        canvas.selection.nodes.insert(a);
        let frame_id = canvas.create_frame_around_selection("Inner").expect("frame");
        canvas.collapse_frame(frame_id);
        let proxies_before = canvas.frame(frame_id).expect("frame").output_ports.clone();

        let state = canvas.capture_state();
        canvas.restore_state(&state, &registries).expect("restore");
        let frame = canvas.frame(frame_id).expect("frame survives");
        assert!(frame.collapsed);
        assert_eq!(frame.output_ports, proxies_before);
        assert_eq!(canvas.capture_state(), state);
    }

    #[test]
    fn test_frame_move_wins_over_member_selection() {
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 100.0, 100.0);
        canvas.selection.nodes.insert(a);
        let frame_id = canvas.create_frame_around_selection("Group").expect("frame");

        // Frame and its node both independently selected for the move.
        canvas.selection.nodes.insert(a);
        canvas.selection.frames.insert(frame_id);
        canvas.move_selection(Vec2::new(10.0, 0.0));

        // Moved once with the frame, not once more as a loose node.
        assert_eq!(
            canvas.node(a).expect("node").position,
            Pos2::new(110.0, 100.0)
        );
    }

    #[test]
    fn test_exposed_port_requires_enclosure() {
        let mut canvas = GraphCanvas::new();
        let loose = float_node(&mut canvas, 0.0, 0.0);
        let port = out0(&canvas, loose);
        assert!(!canvas.set_port_exposed(port, true, 0));

        canvas.selection.nodes.insert(loose);
        canvas.create_frame_around_selection("Group").expect("frame");
        assert!(canvas.set_port_exposed(port, true, 0));
        assert!(canvas.find_port(port).expect("port").1.exposed_on_frame);
    }

    #[test]
    fn test_exposed_port_appears_on_band_without_links() {
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        canvas.selection.nodes.insert(a);
        let frame_id = canvas.create_frame_around_selection("Group").expect("frame");
        canvas.set_port_exposed(out0(&canvas, a), true, 0);

        canvas.collapse_frame(frame_id);
        let frame = canvas.frame(frame_id).expect("frame");
        assert_eq!(frame.output_ports.len(), 1);
        assert_eq!(frame.output_ports[0].inner, out0(&canvas, a));
    }

    #[test]
    fn test_focus_mode_hides_everything_else() {
        let mut canvas = GraphCanvas::new();
        let inside = float_node(&mut canvas, 0.0, 0.0);
        let outside = float_node(&mut canvas, 900.0, 0.0);
        canvas.selection.nodes.insert(inside);
        let frame_id = canvas.create_frame_around_selection("Focus").expect("frame");

        canvas.enter_focus(frame_id);
        assert!(canvas.is_node_visible(inside));
        assert!(!canvas.is_node_visible(outside));
        assert!(canvas.is_frame_visible(frame_id));

        canvas.exit_focus();
        assert!(canvas.is_node_visible(outside));
    }

    #[test]
    fn test_auto_arrange_orders_by_dependency_depth() {
        let mut canvas = GraphCanvas::new();
        let sink = add_node_kind(&mut canvas, 0.0, 0.0);
        let source = float_node(&mut canvas, 800.0, 0.0);
        canvas
            .connect(out0(&canvas, source), in_port(&canvas, sink, 0))
            .expect("link");

        canvas.auto_arrange();
        let source_x = canvas.node(source).expect("node").position.x;
        let sink_x = canvas.node(sink).expect("node").position.x;
        assert!(source_x < sink_x);
    }

    #[test]
    fn test_zoom_to_fit_centers_content() {
        let mut canvas = GraphCanvas::new();
        float_node(&mut canvas, 1000.0, 1000.0);
        let viewport = Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 600.0));
        canvas.zoom_to_fit(viewport);

        // The content center maps to the viewport center.
        let content_center = Pos2::new(1000.0 + geometry::NODE_WIDTH / 2.0, 1027.0);
        let mapped = canvas.camera.graph_to_screen(content_center, viewport);
        assert!((mapped - viewport.center()).length() < 1.0);
    }

    #[test]
    fn test_removing_frame_orphans_but_keeps_nodes() {
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        canvas.selection.nodes.insert(a);
        let frame_id = canvas.create_frame_around_selection("Gone").expect("frame");
        canvas.set_port_exposed(out0(&canvas, a), true, 0);

        canvas.remove_frame(frame_id);
        let node = canvas.node(a).expect("node survives");
        assert!(node.frame.is_none());
        // Exposure is only legal while enclosed.
        assert!(!node.outputs[0].exposed_on_frame);
    }
}
