// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pointer/keyboard interaction state machine.
//!
//! All gestures are driven by graph-space pointer positions, so the machine
//! is independent of the render layer and fully testable headless. Every
//! drag mode re-enters `Idle` on pointer-up; releasing outside a valid
//! target aborts the gesture without touching the model.

use crate::canvas::GraphCanvas;
use crate::frame::ResizeHandle;
use crate::geometry::{self, HitTarget};
use crate::id::{FrameId, LinkId, NodeId, PortId};
use crate::port::PortDirection;
use egui::{Pos2, Rect, Vec2};

/// Modifier keys held during a pointer event
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    /// Additive multi-select
    pub shift: bool,
    /// Force a marquee even over objects
    pub alt: bool,
    /// Command modifier (copy/paste, undo)
    pub ctrl: bool,
}

/// Mouse button of a pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Left button
    Primary,
    /// Right button
    Secondary,
    /// Wheel button
    Middle,
}

/// Active gesture of the canvas
#[derive(Debug, Clone)]
pub enum DragMode {
    /// No gesture in progress
    Idle,
    /// Dragging the camera
    Panning,
    /// Marquee selection
    BoxSelecting {
        /// Anchor corner
        start: Pos2,
        /// Pointer corner
        current: Pos2,
        /// Keep the prior selection
        additive: bool,
    },
    /// Moving the selected nodes (and selected frames)
    DraggingNodes {
        /// The node the gesture started on
        grabbed: NodeId,
        /// Last pointer position
        last: Pos2,
        /// Whether any movement happened
        moved: bool,
    },
    /// Moving one frame with its contents
    DraggingFrame {
        /// The frame being moved
        frame: FrameId,
        /// Last pointer position
        last: Pos2,
        /// Whether any movement happened
        moved: bool,
    },
    /// Dragging a frame resize handle
    ResizingFrame {
        /// The frame being resized
        frame: FrameId,
        /// The handle grabbed
        handle: ResizeHandle,
        /// Last pointer position
        last: Pos2,
    },
    /// A candidate link following the pointer
    DrawingLink {
        /// Port the gesture started on
        from: PortId,
        /// Its direction (decides candidate orientation)
        direction: PortDirection,
        /// Pointer position the candidate ends at
        current: Pos2,
    },
    /// Scaling the arrangement of the selected nodes
    ResizingSelection {
        /// Fixed corner opposite the grabbed handle
        anchor: Pos2,
        /// Grabbed corner at gesture start
        grabbed: Pos2,
        /// Node positions at gesture start
        start_positions: Vec<(NodeId, Pos2)>,
    },
}

/// Interaction state for one canvas
pub struct InteractionState {
    /// Current gesture
    pub mode: DragMode,
}

impl InteractionState {
    /// Create an idle machine
    pub fn new() -> Self {
        Self {
            mode: DragMode::Idle,
        }
    }

    /// Abort the in-progress gesture without mutating the model
    pub fn cancel(&mut self) {
        self.mode = DragMode::Idle;
    }

    /// Classify and react to a pointer press
    pub fn pointer_down(
        &mut self,
        canvas: &mut GraphCanvas,
        pos: Pos2,
        button: PointerButton,
        modifiers: Modifiers,
    ) {
        if button == PointerButton::Middle {
            self.mode = DragMode::Panning;
            return;
        }
        if button != PointerButton::Primary {
            return;
        }

        if modifiers.alt {
            self.mode = DragMode::BoxSelecting {
                start: pos,
                current: pos,
                additive: modifiers.shift,
            };
            return;
        }

        match geometry::hit_test(canvas, pos) {
            HitTarget::SelectionHandle(handle) => {
                if let Some(bounds) = geometry::selection_bounds(canvas) {
                    let (anchor, grabbed) = match handle {
                        ResizeHandle::SE => (bounds.min, bounds.max),
                        ResizeHandle::NW => (bounds.max, bounds.min),
                        ResizeHandle::NE => (
                            Pos2::new(bounds.min.x, bounds.max.y),
                            Pos2::new(bounds.max.x, bounds.min.y),
                        ),
                        _ => (
                            Pos2::new(bounds.max.x, bounds.min.y),
                            Pos2::new(bounds.min.x, bounds.max.y),
                        ),
                    };
                    let start_positions = canvas
                        .nodes()
                        .filter(|n| canvas.selection.nodes.contains(&n.id))
                        .map(|n| (n.id, n.position))
                        .collect();
                    self.mode = DragMode::ResizingSelection {
                        anchor,
                        grabbed,
                        start_positions,
                    };
                }
            }
            HitTarget::FrameHandle(frame, handle) => {
                self.mode = DragMode::ResizingFrame {
                    frame,
                    handle,
                    last: pos,
                };
            }
            HitTarget::Port(_, port, direction) => {
                self.mode = DragMode::DrawingLink {
                    from: port,
                    direction,
                    current: pos,
                };
            }
            HitTarget::FramePortMarker(frame, proxy) => {
                if let Some(inner) = canvas.resolve_frame_port(frame, proxy) {
                    if let Some((_, port)) = canvas.find_port(inner) {
                        self.mode = DragMode::DrawingLink {
                            from: inner,
                            direction: port.direction,
                            current: pos,
                        };
                    }
                }
            }
            HitTarget::NodeBody(node) => {
                if !canvas.selection.nodes.contains(&node) {
                    canvas.select_node(node, modifiers.shift);
                }
                self.mode = DragMode::DraggingNodes {
                    grabbed: node,
                    last: pos,
                    moved: false,
                };
            }
            HitTarget::FrameHeader(frame) | HitTarget::FrameBody(frame) => {
                if !canvas.selection.frames.contains(&frame) {
                    canvas.select_frame(frame, modifiers.shift);
                }
                self.mode = DragMode::DraggingFrame {
                    frame,
                    last: pos,
                    moved: false,
                };
            }
            HitTarget::Link(link) => {
                canvas.select_link(link, modifiers.shift);
            }
            HitTarget::Empty => {
                if !modifiers.shift {
                    canvas.clear_selection();
                }
                self.mode = DragMode::BoxSelecting {
                    start: pos,
                    current: pos,
                    additive: modifiers.shift,
                };
            }
        }
    }

    /// Advance the active gesture to a new pointer position.
    ///
    /// `screen_delta` is the raw pointer movement; only panning needs it.
    pub fn pointer_moved(&mut self, canvas: &mut GraphCanvas, pos: Pos2, screen_delta: Vec2) {
        match &mut self.mode {
            DragMode::Idle => {}
            DragMode::Panning => {
                canvas.camera.offset += screen_delta / canvas.camera.zoom;
            }
            DragMode::BoxSelecting { current, .. } => {
                *current = pos;
            }
            DragMode::DraggingNodes { last, moved, .. } => {
                let delta = pos - *last;
                *last = pos;
                if delta != Vec2::ZERO {
                    *moved = true;
                    canvas.move_selection(delta);
                }
            }
            DragMode::DraggingFrame { frame, last, moved } => {
                let delta = pos - *last;
                *last = pos;
                if delta != Vec2::ZERO {
                    *moved = true;
                    let frame = *frame;
                    canvas.translate_frame(frame, delta);
                }
            }
            DragMode::ResizingFrame { frame, handle, last } => {
                let delta = pos - *last;
                *last = pos;
                let (frame, handle) = (*frame, *handle);
                canvas.resize_frame(frame, handle, delta);
            }
            DragMode::DrawingLink { current, .. } => {
                *current = pos;
            }
            DragMode::ResizingSelection {
                anchor,
                grabbed,
                start_positions,
            } => {
                let span = *grabbed - *anchor;
                let scale_x = if span.x.abs() > f32::EPSILON {
                    ((pos.x - anchor.x) / span.x).max(0.1)
                } else {
                    1.0
                };
                let scale_y = if span.y.abs() > f32::EPSILON {
                    ((pos.y - anchor.y) / span.y).max(0.1)
                } else {
                    1.0
                };
                let moves: Vec<(NodeId, Pos2)> = start_positions
                    .iter()
                    .map(|(id, start)| {
                        (
                            *id,
                            Pos2::new(
                                anchor.x + (start.x - anchor.x) * scale_x,
                                anchor.y + (start.y - anchor.y) * scale_y,
                            ),
                        )
                    })
                    .collect();
                for (node_id, position) in moves {
                    if let Some(node) = canvas.node_mut(node_id) {
                        node.position = position;
                    }
                }
            }
        }
    }

    /// Finish the active gesture. All modes re-enter `Idle`.
    pub fn pointer_up(&mut self, canvas: &mut GraphCanvas, pos: Pos2) {
        let mode = std::mem::replace(&mut self.mode, DragMode::Idle);
        match mode {
            DragMode::Idle | DragMode::Panning => {}

            DragMode::BoxSelecting {
                start,
                current: _,
                additive,
            } => {
                let rect = Rect::from_two_pos(start, pos);
                if !additive {
                    canvas.selection.nodes.clear();
                }
                let picked: Vec<NodeId> = canvas
                    .nodes()
                    .filter(|n| {
                        canvas.is_node_visible(n.id) && rect.intersects(geometry::node_rect(n))
                    })
                    .map(|n| n.id)
                    .collect();
                canvas.selection.nodes.extend(picked);
                canvas.events.on_selection_changed.notify(&());
            }

            DragMode::DraggingNodes { grabbed, moved, .. } => {
                if !moved {
                    return;
                }
                self.snap_selection(canvas);
                // Smart add: a single dropped node can splice into a link
                // or chain after the node it was dropped on.
                if canvas.selection.nodes.len() == 1 {
                    if let Some(link) = self.drop_target_link(canvas, grabbed, pos) {
                        if let Err(err) = canvas.splice_into_link(grabbed, link) {
                            tracing::debug!("splice rejected: {err}");
                        }
                    } else if let Some(over) = self.drop_target_node(canvas, pos) {
                        if let Err(err) = canvas.insert_after_node(over, grabbed) {
                            tracing::debug!("chain rejected: {err}");
                        }
                    }
                }
                canvas.request_store();
            }

            DragMode::DraggingFrame { frame, moved, .. } => {
                if !moved {
                    return;
                }
                if let Some(origin) = canvas.frame(frame).map(|f| f.bounds.min) {
                    let snapped = geometry::snap_floor(origin, canvas.grid_size);
                    canvas.translate_frame(frame, snapped - origin);
                }
                canvas.request_store();
            }

            DragMode::ResizingFrame { .. } | DragMode::ResizingSelection { .. } => {
                canvas.request_store();
            }

            DragMode::DrawingLink { from, .. } => {
                let target = match geometry::hit_test(canvas, pos) {
                    HitTarget::Port(_, port, _) => Some(port),
                    HitTarget::FramePortMarker(frame, proxy) => {
                        canvas.resolve_frame_port(frame, proxy)
                    }
                    _ => None,
                };
                // No valid target: the candidate is discarded untouched.
                let Some(target) = target else {
                    return;
                };
                if target == from {
                    return;
                }
                let compatibility = canvas.check_compatibility(from, target);
                if !compatibility.is_compatible() {
                    canvas.events.on_log.notify(
                        &crate::events::LogEntry::warning(compatibility.message().to_string()),
                    );
                    return;
                }
                match canvas.connect(from, target) {
                    Ok(_) => canvas.request_store(),
                    Err(err) => {
                        canvas
                            .events
                            .on_log
                            .notify(&crate::events::LogEntry::warning(err.to_string()));
                    }
                }
            }
        }
    }

    /// Floor-snap the dropped selection onto the grid
    fn snap_selection(&self, canvas: &mut GraphCanvas) {
        let grid = canvas.grid_size;
        let ids: Vec<NodeId> = canvas.selection.nodes.iter().copied().collect();
        for node_id in ids {
            if let Some(node) = canvas.node_mut(node_id) {
                node.position = geometry::snap_floor(node.position, grid);
            }
        }
        let frames: Vec<FrameId> = canvas.selection.frames.iter().copied().collect();
        for frame_id in frames {
            if let Some(origin) = canvas.frame(frame_id).map(|f| f.bounds.min) {
                let snapped = geometry::snap_floor(origin, grid);
                canvas.translate_frame(frame_id, snapped - origin);
            }
        }
    }

    /// Topmost visible link under the pointer not touching the dragged node
    fn drop_target_link(
        &self,
        canvas: &GraphCanvas,
        dragged: NodeId,
        pos: Pos2,
    ) -> Option<LinkId> {
        for link in canvas.links() {
            if !link.visible || link.involves_node(dragged) {
                continue;
            }
            if let Some((from, to)) = geometry::link_endpoints(canvas, link) {
                let near = geometry::link_path(from, to)
                    .windows(2)
                    .any(|pair| dist_to_segment(pos, pair[0], pair[1]) <= geometry::LINK_HIT_DISTANCE * 2.0);
                if near {
                    return Some(link.id);
                }
            }
        }
        None
    }

    /// Topmost visible unselected node under the pointer
    fn drop_target_node(&self, canvas: &GraphCanvas, pos: Pos2) -> Option<NodeId> {
        canvas
            .nodes()
            .rev()
            .find(|n| {
                !canvas.selection.nodes.contains(&n.id)
                    && canvas.is_node_visible(n.id)
                    && geometry::node_rect(n).contains(pos)
            })
            .map(|n| n.id)
    }

    /// Toggle collapse on double-clicked frames and nodes
    pub fn double_click(&mut self, canvas: &mut GraphCanvas, pos: Pos2) {
        match geometry::hit_test(canvas, pos) {
            HitTarget::FrameHeader(frame) => {
                let collapsed = canvas.frame(frame).map(|f| f.collapsed);
                match collapsed {
                    Some(true) => canvas.expand_frame(frame),
                    Some(false) => canvas.collapse_frame(frame),
                    None => {}
                }
                canvas.request_store();
            }
            HitTarget::NodeBody(node) => {
                if let Some(node) = canvas.node_mut(node) {
                    node.collapsed = !node.collapsed;
                }
                canvas.request_store();
            }
            _ => {}
        }
    }
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new()
    }
}

fn dist_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{Add, FloatValue};
    use crate::node::Node;
    use std::cell::Cell;
    use std::rc::Rc;

    fn float_node(canvas: &mut GraphCanvas, x: f32, y: f32) -> NodeId {
        canvas.add_node(Node::new(Box::new(FloatValue::default())).with_position(x, y))
    }

    fn output_port(canvas: &GraphCanvas, node: NodeId) -> PortId {
        canvas.node(node).expect("node").outputs[0].id
    }

    #[test]
    fn test_drag_moves_and_floor_snaps() {
        let mut canvas = GraphCanvas::new();
        let node = float_node(&mut canvas, 0.0, 0.0);
        let mut machine = InteractionState::new();

        let grab = Pos2::new(10.0, 10.0);
        machine.pointer_down(&mut canvas, grab, PointerButton::Primary, Modifiers::default());
        machine.pointer_moved(&mut canvas, Pos2::new(63.0, 51.0), Vec2::ZERO);
        machine.pointer_up(&mut canvas, Pos2::new(63.0, 51.0));

        let position = canvas.node(node).expect("node").position;
        // Moved by (53, 41), then floored onto the 20-unit grid.
        assert_eq!(position, Pos2::new(40.0, 40.0));
        assert!(matches!(machine.mode, DragMode::Idle));
    }

    #[test]
    fn test_drag_emits_store_request() {
        let mut canvas = GraphCanvas::new();
        float_node(&mut canvas, 0.0, 0.0);
        let stored = Rc::new(Cell::new(false));
        let stored_obs = Rc::clone(&stored);
        canvas.events.on_store_required.add(move |()| stored_obs.set(true));

        let mut machine = InteractionState::new();
        machine.pointer_down(
            &mut canvas,
            Pos2::new(10.0, 10.0),
            PointerButton::Primary,
            Modifiers::default(),
        );
        machine.pointer_moved(&mut canvas, Pos2::new(100.0, 10.0), Vec2::ZERO);
        machine.pointer_up(&mut canvas, Pos2::new(100.0, 10.0));
        assert!(stored.get());
    }

    #[test]
    fn test_marquee_selects_contained_nodes() {
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        let b = float_node(&mut canvas, 300.0, 0.0);
        let far = float_node(&mut canvas, 2000.0, 2000.0);

        let mut machine = InteractionState::new();
        machine.pointer_down(
            &mut canvas,
            Pos2::new(-50.0, -50.0),
            PointerButton::Primary,
            Modifiers::default(),
        );
        machine.pointer_moved(&mut canvas, Pos2::new(600.0, 200.0), Vec2::ZERO);
        machine.pointer_up(&mut canvas, Pos2::new(600.0, 200.0));

        assert!(canvas.selection.nodes.contains(&a));
        assert!(canvas.selection.nodes.contains(&b));
        assert!(!canvas.selection.nodes.contains(&far));
    }

    #[test]
    fn test_candidate_link_commits_on_compatible_port() {
        let mut canvas = GraphCanvas::new();
        let source = float_node(&mut canvas, 0.0, 0.0);
        let sink = canvas.add_node(Node::new(Box::new(Add::default())).with_position(400.0, 0.0));

        let from_anchor = geometry::port_anchor(
            canvas.node(source).expect("node"),
            output_port(&canvas, source),
        )
        .expect("anchor");
        let to_anchor = geometry::port_anchor(
            canvas.node(sink).expect("node"),
            canvas.node(sink).expect("node").inputs[0].id,
        )
        .expect("anchor");

        let mut machine = InteractionState::new();
        machine.pointer_down(&mut canvas, from_anchor, PointerButton::Primary, Modifiers::default());
        assert!(matches!(machine.mode, DragMode::DrawingLink { .. }));
        machine.pointer_moved(&mut canvas, to_anchor, Vec2::ZERO);
        machine.pointer_up(&mut canvas, to_anchor);

        assert_eq!(canvas.link_count(), 1);
        let link = canvas.links().next().expect("link");
        assert_eq!(link.from_node, source);
        assert_eq!(link.to_node, sink);
    }

    #[test]
    fn test_candidate_link_discarded_over_empty_canvas() {
        let mut canvas = GraphCanvas::new();
        let source = float_node(&mut canvas, 0.0, 0.0);
        let from_anchor = geometry::port_anchor(
            canvas.node(source).expect("node"),
            output_port(&canvas, source),
        )
        .expect("anchor");

        let mut machine = InteractionState::new();
        machine.pointer_down(&mut canvas, from_anchor, PointerButton::Primary, Modifiers::default());
        machine.pointer_moved(&mut canvas, Pos2::new(900.0, 900.0), Vec2::ZERO);
        machine.pointer_up(&mut canvas, Pos2::new(900.0, 900.0));

        assert_eq!(canvas.link_count(), 0);
        assert!(matches!(machine.mode, DragMode::Idle));
    }

    #[test]
    fn test_incompatible_release_logs_and_discards() {
        let mut canvas = GraphCanvas::new();
        let tex = canvas.add_node(
            Node::new(Box::new(crate::kinds::TextureSample::default())).with_position(0.0, 0.0),
        );
        let sink = canvas.add_node(
            Node::new(Box::new(crate::kinds::MaterialOutput::default()))
                .with_position(400.0, 0.0),
        );
        // "Alpha" (Float) cannot feed "Normal" (Vector3).
        let alpha = canvas.node(tex).expect("node").outputs[1].id;
        let normal = canvas.node(sink).expect("node").inputs[3].id;

        let logged = Rc::new(Cell::new(false));
        let logged_obs = Rc::clone(&logged);
        canvas.events.on_log.add(move |_| logged_obs.set(true));

        let from_anchor =
            geometry::port_anchor(canvas.node(tex).expect("node"), alpha).expect("anchor");
        let to_anchor =
            geometry::port_anchor(canvas.node(sink).expect("node"), normal).expect("anchor");

        let mut machine = InteractionState::new();
        machine.pointer_down(&mut canvas, from_anchor, PointerButton::Primary, Modifiers::default());
        machine.pointer_up(&mut canvas, to_anchor);

        assert_eq!(canvas.link_count(), 0);
        assert!(logged.get());
    }

    #[test]
    fn test_cancel_aborts_without_mutation() {
        let mut canvas = GraphCanvas::new();
        let node = float_node(&mut canvas, 0.0, 0.0);
        let before = canvas.node(node).expect("node").position;

        let mut machine = InteractionState::new();
        machine.pointer_down(
            &mut canvas,
            Pos2::new(10.0, 10.0),
            PointerButton::Primary,
            Modifiers::default(),
        );
        machine.cancel();
        assert!(matches!(machine.mode, DragMode::Idle));
        assert_eq!(canvas.node(node).expect("node").position, before);
    }

    #[test]
    fn test_dropping_node_on_link_splices_it() {
        let mut canvas = GraphCanvas::new();
        let source = float_node(&mut canvas, 0.0, 200.0);
        let sink = canvas.add_node(
            Node::new(Box::new(crate::kinds::MaterialOutput::default()))
                .with_position(600.0, 200.0),
        );
        let metallic = canvas.node(sink).expect("node").inputs[1].id;
        canvas
            .connect(output_port(&canvas, source), metallic)
            .expect("link");

        let inserted =
            canvas.add_node(Node::new(Box::new(Add::default())).with_position(0.0, 600.0));

        // Mid-point of the straight span between the two anchors lies on
        // the sampled curve.
        let from_anchor = geometry::port_anchor(
            canvas.node(source).expect("node"),
            output_port(&canvas, source),
        )
        .expect("anchor");
        let to_anchor =
            geometry::port_anchor(canvas.node(sink).expect("node"), metallic).expect("anchor");
        let midpoint = from_anchor + (to_anchor - from_anchor) / 2.0;

        let mut machine = InteractionState::new();
        let grab = canvas.node(inserted).expect("node").position + Vec2::new(10.0, 10.0);
        machine.pointer_down(&mut canvas, grab, PointerButton::Primary, Modifiers::default());
        machine.pointer_moved(&mut canvas, midpoint, Vec2::ZERO);
        machine.pointer_up(&mut canvas, midpoint);

        // Original link replaced by source→Add and Add→sink.
        assert_eq!(canvas.link_count(), 2);
        assert!(canvas
            .links()
            .any(|l| l.from_node == source && l.to_node == inserted));
        assert!(canvas
            .links()
            .any(|l| l.from_node == inserted && l.to_node == sink));
    }

    #[test]
    fn test_selection_scaling_spreads_nodes() {
        let mut canvas = GraphCanvas::new();
        let a = float_node(&mut canvas, 0.0, 0.0);
        let b = float_node(&mut canvas, 200.0, 100.0);
        canvas.selection.nodes.insert(a);
        canvas.selection.nodes.insert(b);

        let bounds = geometry::selection_bounds(&canvas).expect("bounds");
        let mut machine = InteractionState::new();
        machine.pointer_down(
            &mut canvas,
            bounds.max,
            PointerButton::Primary,
            Modifiers::default(),
        );
        assert!(matches!(machine.mode, DragMode::ResizingSelection { .. }));

        // Pull the south-east handle outward to double the spread.
        let target = bounds.min + (bounds.max - bounds.min) * 2.0;
        machine.pointer_moved(&mut canvas, target, Vec2::ZERO);
        machine.pointer_up(&mut canvas, target);

        let pos_b = canvas.node(b).expect("node").position;
        assert!(pos_b.x > 350.0);
    }
}
