// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canvas geometry: layout metrics, camera transforms, grid snapping and
//! pointer-target classification.
//!
//! Everything here works in graph space so the interaction machine can be
//! driven (and tested) without a UI context; the render layer converts to
//! screen space at the edge.

use crate::canvas::GraphCanvas;
use crate::frame::ResizeHandle;
use crate::id::{FrameId, LinkId, NodeId, PortId};
use crate::link::Link;
use crate::node::Node;
use crate::port::PortDirection;
use egui::{Pos2, Rect, Vec2};

/// Node body width
pub const NODE_WIDTH: f32 = 180.0;
/// Node header height
pub const NODE_HEADER_HEIGHT: f32 = 24.0;
/// Vertical advance per port row
pub const PORT_HEIGHT: f32 = 22.0;
/// Port marker radius
pub const PORT_RADIUS: f32 = 6.0;
/// Pointer pick radius around a port anchor
pub const PORT_HIT_RADIUS: f32 = 9.0;
/// Pointer pick distance from a link curve
pub const LINK_HIT_DISTANCE: f32 = 6.0;
/// Side length of frame/selection resize handles
pub const HANDLE_SIZE: f32 = 10.0;
/// Horizontal reach of link control points
pub const BEZIER_CURVATURE: f32 = 50.0;
/// Default grid cell size
pub const GRID_SIZE: f32 = 20.0;
/// Lower zoom bound
pub const MIN_ZOOM: f32 = 0.1;
/// Upper zoom bound
pub const MAX_ZOOM: f32 = 4.0;

/// Pan/zoom state of one canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Pan offset in graph units
    pub offset: Vec2,
    /// Zoom factor, clamped to `[MIN_ZOOM, MAX_ZOOM]`
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    /// Convert a graph position to screen space
    pub fn graph_to_screen(&self, pos: Pos2, viewport: Rect) -> Pos2 {
        let center = viewport.center();
        Pos2::new(
            (pos.x + self.offset.x) * self.zoom + center.x,
            (pos.y + self.offset.y) * self.zoom + center.y,
        )
    }

    /// Convert a screen position to graph space
    pub fn screen_to_graph(&self, pos: Pos2, viewport: Rect) -> Pos2 {
        let center = viewport.center();
        Pos2::new(
            (pos.x - center.x) / self.zoom - self.offset.x,
            (pos.y - center.y) / self.zoom - self.offset.y,
        )
    }

    /// Zoom by a factor, keeping the graph point under the pointer fixed
    pub fn zoom_at(&mut self, anchor: Pos2, factor: f32) {
        let old_zoom = self.zoom;
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let ratio = self.zoom / old_zoom;
        if ratio != 1.0 {
            self.offset = Vec2::new(
                (anchor.x + self.offset.x) / ratio - anchor.x,
                (anchor.y + self.offset.y) / ratio - anchor.y,
            );
        }
    }
}

/// Snap a position down onto the grid (normal drops)
pub fn snap_floor(pos: Pos2, grid: f32) -> Pos2 {
    Pos2::new((pos.x / grid).floor() * grid, (pos.y / grid).floor() * grid)
}

/// Snap a position up onto the grid — used when a drop must not land back
/// on the origin cell (paste, splice drops)
pub fn snap_ceil(pos: Pos2, grid: f32) -> Pos2 {
    Pos2::new((pos.x / grid).ceil() * grid, (pos.y / grid).ceil() * grid)
}

/// Body rect of a node (header only while collapsed)
pub fn node_rect(node: &Node) -> Rect {
    let height = if node.collapsed {
        NODE_HEADER_HEIGHT
    } else {
        let rows = node.inputs.len().max(node.outputs.len());
        NODE_HEADER_HEIGHT + rows as f32 * PORT_HEIGHT + 8.0
    };
    Rect::from_min_size(node.position, Vec2::new(NODE_WIDTH, height))
}

/// Anchor of a node port in graph space.
///
/// Collapsed nodes gather all anchors at the header edge midpoints.
pub fn port_anchor(node: &Node, port_id: PortId) -> Option<Pos2> {
    let header_mid = node.position.y + NODE_HEADER_HEIGHT / 2.0;
    if let Some(index) = node.inputs.iter().position(|p| p.id == port_id) {
        let y = if node.collapsed {
            header_mid
        } else {
            node.position.y + NODE_HEADER_HEIGHT + index as f32 * PORT_HEIGHT + PORT_HEIGHT / 2.0
        };
        return Some(Pos2::new(node.position.x, y));
    }
    if let Some(index) = node.outputs.iter().position(|p| p.id == port_id) {
        let y = if node.collapsed {
            header_mid
        } else {
            node.position.y + NODE_HEADER_HEIGHT + index as f32 * PORT_HEIGHT + PORT_HEIGHT / 2.0
        };
        return Some(Pos2::new(node.position.x + NODE_WIDTH, y));
    }
    None
}

/// Sample a cubic bezier into line segments
pub fn bezier_points(from: Pos2, ctrl1: Pos2, ctrl2: Pos2, to: Pos2, segments: usize) -> Vec<Pos2> {
    let mut points = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let t = i as f32 / segments as f32;
        let u = 1.0 - t;
        let point = Pos2::new(
            u * u * u * from.x + 3.0 * u * u * t * ctrl1.x + 3.0 * u * t * t * ctrl2.x + t * t * t * to.x,
            u * u * u * from.y + 3.0 * u * u * t * ctrl1.y + 3.0 * u * t * t * ctrl2.y + t * t * t * to.y,
        );
        points.push(point);
    }
    points
}

/// Sampled curve of a link between two anchors
pub fn link_path(from: Pos2, to: Pos2) -> Vec<Pos2> {
    let curvature = BEZIER_CURVATURE.min((to.x - from.x).abs() * 0.5);
    let ctrl1 = Pos2::new(from.x + curvature, from.y);
    let ctrl2 = Pos2::new(to.x - curvature, to.y);
    bezier_points(from, ctrl1, ctrl2, to, 24)
}

/// Resolve a link's drawn endpoints, delegating hidden interior ports to
/// their collapsed frame's boundary markers. Returns `None` when either
/// side is invisible (focus mode).
pub fn link_endpoints(canvas: &GraphCanvas, link: &Link) -> Option<(Pos2, Pos2)> {
    let from = endpoint_anchor(canvas, link.from_node, link.from_port)?;
    let to = endpoint_anchor(canvas, link.to_node, link.to_port)?;
    Some((from, to))
}

fn endpoint_anchor(canvas: &GraphCanvas, node_id: NodeId, port_id: PortId) -> Option<Pos2> {
    let node = canvas.node(node_id)?;
    if canvas.is_node_visible(node_id) {
        return port_anchor(node, port_id);
    }
    // Hidden inside a collapsed frame: route through the frame boundary.
    let frame = canvas.frame(node.frame?)?;
    if !canvas.is_frame_visible(frame.id) {
        return None;
    }
    let proxy = frame
        .input_ports
        .iter()
        .chain(frame.output_ports.iter())
        .find(|fp| fp.inner == port_id)?;
    Some(frame.frame_port_anchor(proxy))
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

/// What the pointer is over, in front-to-back priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTarget {
    /// Empty canvas
    Empty,
    /// A corner handle of the multi-selection bounds
    SelectionHandle(ResizeHandle),
    /// A frame resize handle
    FrameHandle(FrameId, ResizeHandle),
    /// A node port marker
    Port(NodeId, PortId, PortDirection),
    /// A node body
    NodeBody(NodeId),
    /// A frame-port marker on a collapsed frame boundary
    FramePortMarker(FrameId, PortId),
    /// A committed link curve
    Link(LinkId),
    /// A frame header band
    FrameHeader(FrameId),
    /// The interior of an expanded frame (not over a node)
    FrameBody(FrameId),
}

/// Bounds of the current node selection, if any
pub fn selection_bounds(canvas: &GraphCanvas) -> Option<Rect> {
    let mut bounds: Option<Rect> = None;
    for node in canvas.nodes() {
        if canvas.selection.nodes.contains(&node.id) {
            let rect = node_rect(node);
            bounds = Some(match bounds {
                Some(b) => b.union(rect),
                None => rect,
            });
        }
    }
    bounds
}

/// Classify the pointer-down target at a graph position.
pub fn hit_test(canvas: &GraphCanvas, pos: Pos2) -> HitTarget {
    // Selection scale handles, only offered for multi-node selections.
    if canvas.selection.nodes.len() > 1 {
        if let Some(bounds) = selection_bounds(canvas) {
            for handle in [
                ResizeHandle::NW,
                ResizeHandle::NE,
                ResizeHandle::SE,
                ResizeHandle::SW,
            ] {
                let corner = match handle {
                    ResizeHandle::NW => bounds.min,
                    ResizeHandle::NE => Pos2::new(bounds.max.x, bounds.min.y),
                    ResizeHandle::SE => bounds.max,
                    _ => Pos2::new(bounds.min.x, bounds.max.y),
                };
                if Rect::from_center_size(corner, Vec2::splat(HANDLE_SIZE)).contains(pos) {
                    return HitTarget::SelectionHandle(handle);
                }
            }
        }
    }

    for frame in canvas.frames().rev() {
        if !canvas.is_frame_visible(frame.id) || frame.collapsed {
            continue;
        }
        for handle in ResizeHandle::ALL {
            if frame.handle_rect(handle, HANDLE_SIZE).contains(pos) {
                return HitTarget::FrameHandle(frame.id, handle);
            }
        }
    }

    // Ports, then node bodies; latest-added node is topmost.
    for node in canvas.nodes().rev() {
        if !canvas.is_node_visible(node.id) {
            continue;
        }
        for port in node.ports() {
            if let Some(anchor) = port_anchor(node, port.id) {
                if (pos - anchor).length() <= PORT_HIT_RADIUS {
                    return HitTarget::Port(node.id, port.id, port.direction);
                }
            }
        }
        if node_rect(node).contains(pos) {
            return HitTarget::NodeBody(node.id);
        }
    }

    for frame in canvas.frames().rev() {
        if !canvas.is_frame_visible(frame.id) || !frame.collapsed {
            continue;
        }
        for proxy in frame.input_ports.iter().chain(frame.output_ports.iter()) {
            let anchor = frame.frame_port_anchor(proxy);
            if (pos - anchor).length() <= PORT_HIT_RADIUS {
                return HitTarget::FramePortMarker(frame.id, proxy.id);
            }
        }
    }

    for link in canvas.links() {
        if !link.visible {
            continue;
        }
        if let Some((from, to)) = link_endpoints(canvas, link) {
            let path = link_path(from, to);
            for pair in path.windows(2) {
                if dist_to_segment(pos, pair[0], pair[1]) <= LINK_HIT_DISTANCE {
                    return HitTarget::Link(link.id);
                }
            }
        }
    }

    for frame in canvas.frames().rev() {
        if !canvas.is_frame_visible(frame.id) {
            continue;
        }
        let header = Rect::from_min_size(
            frame.bounds.min,
            Vec2::new(frame.bounds.width(), crate::frame::FRAME_HEADER_HEIGHT),
        );
        if header.contains(pos) || (frame.collapsed && frame.bounds.contains(pos)) {
            return HitTarget::FrameHeader(frame.id);
        }
        if frame.bounds.contains(pos) {
            return HitTarget::FrameBody(frame.id);
        }
    }

    HitTarget::Empty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_keeps_anchor_fixed() {
        let viewport = Rect::from_min_size(Pos2::ZERO, Vec2::new(800.0, 600.0));
        let mut camera = Camera::default();
        camera.offset = Vec2::new(30.0, -12.0);

        let anchor_screen = Pos2::new(200.0, 150.0);
        let anchor_graph = camera.screen_to_graph(anchor_screen, viewport);
        camera.zoom_at(anchor_graph, 1.5);
        let after = camera.graph_to_screen(anchor_graph, viewport);
        assert!((after - anchor_screen).length() < 0.01);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut camera = Camera::default();
        camera.zoom_at(Pos2::ZERO, 1000.0);
        assert_eq!(camera.zoom, MAX_ZOOM);
        camera.zoom_at(Pos2::ZERO, 1e-6);
        assert_eq!(camera.zoom, MIN_ZOOM);
    }

    #[test]
    fn test_snap_floor_and_ceil() {
        let pos = Pos2::new(33.0, -7.0);
        assert_eq!(snap_floor(pos, 20.0), Pos2::new(20.0, -20.0));
        assert_eq!(snap_ceil(pos, 20.0), Pos2::new(40.0, 0.0));
        // A point on the grid stays put either way.
        let on_grid = Pos2::new(40.0, 60.0);
        assert_eq!(snap_floor(on_grid, 20.0), on_grid);
        assert_eq!(snap_ceil(on_grid, 20.0), on_grid);
    }

    #[test]
    fn test_screen_graph_round_trip() {
        let viewport = Rect::from_min_size(Pos2::new(10.0, 20.0), Vec2::new(640.0, 480.0));
        let mut camera = Camera::default();
        camera.offset = Vec2::new(-100.0, 50.0);
        camera.zoom = 2.0;
        let graph = Pos2::new(123.0, -45.0);
        let round = camera.screen_to_graph(camera.graph_to_screen(graph, viewport), viewport);
        assert!((round - graph).length() < 0.001);
    }
}
