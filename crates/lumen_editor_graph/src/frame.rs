// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame group containers.
//!
//! A frame owns a subset of nodes and can collapse to a single band. While
//! collapsed, interior ports that are exposed or carry a boundary-crossing
//! link are proxied by frame ports distributed over Top/Middle/Bottom band
//! slots, so external links attach to the frame edge instead of a hidden
//! node.

use crate::id::{FrameId, NodeId, PortId};
use crate::port::PortDirection;
use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Width of a collapsed frame band, independent of content
pub const COLLAPSED_FRAME_WIDTH: f32 = 220.0;
/// Height of a collapsed frame band
pub const COLLAPSED_FRAME_HEIGHT: f32 = 110.0;
/// Hard minimum frame width
pub const MIN_FRAME_WIDTH: f32 = 160.0;
/// Hard minimum frame height
pub const MIN_FRAME_HEIGHT: f32 = 120.0;
/// Per-line height reserved for comment text
pub const COMMENT_LINE_HEIGHT: f32 = 16.0;
/// Approximate character advance used to size comment text
pub const COMMENT_CHAR_WIDTH: f32 = 7.0;
/// Frame header band height
pub const FRAME_HEADER_HEIGHT: f32 = 28.0;

/// Vertical slot group along a collapsed frame edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
    /// Upper third of the band
    Top,
    /// Middle third
    Middle,
    /// Lower third
    Bottom,
}

impl Band {
    /// Distribute slot `index` of `total` into a band by thirds
    pub fn for_slot(index: usize, total: usize) -> Self {
        if total <= 1 {
            return Self::Middle;
        }
        let third = (total + 2) / 3;
        if index < third {
            Self::Top
        } else if index < total - third {
            Self::Middle
        } else {
            Self::Bottom
        }
    }
}

/// Proxy for an interior port, shown on a collapsed frame's boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePort {
    /// Unique id of the proxy marker itself
    pub id: PortId,
    /// The interior node port this marker delegates to
    pub inner: PortId,
    /// Side of the frame the marker sits on
    pub direction: PortDirection,
    /// Band group along the edge
    pub band: Band,
    /// Slot index within the full edge sequence
    pub slot: usize,
}

/// One of the eight compass resize handles on a frame border.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeHandle {
    /// Top edge
    N,
    /// Top-right corner
    NE,
    /// Right edge
    E,
    /// Bottom-right corner
    SE,
    /// Bottom edge
    S,
    /// Bottom-left corner
    SW,
    /// Left edge
    W,
    /// Top-left corner
    NW,
}

impl ResizeHandle {
    /// All handles, clockwise from north
    pub const ALL: [ResizeHandle; 8] = [
        Self::N,
        Self::NE,
        Self::E,
        Self::SE,
        Self::S,
        Self::SW,
        Self::W,
        Self::NW,
    ];

    /// Whether this handle moves the left edge
    pub fn affects_left(self) -> bool {
        matches!(self, Self::W | Self::NW | Self::SW)
    }

    /// Whether this handle moves the right edge
    pub fn affects_right(self) -> bool {
        matches!(self, Self::E | Self::NE | Self::SE)
    }

    /// Whether this handle moves the top edge
    pub fn affects_top(self) -> bool {
        matches!(self, Self::N | Self::NE | Self::NW)
    }

    /// Whether this handle moves the bottom edge
    pub fn affects_bottom(self) -> bool {
        matches!(self, Self::S | Self::SE | Self::SW)
    }
}

/// A resizable group container for nodes.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique frame ID
    pub id: FrameId,
    /// Title shown in the header
    pub name: String,
    /// Header/band tint
    pub color: [u8; 3],
    /// Current bounds in graph space (band bounds while collapsed)
    pub bounds: Rect,
    /// Whether the frame is collapsed to its band
    pub collapsed: bool,
    /// Ids of enclosed nodes
    pub nodes: BTreeSet<NodeId>,
    /// Input-side frame ports, present while collapsed
    pub input_ports: Vec<FramePort>,
    /// Output-side frame ports, present while collapsed
    pub output_ports: Vec<FramePort>,
    /// Free-form comment text displayed inside the frame
    pub comments: String,
    /// Bounds remembered across a collapse, restored on expand
    pub expanded_bounds: Option<Rect>,
}

impl Frame {
    /// Create an expanded frame with a fresh id
    pub fn new(name: impl Into<String>, bounds: Rect) -> Self {
        Self {
            id: FrameId::fresh(),
            name: name.into(),
            color: [90, 110, 140],
            bounds,
            collapsed: false,
            nodes: BTreeSet::new(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            comments: String::new(),
            expanded_bounds: None,
        }
    }

    /// Whether a node is enclosed by this frame
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains(&node_id)
    }

    /// Minimum size, grown to fit the displayed comment text
    pub fn min_size(&self) -> Vec2 {
        let mut width = MIN_FRAME_WIDTH;
        let mut height = MIN_FRAME_HEIGHT;
        if !self.comments.is_empty() {
            let lines = self.comments.lines().count().max(1);
            let longest = self
                .comments
                .lines()
                .map(str::len)
                .max()
                .unwrap_or(0);
            width = width.max(longest as f32 * COMMENT_CHAR_WIDTH + 24.0);
            height = height.max(FRAME_HEADER_HEIGHT + lines as f32 * COMMENT_LINE_HEIGHT + 24.0);
        }
        Vec2::new(width, height)
    }

    /// Move the frame band/bounds by a delta. Enclosed nodes are moved by
    /// the canvas, which owns them.
    pub fn translate(&mut self, delta: Vec2) {
        self.bounds = self.bounds.translate(delta);
        if let Some(expanded) = &mut self.expanded_bounds {
            *expanded = expanded.translate(delta);
        }
    }

    /// Drag one resize handle by a delta, clamped to the minimum size
    pub fn resize(&mut self, handle: ResizeHandle, delta: Vec2) {
        let min = self.min_size();
        let mut r = self.bounds;
        if handle.affects_left() {
            r.min.x = (r.min.x + delta.x).min(r.max.x - min.x);
        }
        if handle.affects_right() {
            r.max.x = (r.max.x + delta.x).max(r.min.x + min.x);
        }
        if handle.affects_top() {
            r.min.y = (r.min.y + delta.y).min(r.max.y - min.y);
        }
        if handle.affects_bottom() {
            r.max.y = (r.max.y + delta.y).max(r.min.y + min.y);
        }
        self.bounds = r;
    }

    /// Swap bounds to the collapsed band. Frame ports are computed by the
    /// canvas, which can see the links.
    pub(crate) fn apply_collapse(&mut self) {
        self.expanded_bounds = Some(self.bounds);
        self.bounds = Rect::from_min_size(
            self.bounds.min,
            Vec2::new(COLLAPSED_FRAME_WIDTH, COLLAPSED_FRAME_HEIGHT),
        );
        self.collapsed = true;
    }

    /// Restore the expanded bounds and drop the frame-port proxies
    pub(crate) fn apply_expand(&mut self) {
        if let Some(expanded) = self.expanded_bounds.take() {
            self.bounds = expanded;
        }
        self.collapsed = false;
        self.input_ports.clear();
        self.output_ports.clear();
    }

    /// Find a frame port (either side) by its proxy id
    pub fn frame_port(&self, proxy_id: PortId) -> Option<&FramePort> {
        self.input_ports
            .iter()
            .find(|p| p.id == proxy_id)
            .or_else(|| self.output_ports.iter().find(|p| p.id == proxy_id))
    }

    /// Anchor of a frame port marker on the collapsed band edge
    pub fn frame_port_anchor(&self, port: &FramePort) -> Pos2 {
        let side = match port.direction {
            PortDirection::Input => &self.input_ports,
            PortDirection::Output => &self.output_ports,
        };
        let total = side.len().max(1);
        let step = (self.bounds.height() - FRAME_HEADER_HEIGHT) / (total as f32 + 1.0);
        let y = self.bounds.min.y + FRAME_HEADER_HEIGHT + step * (port.slot as f32 + 1.0);
        let x = match port.direction {
            PortDirection::Input => self.bounds.min.x,
            PortDirection::Output => self.bounds.max.x,
        };
        Pos2::new(x, y)
    }

    /// Rect of one resize handle, in graph space
    pub fn handle_rect(&self, handle: ResizeHandle, size: f32) -> Rect {
        let r = self.bounds;
        let center = match handle {
            ResizeHandle::N => Pos2::new(r.center().x, r.min.y),
            ResizeHandle::NE => Pos2::new(r.max.x, r.min.y),
            ResizeHandle::E => Pos2::new(r.max.x, r.center().y),
            ResizeHandle::SE => Pos2::new(r.max.x, r.max.y),
            ResizeHandle::S => Pos2::new(r.center().x, r.max.y),
            ResizeHandle::SW => Pos2::new(r.min.x, r.max.y),
            ResizeHandle::W => Pos2::new(r.min.x, r.center().y),
            ResizeHandle::NW => Pos2::new(r.min.x, r.min.y),
        };
        Rect::from_center_size(center, Vec2::splat(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new("Group", Rect::from_min_size(Pos2::ZERO, Vec2::new(400.0, 300.0)))
    }

    #[test]
    fn test_band_distribution_by_thirds() {
        assert_eq!(Band::for_slot(0, 1), Band::Middle);
        let bands: Vec<Band> = (0..6).map(|i| Band::for_slot(i, 6)).collect();
        assert_eq!(
            bands,
            vec![
                Band::Top,
                Band::Top,
                Band::Middle,
                Band::Middle,
                Band::Bottom,
                Band::Bottom
            ]
        );
    }

    #[test]
    fn test_collapse_and_expand_restore_bounds() {
        let mut f = frame();
        let original = f.bounds;
        f.apply_collapse();
        assert!(f.collapsed);
        assert_eq!(f.bounds.width(), COLLAPSED_FRAME_WIDTH);
        f.apply_expand();
        assert!(!f.collapsed);
        assert_eq!(f.bounds, original);
    }

    #[test]
    fn test_resize_clamps_to_min_size() {
        let mut f = frame();
        f.resize(ResizeHandle::SE, Vec2::new(-1000.0, -1000.0));
        assert!(f.bounds.width() >= MIN_FRAME_WIDTH);
        assert!(f.bounds.height() >= MIN_FRAME_HEIGHT);
    }

    #[test]
    fn test_min_size_grows_with_comments() {
        let mut f = frame();
        let plain = f.min_size();
        f.comments = (0..12)
            .map(|i| format!("comment line number {i} with some detail"))
            .collect::<Vec<_>>()
            .join("\n");
        let grown = f.min_size();
        assert!(grown.y > plain.y);
        assert!(grown.x > plain.x);
    }

    #[test]
    fn test_resize_from_west_moves_left_edge_only() {
        let mut f = frame();
        let before = f.bounds;
        f.resize(ResizeHandle::W, Vec2::new(-50.0, 0.0));
        assert_eq!(f.bounds.min.x, before.min.x - 50.0);
        assert_eq!(f.bounds.max.x, before.max.x);
        assert_eq!(f.bounds.min.y, before.min.y);
    }
}
