// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions and the connection compatibility protocol.

use crate::content::PortSpec;
use crate::id::{NodeId, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Data flows into the node
    Input,
    /// Data flows out of the node
    Output,
}

impl PortDirection {
    /// The opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Data type that can flow through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// 4x4 matrix
    Matrix,
    /// Texture sampler
    Texture,
    /// Wildcard: resolves against whatever the other side carries
    Any,
}

impl TypeTag {
    /// All concrete (non-wildcard) tags
    pub const CONCRETE: [TypeTag; 9] = [
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::Vector2,
        Self::Vector3,
        Self::Vector4,
        Self::Color,
        Self::Matrix,
        Self::Texture,
    ];

    /// Get the color for this type (for UI)
    pub fn color(self) -> [u8; 3] {
        match self {
            Self::Bool => [200, 80, 80],
            Self::Int => [80, 200, 200],
            Self::Float => [80, 200, 80],
            Self::Vector2 => [200, 200, 80],
            Self::Vector3 => [200, 150, 80],
            Self::Vector4 => [200, 100, 200],
            Self::Color => [255, 200, 100],
            Self::Matrix => [150, 100, 200],
            Self::Texture => [100, 150, 200],
            Self::Any => [150, 150, 150],
        }
    }
}

/// Result of a full compatibility check between two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityState {
    /// The connection can be made
    Compatible,
    /// The declared type sets do not overlap
    TypeIncompatible,
    /// The connection would close a dependency cycle
    HierarchyIssue,
}

impl CompatibilityState {
    /// Whether the connection can be made
    pub fn is_compatible(self) -> bool {
        matches!(self, Self::Compatible)
    }

    /// Human-readable message for the issue code
    pub fn message(self) -> &'static str {
        match self {
            Self::Compatible => "Compatible",
            Self::TypeIncompatible => "Cannot connect two ports with incompatible types",
            Self::HierarchyIssue => {
                "Connection would make the node depend on its own output"
            }
        }
    }
}

/// A typed connection endpoint owned by a node.
///
/// Frames synthesize additional proxy ports while collapsed; those live on
/// the frame (see [`FramePort`](crate::frame::FramePort)) and delegate to a
/// port defined here.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    /// Unique port ID
    pub id: PortId,
    /// Port name
    pub name: String,
    /// Port direction
    pub direction: PortDirection,
    /// The node this port belongs to
    pub owner: NodeId,
    /// For occupied inputs: the output port currently feeding this port
    pub connected_to: Option<PortId>,
    /// Number of links attached (outputs may exceed one)
    pub link_count: u32,
    /// Whether this port is surfaced on the owning node's frame boundary.
    /// Only legal while the owner is enclosed by a frame.
    pub exposed_on_frame: bool,
    /// Ordering slot along the frame edge, meaningful when exposed
    pub exposed_position: i32,
    /// Accepted type tags; empty means "accept anything not excluded"
    pub accepted: BTreeSet<TypeTag>,
    /// Explicitly rejected type tags
    pub excluded: BTreeSet<TypeTag>,
}

impl Port {
    /// Instantiate a port from an adapter declaration with a fresh id
    pub fn from_spec(owner: NodeId, direction: PortDirection, spec: &PortSpec) -> Self {
        Self {
            id: PortId::fresh(),
            name: spec.name.clone(),
            direction,
            owner,
            connected_to: None,
            link_count: 0,
            exposed_on_frame: false,
            exposed_position: 0,
            accepted: spec.accepted.clone(),
            excluded: spec.excluded.clone(),
        }
    }

    /// Whether any link is attached
    pub fn is_connected(&self) -> bool {
        self.link_count > 0
    }

    /// Whether this port accepts a concrete type tag
    pub fn accepts(&self, tag: TypeTag) -> bool {
        if self.excluded.contains(&tag) {
            return false;
        }
        self.accepted.is_empty()
            || self.accepted.contains(&TypeTag::Any)
            || self.accepted.contains(&tag)
    }

    /// Whether a concrete type exists that both ports accept
    pub fn types_overlap(&self, other: &Port) -> bool {
        TypeTag::CONCRETE
            .iter()
            .any(|tag| self.accepts(*tag) && other.accepts(*tag))
    }

    /// Check whether a connection to another port is possible.
    ///
    /// Returns false when the directions match, the owners match, the input
    /// side is already occupied, or the type sets are disjoint. Cycle
    /// detection needs graph context and lives on the canvas
    /// ([`GraphCanvas::check_compatibility`](crate::canvas::GraphCanvas::check_compatibility)).
    pub fn can_connect_to(&self, other: &Port) -> bool {
        if self.direction == other.direction {
            return false;
        }
        if self.owner == other.owner {
            return false;
        }
        let input = if self.direction == PortDirection::Input {
            self
        } else {
            other
        };
        if input.is_connected() {
            return false;
        }
        self.types_overlap(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(direction: PortDirection, owner: u64, tags: &[TypeTag]) -> Port {
        Port::from_spec(
            NodeId(owner),
            direction,
            &PortSpec::accepting("p", tags.iter().copied()),
        )
    }

    #[test]
    fn test_same_direction_rejected() {
        let a = port(PortDirection::Output, 1, &[TypeTag::Float]);
        let b = port(PortDirection::Output, 2, &[TypeTag::Float]);
        assert!(!a.can_connect_to(&b));
    }

    #[test]
    fn test_same_owner_rejected() {
        let a = port(PortDirection::Output, 1, &[TypeTag::Float]);
        let b = port(PortDirection::Input, 1, &[TypeTag::Float]);
        assert!(!a.can_connect_to(&b));
    }

    #[test]
    fn test_occupied_input_rejected() {
        let a = port(PortDirection::Output, 1, &[TypeTag::Float]);
        let mut b = port(PortDirection::Input, 2, &[TypeTag::Float]);
        assert!(a.can_connect_to(&b));
        b.connected_to = Some(PortId(99));
        b.link_count = 1;
        assert!(!a.can_connect_to(&b));
    }

    #[test]
    fn test_disjoint_types_rejected() {
        let a = port(PortDirection::Output, 1, &[TypeTag::Texture]);
        let b = port(PortDirection::Input, 2, &[TypeTag::Float, TypeTag::Color]);
        assert!(!a.can_connect_to(&b));
        assert!(!a.types_overlap(&b));
    }

    #[test]
    fn test_wildcard_accepts_everything_not_excluded() {
        let any = Port::from_spec(
            NodeId(1),
            PortDirection::Input,
            &PortSpec::any("in").without(TypeTag::Texture),
        );
        assert!(any.accepts(TypeTag::Float));
        assert!(any.accepts(TypeTag::Matrix));
        assert!(!any.accepts(TypeTag::Texture));

        let tex = port(PortDirection::Output, 2, &[TypeTag::Texture]);
        assert!(!tex.can_connect_to(&any));
    }

    #[test]
    fn test_overlapping_sets_accepted() {
        let a = port(PortDirection::Output, 1, &[TypeTag::Float, TypeTag::Vector3]);
        let b = port(PortDirection::Input, 2, &[TypeTag::Vector3, TypeTag::Color]);
        assert!(a.can_connect_to(&b));
    }

    #[test]
    fn test_compatibility_messages() {
        assert!(CompatibilityState::Compatible.is_compatible());
        assert!(!CompatibilityState::TypeIncompatible.is_compatible());
        assert!(CompatibilityState::HierarchyIssue
            .message()
            .contains("depend"));
    }
}
