// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node material graph editing core for Lumen Editor.
//!
//! This crate provides the interactive graph-editing engine behind the
//! material editor:
//! - Typed ports with a connection compatibility protocol
//! - Nodes wrapping opaque, adapter-described content
//! - Frames: collapsible group containers with boundary port proxies
//! - The canvas interaction state machine (select, drag, connect, marquee,
//!   smart insert, copy/paste, delete with reconnect)
//! - Diff-based undo/redo history
//! - The stable persisted layout format
//!
//! ## Architecture
//!
//! One [`GraphCanvas`] per open graph owns every node, link and frame and
//! announces mutations on its [`StateManager`] event bus; external panels
//! (property grid, preview, console) subscribe there and never reach into
//! the canvas. Per-kind behavior (content adapters, header decoration,
//! property editors, search entries) is registered once at bootstrap in an
//! [`EditorRegistries`] bundle that is passed by reference.

pub mod canvas;
pub mod content;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod history;
pub mod id;
pub mod interaction;
pub mod kinds;
pub mod link;
pub mod node;
pub mod port;
pub mod registry;
pub mod serialization;
pub mod ui;

pub use canvas::{GraphCanvas, LinkError, Selection};
pub use content::{NodeContent, PortSpec};
pub use events::{EditorCommand, StateManager};
pub use frame::{Frame, FramePort, ResizeHandle};
pub use geometry::Camera;
pub use history::{EditableState, GraphDiff, HistoryStack};
pub use id::{FrameId, LinkId, NodeId, PortId};
pub use interaction::InteractionState;
pub use link::Link;
pub use node::Node;
pub use port::{CompatibilityState, Port, PortDirection, TypeTag};
pub use registry::EditorRegistries;
pub use serialization::GraphSnapshot;
pub use ui::GraphEditorView;
