// SPDX-License-Identifier: MIT OR Apache-2.0
//! Diff-based undo/redo over the canvas state.
//!
//! `store()` serializes the full editable state, diffs it against the
//! previous snapshot and keeps only the delta, so memory stays bounded on
//! large graphs. Diffs are invertible (undo applies them backward),
//! idempotent under re-application, and composable (interactive gestures
//! collapse into a single undoable entry). Ids are part of the state, so a
//! round trip restores exact object identity, not just equivalent content.

use crate::canvas::{GraphCanvas, SnapshotError};
use crate::frame::Band;
use crate::id::{FrameId, LinkId, NodeId, PortId};
use crate::port::TypeTag;
use crate::registry::EditorRegistries;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Default maximum number of history entries
pub const MAX_HISTORY: usize = 64;

/// History errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Nothing to undo
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Nothing to redo
    #[error("Nothing to redo")]
    NothingToRedo,

    /// A diff failed to apply; the stack was reset
    #[error("History entry could not be applied: {0}")]
    ApplyFailed(#[from] SnapshotError),
}

/// Canonical serialized form of one port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortState {
    /// Port id
    pub id: PortId,
    /// Port name
    pub name: String,
    /// Exposure flag
    pub exposed_on_frame: bool,
    /// Exposure slot
    pub exposed_position: i32,
    /// Accepted type tags
    pub accepted: BTreeSet<TypeTag>,
    /// Excluded type tags
    pub excluded: BTreeSet<TypeTag>,
}

/// Canonical serialized form of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    /// Content class name
    pub kind: String,
    /// Position
    pub x: f32,
    /// Position
    pub y: f32,
    /// Collapsed flag
    pub collapsed: bool,
    /// Enclosing frame
    pub frame: Option<FrameId>,
    /// Input ports in declaration order
    pub inputs: Vec<PortState>,
    /// Output ports in declaration order
    pub outputs: Vec<PortState>,
    /// Opaque content payload
    pub content: serde_json::Value,
}

/// Canonical serialized form of one link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    /// Source node
    pub from_node: NodeId,
    /// Source port
    pub from_port: PortId,
    /// Target node
    pub to_node: NodeId,
    /// Target port
    pub to_port: PortId,
    /// Visibility flag
    pub visible: bool,
}

/// Canonical serialized form of one frame-port proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePortState {
    /// Proxy id
    pub id: PortId,
    /// Interior port
    pub inner: PortId,
    /// Band group
    pub band: Band,
    /// Slot index
    pub slot: usize,
}

/// Canonical serialized form of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameState {
    /// Title
    pub name: String,
    /// Tint
    pub color: [u8; 3],
    /// Bounds origin
    pub x: f32,
    /// Bounds origin
    pub y: f32,
    /// Bounds size
    pub width: f32,
    /// Bounds size
    pub height: f32,
    /// Collapsed flag
    pub collapsed: bool,
    /// Remembered expanded bounds while collapsed
    pub expanded: Option<[f32; 4]>,
    /// Enclosed nodes
    pub nodes: BTreeSet<NodeId>,
    /// Input-side proxies
    pub input_ports: Vec<FramePortState>,
    /// Output-side proxies
    pub output_ports: Vec<FramePortState>,
    /// Comment text
    pub comments: String,
}

/// Camera part of the editable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    /// Pan offset
    pub x: f32,
    /// Pan offset
    pub y: f32,
    /// Zoom factor
    pub zoom: f32,
}

/// The whole editable state in canonical (id-sorted) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableState {
    /// Nodes by id
    pub nodes: BTreeMap<NodeId, NodeState>,
    /// Links by id
    pub links: BTreeMap<LinkId, LinkState>,
    /// Frames by id
    pub frames: BTreeMap<FrameId, FrameState>,
    /// Camera
    pub camera: CameraState,
}

impl Default for EditableState {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            frames: BTreeMap::new(),
            camera: CameraState {
                x: 0.0,
                y: 0.0,
                zoom: 1.0,
            },
        }
    }
}

/// Structural delta of one keyed arena between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDelta<K: Ord, V> {
    added: BTreeMap<K, V>,
    removed: BTreeMap<K, V>,
    changed: BTreeMap<K, (V, V)>,
}

impl<K: Ord + Clone, V: Clone + PartialEq> MapDelta<K, V> {
    fn empty() -> Self {
        Self {
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
            changed: BTreeMap::new(),
        }
    }

    fn between(old: &BTreeMap<K, V>, new: &BTreeMap<K, V>) -> Self {
        let mut delta = Self::empty();
        for (key, value) in new {
            match old.get(key) {
                None => {
                    delta.added.insert(key.clone(), value.clone());
                }
                Some(previous) if previous != value => {
                    delta
                        .changed
                        .insert(key.clone(), (previous.clone(), value.clone()));
                }
                Some(_) => {}
            }
        }
        for (key, value) in old {
            if !new.contains_key(key) {
                delta.removed.insert(key.clone(), value.clone());
            }
        }
        delta
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Apply old→new. Inserts overwrite and absent removals are no-ops, so
    /// re-applying the same delta cannot corrupt the map.
    fn apply_forward(&self, map: &mut BTreeMap<K, V>) {
        for (key, value) in &self.added {
            map.insert(key.clone(), value.clone());
        }
        for (key, (_, after)) in &self.changed {
            map.insert(key.clone(), after.clone());
        }
        for key in self.removed.keys() {
            map.remove(key);
        }
    }

    /// Apply new→old (the inverse direction)
    fn apply_backward(&self, map: &mut BTreeMap<K, V>) {
        for (key, value) in &self.removed {
            map.insert(key.clone(), value.clone());
        }
        for (key, (before, _)) in &self.changed {
            map.insert(key.clone(), before.clone());
        }
        for key in self.added.keys() {
            map.remove(key);
        }
    }

    /// Compose two sequential deltas into one spanning both
    fn merge(first: &Self, second: &Self) -> Self {
        #[derive(Clone)]
        enum Slot<V> {
            Absent,
            Present(V),
            Untouched,
        }

        let mut keys: BTreeSet<K> = BTreeSet::new();
        for delta in [first, second] {
            keys.extend(delta.added.keys().cloned());
            keys.extend(delta.removed.keys().cloned());
            keys.extend(delta.changed.keys().cloned());
        }

        let mut merged = Self::empty();
        for key in keys {
            // Value before `first` ran.
            let before = if first.added.contains_key(&key) {
                Slot::Absent
            } else if let Some(value) = first.removed.get(&key) {
                Slot::Present(value.clone())
            } else if let Some((value, _)) = first.changed.get(&key) {
                Slot::Present(value.clone())
            } else if let Some(value) = second.removed.get(&key) {
                // Untouched by first: reconstruct from second's view.
                Slot::Present(value.clone())
            } else if let Some((value, _)) = second.changed.get(&key) {
                Slot::Present(value.clone())
            } else if second.added.contains_key(&key) {
                Slot::Absent
            } else {
                Slot::Untouched
            };

            // Value after `second` ran.
            let after = if second.removed.contains_key(&key) {
                Slot::Absent
            } else if let Some(value) = second.added.get(&key) {
                Slot::Present(value.clone())
            } else if let Some((_, value)) = second.changed.get(&key) {
                Slot::Present(value.clone())
            } else if first.removed.contains_key(&key) {
                // Untouched by second: first's outcome stands.
                Slot::Absent
            } else if let Some(value) = first.added.get(&key) {
                Slot::Present(value.clone())
            } else if let Some((_, value)) = first.changed.get(&key) {
                Slot::Present(value.clone())
            } else {
                Slot::Untouched
            };

            match (before, after) {
                (Slot::Absent, Slot::Present(value)) => {
                    merged.added.insert(key, value);
                }
                (Slot::Present(value), Slot::Absent) => {
                    merged.removed.insert(key, value);
                }
                (Slot::Present(before), Slot::Present(after)) => {
                    if before != after {
                        merged.changed.insert(key, (before, after));
                    }
                }
                _ => {}
            }
        }
        merged
    }
}

/// Invertible structural diff between two editable states.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDiff {
    nodes: MapDelta<NodeId, NodeState>,
    links: MapDelta<LinkId, LinkState>,
    frames: MapDelta<FrameId, FrameState>,
    camera: Option<(CameraState, CameraState)>,
}

impl GraphDiff {
    /// Diff two snapshots
    pub fn between(old: &EditableState, new: &EditableState) -> Self {
        Self {
            nodes: MapDelta::between(&old.nodes, &new.nodes),
            links: MapDelta::between(&old.links, &new.links),
            frames: MapDelta::between(&old.frames, &new.frames),
            camera: (old.camera != new.camera).then(|| (old.camera.clone(), new.camera.clone())),
        }
    }

    /// Whether the diff records no change
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.links.is_empty()
            && self.frames.is_empty()
            && self.camera.is_none()
    }

    /// Apply old→new to a snapshot
    pub fn apply_forward(&self, state: &EditableState) -> EditableState {
        let mut next = state.clone();
        self.nodes.apply_forward(&mut next.nodes);
        self.links.apply_forward(&mut next.links);
        self.frames.apply_forward(&mut next.frames);
        if let Some((_, after)) = &self.camera {
            next.camera = after.clone();
        }
        next
    }

    /// Apply new→old to a snapshot
    pub fn apply_backward(&self, state: &EditableState) -> EditableState {
        let mut next = state.clone();
        self.nodes.apply_backward(&mut next.nodes);
        self.links.apply_backward(&mut next.links);
        self.frames.apply_backward(&mut next.frames);
        if let Some((before, _)) = &self.camera {
            next.camera = before.clone();
        }
        next
    }

    /// Compose two sequential diffs into one
    pub fn merge(first: &Self, second: &Self) -> Self {
        let camera = match (&first.camera, &second.camera) {
            (Some((before, _)), Some((_, after))) => {
                (before != after).then(|| (before.clone(), after.clone()))
            }
            (Some(pair), None) | (None, Some(pair)) => Some(pair.clone()),
            (None, None) => None,
        };
        Self {
            nodes: MapDelta::merge(&first.nodes, &second.nodes),
            links: MapDelta::merge(&first.links, &second.links),
            frames: MapDelta::merge(&first.frames, &second.frames),
            camera,
        }
    }
}

/// Undo/redo stack over serialized graph snapshots, stored as diffs.
pub struct HistoryStack {
    undo: VecDeque<GraphDiff>,
    redo: Vec<GraphDiff>,
    baseline: EditableState,
    locked: bool,
    max_len: usize,
}

impl HistoryStack {
    /// Create a stack whose baseline is the current state
    pub fn new(initial: EditableState) -> Self {
        Self::with_max_len(initial, MAX_HISTORY)
    }

    /// Create with a custom depth bound
    pub fn with_max_len(initial: EditableState, max_len: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            baseline: initial,
            locked: false,
            max_len,
        }
    }

    /// Record the current state as a new history entry.
    ///
    /// Suppressed while a diff is being applied (the lock prevents the
    /// restore's own notifications from re-recording). Returns whether an
    /// entry was pushed; empty diffs are dropped.
    pub fn store(&mut self, current: EditableState) -> bool {
        if self.locked {
            return false;
        }
        let diff = GraphDiff::between(&self.baseline, &current);
        if diff.is_empty() {
            return false;
        }
        self.baseline = current;
        self.redo.clear();
        self.undo.push_back(diff);
        while self.undo.len() > self.max_len {
            self.undo.pop_front();
        }
        true
    }

    /// Undo the most recent entry, restoring the canvas.
    ///
    /// A failed restore resets the stack instead of leaving it pointing at
    /// a state the canvas is not in.
    pub fn undo(
        &mut self,
        canvas: &mut GraphCanvas,
        registries: &EditorRegistries,
    ) -> Result<(), HistoryError> {
        let diff = self.undo.pop_back().ok_or(HistoryError::NothingToUndo)?;
        let target = diff.apply_backward(&self.baseline);
        self.locked = true;
        let applied = canvas.restore_state(&target, registries);
        self.locked = false;
        match applied {
            Ok(()) => {
                self.baseline = target;
                self.redo.push(diff);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("undo failed, resetting history: {err}");
                self.undo.clear();
                self.redo.clear();
                Err(HistoryError::ApplyFailed(err))
            }
        }
    }

    /// Redo the most recently undone entry
    pub fn redo(
        &mut self,
        canvas: &mut GraphCanvas,
        registries: &EditorRegistries,
    ) -> Result<(), HistoryError> {
        let diff = self.redo.pop().ok_or(HistoryError::NothingToRedo)?;
        let target = diff.apply_forward(&self.baseline);
        self.locked = true;
        let applied = canvas.restore_state(&target, registries);
        self.locked = false;
        match applied {
            Ok(()) => {
                self.baseline = target;
                self.undo.push_back(diff);
                Ok(())
            }
            Err(err) => {
                tracing::warn!("redo failed, resetting history: {err}");
                self.undo.clear();
                self.redo.clear();
                Err(HistoryError::ApplyFailed(err))
            }
        }
    }

    /// Merge the two most recent entries into one undoable action
    /// (coalesces multi-step interactive gestures)
    pub fn collapse_last_two(&mut self) -> bool {
        if self.undo.len() < 2 {
            return false;
        }
        let Some(second) = self.undo.pop_back() else {
            return false;
        };
        let Some(first) = self.undo.pop_back() else {
            self.undo.push_back(second);
            return false;
        };
        let merged = GraphDiff::merge(&first, &second);
        if !merged.is_empty() {
            self.undo.push_back(merged);
        }
        true
    }

    /// Whether an undo entry exists
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Whether a redo entry exists
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Undo stack depth
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Redo stack depth
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Whether recording is currently suppressed
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Drop all entries and rebase on a new state
    pub fn reset(&mut self, state: EditableState) {
        self.undo.clear();
        self.redo.clear();
        self.baseline = state;
        self.locked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(keys: &[(u64, f32)]) -> EditableState {
        let mut state = EditableState::default();
        for (raw, x) in keys {
            state.nodes.insert(
                NodeId(*raw),
                NodeState {
                    kind: "FloatValue".to_string(),
                    x: *x,
                    y: 0.0,
                    collapsed: false,
                    frame: None,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                    content: serde_json::Value::Null,
                },
            );
        }
        state
    }

    #[test]
    fn test_diff_round_trip() {
        let old = state_with(&[(1, 0.0), (2, 10.0)]);
        let new = state_with(&[(2, 25.0), (3, 5.0)]);
        let diff = GraphDiff::between(&old, &new);
        assert_eq!(diff.apply_forward(&old), new);
        assert_eq!(diff.apply_backward(&new), old);
    }

    #[test]
    fn test_diff_application_is_idempotent() {
        let old = state_with(&[(1, 0.0)]);
        let new = state_with(&[(1, 40.0), (2, 8.0)]);
        let diff = GraphDiff::between(&old, &new);
        let once = diff.apply_forward(&old);
        let twice = diff.apply_forward(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_diff_is_dropped() {
        let state = state_with(&[(1, 0.0)]);
        let mut history = HistoryStack::new(state.clone());
        assert!(!history.store(state));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_store_clears_redo_and_bounds_depth() {
        let mut history = HistoryStack::with_max_len(state_with(&[]), 2);
        assert!(history.store(state_with(&[(1, 0.0)])));
        assert!(history.store(state_with(&[(1, 0.0), (2, 0.0)])));
        assert!(history.store(state_with(&[(1, 0.0), (2, 0.0), (3, 0.0)])));
        // Oldest entry evicted.
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn test_store_suppressed_while_locked() {
        let mut history = HistoryStack::new(state_with(&[]));
        history.locked = true;
        assert!(!history.store(state_with(&[(1, 0.0)])));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_merge_spans_both_edits() {
        let a = state_with(&[(1, 0.0)]);
        let b = state_with(&[(1, 10.0)]);
        let c = state_with(&[(1, 10.0), (2, 3.0)]);
        let first = GraphDiff::between(&a, &b);
        let second = GraphDiff::between(&b, &c);
        let merged = GraphDiff::merge(&first, &second);
        assert_eq!(merged.apply_forward(&a), c);
        assert_eq!(merged.apply_backward(&c), a);
    }

    #[test]
    fn test_merge_cancels_add_then_remove() {
        let a = state_with(&[]);
        let b = state_with(&[(1, 0.0)]);
        let first = GraphDiff::between(&a, &b);
        let second = GraphDiff::between(&b, &a);
        let merged = GraphDiff::merge(&first, &second);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_collapse_last_two_leaves_single_entry() {
        let mut history = HistoryStack::new(state_with(&[]));
        history.store(state_with(&[(1, 0.0)]));
        history.store(state_with(&[(1, 0.0), (2, 0.0)]));
        assert_eq!(history.undo_depth(), 2);
        assert!(history.collapse_last_two());
        assert_eq!(history.undo_depth(), 1);
    }
}
