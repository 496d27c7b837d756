// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event bus decoupling the canvas from external panels.
//!
//! Each event kind gets its own typed [`Observable`] channel. Dispatch is
//! synchronous and re-entrant: a callback may subscribe, unsubscribe or
//! notify another channel while a notification is in flight. Observers are
//! dropped with the owning [`StateManager`], so handles never outlive the
//! editor session they belong to.

use crate::id::{FrameId, LinkId, NodeId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Handle returned by [`Observable::add`], used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverToken(u64);

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

/// A single synchronous notification channel.
pub struct Observable<T> {
    observers: RefCell<Vec<(ObserverToken, Callback<T>)>>,
    next_token: Cell<u64>,
}

impl<T> Observable<T> {
    /// Create an empty channel
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(Vec::new()),
            next_token: Cell::new(1),
        }
    }

    /// Register an observer and return its removal token
    pub fn add(&self, callback: impl FnMut(&T) + 'static) -> ObserverToken {
        let token = ObserverToken(self.next_token.get());
        self.next_token.set(token.0 + 1);
        self.observers
            .borrow_mut()
            .push((token, Rc::new(RefCell::new(callback))));
        token
    }

    /// Remove an observer; returns whether it was present
    pub fn remove(&self, token: ObserverToken) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(t, _)| *t != token);
        observers.len() != before
    }

    /// Notify all observers in registration order.
    ///
    /// The observer list is snapshotted first so callbacks may mutate the
    /// channel; a callback that is already running (re-entrant notify of the
    /// same observer) is skipped for that round.
    pub fn notify(&self, payload: &T) {
        let snapshot: Vec<Callback<T>> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for callback in snapshot {
            if let Ok(mut f) = callback.try_borrow_mut() {
                f(payload);
            }
        }
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Drop all observers
    pub fn clear(&self) {
        self.observers.borrow_mut().clear();
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Severity of a diagnostic log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Informational
    Info,
    /// Recoverable problem, loading continued
    Warning,
    /// Operation failed
    Error,
}

/// Diagnostic surfaced on the log channel
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
}

impl LogEntry {
    /// Create a warning entry
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }

    /// Create an error entry
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// Commands the hosting shell consumes from the canvas (or feeds into it)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    /// Fit the camera to the graph contents
    ZoomToFit,
    /// Re-layout nodes by dependency depth
    AutoArrange,
    /// The semantic output must be rebuilt
    Rebuild,
    /// Persist the graph (host-provided I/O)
    Save,
    /// Load a graph (host-provided I/O)
    Load,
    /// Undo the last stored edit
    Undo,
    /// Redo the last undone edit
    Redo,
}

/// Per-session bundle of notification channels.
///
/// One instance per canvas; external panels subscribe to the channels they
/// care about and never reach into the canvas directly.
pub struct StateManager {
    /// Selection contents changed
    pub on_selection_changed: Observable<()>,
    /// A node was added to the canvas
    pub on_node_created: Observable<NodeId>,
    /// A node was removed from the canvas
    pub on_node_removed: Observable<NodeId>,
    /// A link was committed
    pub on_link_created: Observable<LinkId>,
    /// A link was severed
    pub on_link_removed: Observable<LinkId>,
    /// A frame was created
    pub on_frame_created: Observable<FrameId>,
    /// A frame was removed
    pub on_frame_removed: Observable<FrameId>,
    /// The semantic graph output is stale
    pub on_rebuild_required: Observable<()>,
    /// The history stack should snapshot the current state
    pub on_store_required: Observable<()>,
    /// Diagnostics (deserialization skips, rejected connections, ...)
    pub on_log: Observable<LogEntry>,
    /// Host-level commands
    pub on_command: Observable<EditorCommand>,
}

impl StateManager {
    /// Create a manager with all channels empty
    pub fn new() -> Self {
        Self {
            on_selection_changed: Observable::new(),
            on_node_created: Observable::new(),
            on_node_removed: Observable::new(),
            on_link_created: Observable::new(),
            on_link_removed: Observable::new(),
            on_frame_created: Observable::new(),
            on_frame_removed: Observable::new(),
            on_rebuild_required: Observable::new(),
            on_store_required: Observable::new(),
            on_log: Observable::new(),
            on_command: Observable::new(),
        }
    }

    /// Drop every observer on every channel
    pub fn clear_all(&self) {
        self.on_selection_changed.clear();
        self.on_node_created.clear();
        self.on_node_removed.clear();
        self.on_link_created.clear();
        self.on_link_removed.clear();
        self.on_frame_created.clear();
        self.on_frame_removed.clear();
        self.on_rebuild_required.clear();
        self.on_store_required.clear();
        self.on_log.clear();
        self.on_command.clear();
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_reaches_observers_in_order() {
        let channel: Observable<u32> = Observable::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_a = Rc::clone(&log);
        channel.add(move |v| log_a.borrow_mut().push(('a', *v)));
        let log_b = Rc::clone(&log);
        channel.add(move |v| log_b.borrow_mut().push(('b', *v)));

        channel.notify(&7);
        assert_eq!(*log.borrow(), vec![('a', 7), ('b', 7)]);
    }

    #[test]
    fn test_removed_observer_is_not_called() {
        let channel: Observable<()> = Observable::new();
        let hits = Rc::new(Cell::new(0));

        let hits_obs = Rc::clone(&hits);
        let token = channel.add(move |()| hits_obs.set(hits_obs.get() + 1));
        channel.notify(&());
        assert!(channel.remove(token));
        assert!(!channel.remove(token));
        channel.notify(&());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_reentrant_subscribe_during_notify() {
        let channel: Rc<Observable<()>> = Rc::new(Observable::new());
        let inner_hits = Rc::new(Cell::new(0));

        let channel_obs = Rc::clone(&channel);
        let inner = Rc::clone(&inner_hits);
        channel.add(move |()| {
            let inner = Rc::clone(&inner);
            channel_obs.add(move |()| inner.set(inner.get() + 1));
        });

        channel.notify(&());
        assert_eq!(channel.observer_count(), 2);
        // The observer added mid-dispatch only runs from the next round on.
        assert_eq!(inner_hits.get(), 0);
        channel.notify(&());
        assert_eq!(inner_hits.get(), 1);
    }

    #[test]
    fn test_clear_all_drops_handles() {
        let manager = StateManager::new();
        manager.on_node_created.add(|_| {});
        manager.on_log.add(|_| {});
        manager.clear_all();
        assert_eq!(manager.on_node_created.observer_count(), 0);
        assert_eq!(manager.on_log.observer_count(), 0);
    }
}
