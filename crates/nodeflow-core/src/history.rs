//! Undo/redo history.
//!
//! [`History`] keeps two stacks: `done` (applied actions, most recent last) and
//! `undone` (actions available for redo). Executing a fresh action clears the
//! redo branch. Undo and redo on an empty stack do nothing.
//!
//! `History` is a cheap handle over shared state. Actions are executed and
//! undone while no borrow of that state is held, so an action may itself talk
//! to the history (for example by opening a batch) without panicking.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::action::{Action, BatchAction, DelegateAction};

#[derive(Default)]
struct HistoryState {
    done: VecDeque<Box<dyn Action>>,
    undone: Vec<Box<dyn Action>>,
    /// Open batch scopes, innermost last.
    batches: Vec<BatchFrame>,
    max_depth: Option<usize>,
}

struct BatchFrame {
    label: Option<String>,
    actions: Vec<Box<dyn Action>>,
}

impl HistoryState {
    fn push_done(&mut self, action: Box<dyn Action>) {
        self.done.push_back(action);
        if let Some(max_depth) = self.max_depth {
            while self.done.len() > max_depth {
                self.done.pop_front();
            }
        }
    }
}

/// Shared handle to an undo/redo history.
#[derive(Clone, Default)]
pub struct History {
    state: Rc<RefCell<HistoryState>>,
}

/// Non-owning handle to a [`History`].
///
/// Entities that record into a history hold one of these, since the history's
/// stacks in turn hold actions that reference the entities.
#[derive(Clone, Default)]
pub struct WeakHistory {
    state: Weak<RefCell<HistoryState>>,
}

impl WeakHistory {
    /// The history, if it is still alive.
    pub fn upgrade(&self) -> Option<History> {
        self.state.upgrade().map(|state| History { state })
    }
}

thread_local! {
    static DEFAULT_HISTORY: History = History::new();
}

impl History {
    /// Create an empty, unbounded history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history that keeps at most `max_depth` undo steps.
    pub fn with_max_depth(max_depth: usize) -> Self {
        let history = Self::new();
        history.state.borrow_mut().max_depth = Some(max_depth);
        history
    }

    /// The default history of the current thread.
    ///
    /// For application wiring only; components take an explicit handle.
    pub fn thread_default() -> Self {
        DEFAULT_HISTORY.with(History::clone)
    }

    /// A non-owning handle to this history.
    pub fn downgrade(&self) -> WeakHistory {
        WeakHistory {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Whether two handles refer to the same history.
    pub fn ptr_eq(&self, other: &History) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Execute `action` and record it.
    ///
    /// The redo stack is cleared. Inside a [`batch`](Self::batch) scope the
    /// action is buffered instead of pushed.
    pub fn execute_action(&self, action: impl Action) {
        self.execute_boxed(Box::new(action));
    }

    /// Execute an already boxed action and record it.
    pub fn execute_boxed(&self, mut action: Box<dyn Action>) {
        action.execute();

        let mut state = self.state.borrow_mut();
        state.undone.clear();
        log::debug!("history: executed {:?}", action.label());
        match state.batches.last_mut() {
            Some(frame) => frame.actions.push(action),
            None => state.push_done(action),
        }
    }

    /// Execute and record a [`DelegateAction`] built from two closures.
    pub fn record(
        &self,
        execute: impl FnMut() + 'static,
        undo: impl FnMut() + 'static,
        label: impl Into<String>,
    ) {
        self.execute_action(DelegateAction::new(execute, undo, label));
    }

    /// Undo the most recent action.
    ///
    /// Returns `true` if an action was undone, `false` if there was nothing to undo.
    pub fn undo(&self) -> bool {
        let Some(mut action) = self.state.borrow_mut().done.pop_back() else {
            return false;
        };
        action.undo();
        log::debug!("history: undid {:?}", action.label());
        self.state.borrow_mut().undone.push(action);
        true
    }

    /// Redo the most recently undone action.
    ///
    /// Returns `true` if an action was redone, `false` if there was nothing to redo.
    pub fn redo(&self) -> bool {
        let Some(mut action) = self.state.borrow_mut().undone.pop() else {
            return false;
        };
        action.execute();
        log::debug!("history: redid {:?}", action.label());
        self.state.borrow_mut().push_done(action);
        true
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.state.borrow().done.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.state.borrow().undone.is_empty()
    }

    /// Number of actions on the undo stack.
    pub fn undo_count(&self) -> usize {
        self.state.borrow().done.len()
    }

    /// Number of actions on the redo stack.
    pub fn redo_count(&self) -> usize {
        self.state.borrow().undone.len()
    }

    /// Labels of the undo stack, most recent first.
    pub fn undo_labels(&self) -> Vec<Option<String>> {
        let state = self.state.borrow();
        state
            .done
            .iter()
            .rev()
            .map(|action| action.label().map(str::to_owned))
            .collect()
    }

    /// Labels of the redo stack, next redo first.
    pub fn redo_labels(&self) -> Vec<Option<String>> {
        let state = self.state.borrow();
        state
            .undone
            .iter()
            .rev()
            .map(|action| action.label().map(str::to_owned))
            .collect()
    }

    /// Label of the action on top of the undo stack.
    pub fn current_label(&self) -> Option<String> {
        let state = self.state.borrow();
        state
            .done
            .back()
            .and_then(|action| action.label().map(str::to_owned))
    }

    /// Run `f` on the action on top of the undo stack.
    ///
    /// This is how a collaborator locates an in-flight action, such as the move
    /// pushed when a drag started, to finalize it later. Returns `None` if the
    /// undo stack is empty.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut dyn Action) -> R) -> Option<R> {
        let action = self.state.borrow_mut().done.pop_back()?;
        let mut current = CurrentAction {
            history: self,
            action: Some(action),
        };
        let action = current.action.as_mut()?;
        Some(f(action.as_mut()))
    }

    /// Open a batch scope.
    ///
    /// Until the returned guard is dropped, executed actions are buffered.
    /// On drop, on every exit path including unwinding, the buffer becomes a
    /// single [`BatchAction`]. Scopes nest: an inner scope's batch lands in the
    /// enclosing scope's buffer, and only the outermost scope pushes onto the
    /// undo stack. A scope that recorded nothing pushes nothing.
    #[must_use = "the batch closes as soon as the scope guard is dropped"]
    pub fn batch(&self, label: impl Into<String>) -> BatchScope {
        let mut state = self.state.borrow_mut();
        state.batches.push(BatchFrame {
            label: Some(label.into()),
            actions: Vec::new(),
        });
        BatchScope {
            history: self.clone(),
            depth: state.batches.len(),
        }
    }

    /// Run `f` inside a batch scope and return its result.
    pub fn with_batch<R>(&self, label: impl Into<String>, f: impl FnOnce() -> R) -> R {
        let _scope = self.batch(label);
        f()
    }

    /// Whether a batch scope is open.
    pub fn is_batching(&self) -> bool {
        !self.state.borrow().batches.is_empty()
    }

    /// Drop every recorded action. Open batch buffers are kept.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.done.clear();
        state.undone.clear();
    }

    /// Flush every open frame at `depth` or deeper.
    fn close_batches(&self, depth: usize) {
        let mut state = self.state.borrow_mut();
        while state.batches.len() >= depth {
            let Some(frame) = state.batches.pop() else {
                break;
            };
            if frame.actions.is_empty() {
                continue;
            }
            log::debug!(
                "history: flushing batch {:?} with {} actions",
                frame.label,
                frame.actions.len()
            );
            let batch: Box<dyn Action> = Box::new(BatchAction::new(frame.label, frame.actions));
            match state.batches.last_mut() {
                Some(outer) => outer.actions.push(batch),
                None => state.push_done(batch),
            }
        }
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("History")
            .field("undo_count", &state.done.len())
            .field("redo_count", &state.undone.len())
            .field("open_batches", &state.batches.len())
            .field("max_depth", &state.max_depth)
            .finish()
    }
}

impl fmt::Debug for WeakHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHistory")
            .field("alive", &(self.state.strong_count() > 0))
            .finish()
    }
}

/// Puts an action taken off the undo stack back on top when dropped.
struct CurrentAction<'a> {
    history: &'a History,
    action: Option<Box<dyn Action>>,
}

impl Drop for CurrentAction<'_> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            self.history.state.borrow_mut().done.push_back(action);
        }
    }
}

/// Guard for an open batch scope. See [`History::batch`].
pub struct BatchScope {
    history: History,
    depth: usize,
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        self.history.close_batches(self.depth);
    }
}

impl fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &self.depth)
            .finish()
    }
}
