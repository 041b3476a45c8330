//! Reversible edits.
//!
//! An [`Action`] is a forward mutation paired with its inverse. Actions carry
//! whatever handles they need to reach the state they touch, so `execute` and
//! `undo` take no arguments and can be replayed by [`History`](crate::History)
//! without knowing anything about the document.
//!
//! - [`DelegateAction`] wraps two closures and a label.
//! - [`BatchAction`] groups child actions into one undo step.
//! - [`MoveEntitiesAction`] snapshots positions before and after a drag.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use kurbo::Point;
use thiserror::Error;

/// Downcasting support for action trait objects.
///
/// Implemented for every `'static` type. Call it on `&mut dyn Action`, not on
/// a `Box<dyn Action>`, or the box itself is what gets downcast.
pub trait AsAny: 'static {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A reversible edit.
///
/// `undo` must restore the observable state that existed before `execute`.
pub trait Action: AsAny {
    /// Applies the forward mutation.
    fn execute(&mut self);

    /// Applies the inverse mutation.
    fn undo(&mut self);

    /// Short description for menus and history panels.
    fn label(&self) -> Option<&str> {
        None
    }
}

impl dyn Action {
    /// Returns the concrete action if it is a `T`.
    pub fn downcast_ref<T: Action>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns the concrete action mutably if it is a `T`.
    pub fn downcast_mut<T: Action>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Whether this action is a `T`.
    pub fn is<T: Action>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label())
            .finish()
    }
}

/// An action built from two host-supplied closures.
pub struct DelegateAction {
    execute: Box<dyn FnMut()>,
    undo: Box<dyn FnMut()>,
    label: Option<String>,
}

impl DelegateAction {
    /// Create a labeled action.
    pub fn new(
        execute: impl FnMut() + 'static,
        undo: impl FnMut() + 'static,
        label: impl Into<String>,
    ) -> Self {
        Self {
            execute: Box::new(execute),
            undo: Box::new(undo),
            label: Some(label.into()),
        }
    }

    /// Create an action without a label.
    pub fn unlabeled(execute: impl FnMut() + 'static, undo: impl FnMut() + 'static) -> Self {
        Self {
            execute: Box::new(execute),
            undo: Box::new(undo),
            label: None,
        }
    }
}

impl Action for DelegateAction {
    fn execute(&mut self) {
        (self.execute)();
    }

    fn undo(&mut self) {
        (self.undo)();
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Debug for DelegateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Several actions that undo and redo as one unit.
///
/// Children run in the order they were recorded and are undone in reverse.
pub struct BatchAction {
    children: Vec<Box<dyn Action>>,
    label: Option<String>,
}

impl BatchAction {
    /// Create a batch from children in chronological order.
    pub fn new(label: Option<String>, children: Vec<Box<dyn Action>>) -> Self {
        Self { children, label }
    }

    /// Number of child actions.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the batch has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child actions in chronological order.
    pub fn children(&self) -> impl Iterator<Item = &dyn Action> {
        self.children.iter().map(|child| child.as_ref())
    }
}

impl Action for BatchAction {
    fn execute(&mut self) {
        for child in &mut self.children {
            child.execute();
        }
    }

    fn undo(&mut self) {
        for child in self.children.iter_mut().rev() {
            child.undo();
        }
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Debug for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAction")
            .field("label", &self.label)
            .field("children", &self.children)
            .finish()
    }
}

/// Something with a world-space position that a drag can move.
///
/// `set_position` takes `&self`: movable entities are shared handles with
/// interior mutability, and a position write made on behalf of an action must
/// not record history of its own.
pub trait Movable: 'static {
    fn position(&self) -> Point;
    fn set_position(&self, position: Point);
}

/// Snapshotting positions for a move failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("entity {index} of the move set was dropped before its position could be captured")]
    EntityDropped { index: usize },
}

/// Moves a set of entities between two position snapshots.
///
/// Initial positions are captured at construction, final positions by
/// [`commit`](Self::commit). Until committed, `execute` does nothing, so the
/// action can be pushed when a drag starts and completed when it ends.
///
/// Entities are held weakly. If one has been dropped when a snapshot is taken
/// the action turns inert (both directions become no-ops) and the failure is
/// returned to the caller.
pub struct MoveEntitiesAction<E: Movable> {
    entities: Vec<Weak<E>>,
    initial: Vec<Point>,
    target: Option<Vec<Point>>,
    inert: bool,
    label: String,
}

impl<E: Movable> MoveEntitiesAction<E> {
    pub const DEFAULT_LABEL: &'static str = "Move";

    /// Capture the current positions of `entities`.
    pub fn new<'a>(entities: impl IntoIterator<Item = &'a Rc<E>>) -> Self
    where
        E: 'a,
    {
        let entities: Vec<Rc<E>> = entities.into_iter().cloned().collect();
        Self {
            initial: entities.iter().map(|entity| entity.position()).collect(),
            entities: entities.iter().map(Rc::downgrade).collect(),
            target: None,
            inert: false,
            label: Self::DEFAULT_LABEL.to_string(),
        }
    }

    /// Capture the current positions of weakly held entities.
    pub fn from_weak(entities: Vec<Weak<E>>) -> Result<Self, CaptureError> {
        let initial = snapshot(&entities).inspect_err(|err| {
            log::warn!("move action not created: {err}");
        })?;
        Ok(Self {
            entities,
            initial,
            target: None,
            inert: false,
            label: Self::DEFAULT_LABEL.to_string(),
        })
    }

    /// Replace the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Capture final positions. Call once the move has been applied.
    pub fn commit(&mut self) -> Result<(), CaptureError> {
        match snapshot(&self.entities) {
            Ok(positions) => {
                self.target = Some(positions);
                Ok(())
            }
            Err(err) => {
                log::warn!("move action `{}` is now inert: {err}", self.label);
                self.inert = true;
                self.target = None;
                Err(err)
            }
        }
    }

    /// Number of entities in the move set.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the move set is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether final positions have been captured.
    pub fn is_committed(&self) -> bool {
        self.target.is_some()
    }

    /// Whether a failed snapshot disabled this action.
    pub fn is_inert(&self) -> bool {
        self.inert
    }

    fn apply(&self, positions: &[Point]) {
        for (entity, position) in self.entities.iter().zip(positions) {
            if let Some(entity) = entity.upgrade() {
                entity.set_position(*position);
            }
        }
    }
}

fn snapshot<E: Movable>(entities: &[Weak<E>]) -> Result<Vec<Point>, CaptureError> {
    entities
        .iter()
        .enumerate()
        .map(|(index, entity)| {
            entity
                .upgrade()
                .map(|entity| entity.position())
                .ok_or(CaptureError::EntityDropped { index })
        })
        .collect()
}

impl<E: Movable> Action for MoveEntitiesAction<E> {
    fn execute(&mut self) {
        if self.inert {
            return;
        }
        if let Some(target) = &self.target {
            self.apply(target);
        }
    }

    fn undo(&mut self) {
        if self.inert {
            return;
        }
        self.apply(&self.initial);
    }

    fn label(&self) -> Option<&str> {
        Some(&self.label)
    }
}

impl<E: Movable> fmt::Debug for MoveEntitiesAction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveEntitiesAction")
            .field("label", &self.label)
            .field("entities", &self.entities.len())
            .field("committed", &self.target.is_some())
            .field("inert", &self.inert)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct Dot {
        at: Cell<Point>,
    }

    impl Dot {
        fn new(x: f64, y: f64) -> Rc<Self> {
            Rc::new(Self {
                at: Cell::new(Point::new(x, y)),
            })
        }
    }

    impl Movable for Dot {
        fn position(&self) -> Point {
            self.at.get()
        }

        fn set_position(&self, position: Point) {
            self.at.set(position);
        }
    }

    fn logging_action(log: &Rc<RefCell<Vec<String>>>, name: &str) -> Box<dyn Action> {
        let (on_execute, on_undo) = (Rc::clone(log), Rc::clone(log));
        let (execute_name, undo_name) = (format!("{name}.execute"), format!("{name}.undo"));
        Box::new(DelegateAction::new(
            move || on_execute.borrow_mut().push(execute_name.clone()),
            move || on_undo.borrow_mut().push(undo_name.clone()),
            name,
        ))
    }

    #[test]
    fn test_delegate_action_runs_closures() {
        let value = Rc::new(Cell::new(0));
        let (up, down) = (Rc::clone(&value), Rc::clone(&value));
        let mut action = DelegateAction::new(
            move || up.set(up.get() + 1),
            move || down.set(down.get() - 1),
            "Bump",
        );

        action.execute();
        assert_eq!(value.get(), 1);
        action.undo();
        assert_eq!(value.get(), 0);
        assert_eq!(action.label(), Some("Bump"));
    }

    #[test]
    fn test_unlabeled_delegate() {
        let action = DelegateAction::unlabeled(|| {}, || {});
        assert_eq!(action.label(), None);
    }

    #[test]
    fn test_batch_undo_runs_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut batch = BatchAction::new(
            Some("Batch".into()),
            vec![
                logging_action(&log, "a"),
                logging_action(&log, "b"),
                logging_action(&log, "c"),
            ],
        );

        batch.execute();
        batch.undo();

        assert_eq!(
            *log.borrow(),
            vec![
                "a.execute",
                "b.execute",
                "c.execute",
                "c.undo",
                "b.undo",
                "a.undo"
            ]
        );
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.label(), Some("Batch"));
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let dot = Dot::new(1.0, 2.0);
        let mut boxed: Box<dyn Action> = Box::new(MoveEntitiesAction::new([&dot]));

        let action: &mut dyn Action = boxed.as_mut();
        assert!(action.is::<MoveEntitiesAction<Dot>>());
        assert!(action.downcast_mut::<MoveEntitiesAction<Dot>>().is_some());
        assert!(action.downcast_ref::<DelegateAction>().is_none());
    }

    #[test]
    fn test_move_action_roundtrip() {
        let a = Dot::new(0.0, 0.0);
        let b = Dot::new(10.0, 10.0);
        let mut action = MoveEntitiesAction::new([&a, &b]);

        a.set_position(Point::new(5.0, 0.0));
        b.set_position(Point::new(15.0, 10.0));
        action.commit().unwrap();

        action.undo();
        assert_eq!(a.position(), Point::new(0.0, 0.0));
        assert_eq!(b.position(), Point::new(10.0, 10.0));

        action.execute();
        assert_eq!(a.position(), Point::new(5.0, 0.0));
        assert_eq!(b.position(), Point::new(15.0, 10.0));
    }

    #[test]
    fn test_move_action_uncommitted_execute_is_noop() {
        let a = Dot::new(3.0, 4.0);
        let mut action = MoveEntitiesAction::new([&a]);
        a.set_position(Point::new(9.0, 9.0));

        action.execute();
        assert_eq!(a.position(), Point::new(9.0, 9.0));
        assert!(!action.is_committed());
    }

    #[test]
    fn test_move_action_empty_set() {
        let mut action = MoveEntitiesAction::<Dot>::new([]);
        assert!(action.is_empty());
        action.commit().unwrap();
        action.execute();
        action.undo();
        assert!(!action.is_inert());
    }

    #[test]
    fn test_move_action_turns_inert_when_entity_dropped() {
        let keep = Dot::new(0.0, 0.0);
        let gone = Dot::new(1.0, 1.0);
        let mut action = MoveEntitiesAction::new([&keep, &gone]);
        keep.set_position(Point::new(7.0, 0.0));
        drop(gone);

        let err = action.commit().unwrap_err();
        assert_eq!(err, CaptureError::EntityDropped { index: 1 });
        assert!(action.is_inert());

        action.undo();
        assert_eq!(keep.position(), Point::new(7.0, 0.0));
    }

    #[test]
    fn test_move_action_from_dropped_weak_fails() {
        let gone = Dot::new(1.0, 1.0);
        let weak = Rc::downgrade(&gone);
        drop(gone);

        let result = MoveEntitiesAction::from_weak(vec![weak]);
        assert_eq!(result.err(), Some(CaptureError::EntityDropped { index: 0 }));
    }
}
