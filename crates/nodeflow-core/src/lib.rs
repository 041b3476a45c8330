//! Nodeflow Core Library
//!
//! Interaction core of the Nodeflow node editor: an undo/redo engine built
//! from reversible actions, property-level undo capture for entities, the
//! pan/zoom view transform, and the pointer gesture state machine.

pub mod action;
pub mod graph;
pub mod history;
pub mod input;
pub mod interaction;
pub mod options;
pub mod property;
pub mod tracked;
pub mod transform;

pub use action::{Action, BatchAction, CaptureError, DelegateAction, Movable, MoveEntitiesAction};
pub use graph::{
    Connection, ConnectionDraft, ConnectionRejection, Connector, ConnectorKind, Node, NodeGraph,
};
pub use history::{BatchScope, History, WeakHistory};
pub use input::{Modifiers, MouseButton, PointerButtons, PointerEvent};
pub use interaction::{
    ConnectorId, EditorEvent, EditorHost, EntityId, EntityStore, GestureState, HitTarget, HitTest,
    InteractionStateMachine, PendingConnection,
};
pub use options::{Capabilities, EditorOptions, OptionsError};
pub use property::{ConfigurationError, Properties, PropertyAccessor, PropertyCache, PropertyTable};
pub use tracked::{PropertyFlags, TrackedEntity};
pub use transform::{ViewTransform, ZOOM_STEP};
