//! Nodes and their connectors.

use std::cell::Cell;
use std::fmt;

use kurbo::{Point, Rect, Size};
use uuid::Uuid;

use crate::action::Movable;
use crate::history::History;
use crate::interaction::{ConnectorId, EntityId};
use crate::property::{Properties, PropertyResult, PropertyTable};
use crate::tracked::{PropertyFlags, TrackedEntity};

/// Default node size in world units.
pub const DEFAULT_NODE_SIZE: Size = Size::new(160.0, 80.0);
/// Height of the title bar above the first connector row.
pub const HEADER_HEIGHT: f64 = 24.0;
/// Vertical distance between connector rows.
pub const SLOT_SPACING: f64 = 20.0;
/// Hit radius of a connector around its anchor.
pub const CONNECTOR_RADIUS: f64 = 6.0;

/// Plain node state, exposed to history through named properties.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub selected: bool,
}

impl Default for NodeData {
    fn default() -> Self {
        Self {
            title: String::new(),
            x: 0.0,
            y: 0.0,
            width: DEFAULT_NODE_SIZE.width,
            height: DEFAULT_NODE_SIZE.height,
            selected: false,
        }
    }
}

impl Properties for NodeData {
    fn describe(table: &mut PropertyTable<Self>) {
        table
            .property("title", |n| n.title.clone(), |n, v| n.title = v)
            .property("x", |n| n.x, |n, v| n.x = v)
            .property("y", |n| n.y, |n, v| n.y = v)
            .property("width", |n| n.width, |n, v| n.width = v)
            .property("height", |n| n.height, |n, v| n.height = v)
            .property("selected", |n| n.selected, |n, v| n.selected = v)
            .read_only("bounds", NodeData::bounds);
    }
}

impl NodeData {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

/// Direction of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorKind {
    Input,
    Output,
}

/// A connection point on the left (input) or right (output) edge of a node.
pub struct Connector {
    id: ConnectorId,
    owner: EntityId,
    kind: ConnectorKind,
    name: String,
    slot: usize,
    connected: Cell<bool>,
}

impl Connector {
    pub fn id(&self) -> ConnectorId {
        self.id
    }

    /// The node this connector belongs to.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn is_output(&self) -> bool {
        self.kind == ConnectorKind::Output
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether at least one connection ends here.
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    /// World-space anchor for a node occupying `bounds`.
    pub fn anchor(&self, bounds: Rect) -> Point {
        let x = match self.kind {
            ConnectorKind::Input => bounds.x0,
            ConnectorKind::Output => bounds.x1,
        };
        let y = bounds.y0 + HEADER_HEIGHT + self.slot as f64 * SLOT_SPACING;
        Point::new(x, y)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("connected", &self.connected.get())
            .finish()
    }
}

/// A node on the canvas.
///
/// Renaming is undoable: `title` is tracked from construction. Position and
/// selection writes are not recorded here; moves are captured as a whole by
/// a [`MoveEntitiesAction`](crate::MoveEntitiesAction).
#[derive(Debug)]
pub struct Node {
    id: EntityId,
    entity: TrackedEntity<NodeData>,
    inputs: Vec<Connector>,
    outputs: Vec<Connector>,
}

impl Node {
    /// Create a node at `position` recording into `history`.
    pub fn new(title: impl Into<String>, position: Point, history: &History) -> Self {
        let data = NodeData {
            title: title.into(),
            x: position.x,
            y: position.y,
            ..NodeData::default()
        };
        let entity = TrackedEntity::new(data, history);
        if let Err(err) = entity.record_property("title", PropertyFlags::Enable) {
            log::warn!("node title will not be undoable: {err}");
        }
        Self {
            id: Uuid::new_v4(),
            entity,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Add an input connector.
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        let connector = self.connector(ConnectorKind::Input, name.into(), self.inputs.len());
        self.inputs.push(connector);
        self
    }

    /// Add an output connector.
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        let connector = self.connector(ConnectorKind::Output, name.into(), self.outputs.len());
        self.outputs.push(connector);
        self
    }

    pub fn with_size(self, size: Size) -> Self {
        self.assign("width", size.width);
        self.assign("height", size.height);
        self
    }

    fn connector(&self, kind: ConnectorKind, name: String, slot: usize) -> Connector {
        Connector {
            id: Uuid::new_v4(),
            owner: self.id,
            kind,
            name,
            slot,
            connected: Cell::new(false),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The tracked entity holding this node's state.
    pub fn entity(&self) -> &TrackedEntity<NodeData> {
        &self.entity
    }

    pub fn title(&self) -> String {
        self.entity.read(|n| n.title.clone())
    }

    /// Rename the node. Recorded as one undo step when the title changes.
    pub fn set_title(&self, title: impl Into<String>) -> PropertyResult<bool> {
        self.entity.set("title", title.into())
    }

    pub fn bounds(&self) -> Rect {
        self.entity.read(NodeData::bounds)
    }

    pub fn is_selected(&self) -> bool {
        self.entity.read(|n| n.selected)
    }

    pub fn set_selected(&self, selected: bool) {
        self.assign("selected", selected);
    }

    pub fn inputs(&self) -> &[Connector] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Connector] {
        &self.outputs
    }

    /// Every connector, inputs first.
    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.inputs.iter().chain(&self.outputs)
    }

    pub fn find_connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors().find(|connector| connector.id == id)
    }

    /// The connector whose anchor is within [`CONNECTOR_RADIUS`] of `point`.
    pub fn connector_at(&self, point: Point) -> Option<&Connector> {
        let bounds = self.bounds();
        self.connectors()
            .find(|c| c.anchor(bounds).distance(point) <= CONNECTOR_RADIUS)
    }

    fn assign<V: PartialEq + 'static>(&self, name: &str, value: V) {
        if let Err(err) = self.entity.assign(name, value) {
            log::warn!("node {}: {err}", self.id);
        }
    }
}

impl Movable for Node {
    fn position(&self) -> Point {
        self.entity.read(|n| Point::new(n.x, n.y))
    }

    fn set_position(&self, position: Point) {
        self.assign("x", position.x);
        self.assign("y", position.y);
    }
}
