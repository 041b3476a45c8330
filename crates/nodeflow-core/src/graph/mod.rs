//! Node graph document and the reference editor host.
//!
//! [`NodeGraph`] owns z-ordered nodes and the connections between their
//! connectors. Structural edits (adding and deleting nodes, connecting and
//! disconnecting) go through the graph's [`History`] so they undo as single
//! steps. As an [`EditorHost`] it answers hit tests for the
//! [`InteractionStateMachine`](crate::InteractionStateMachine) and turns its
//! notifications into history entries.

mod connection;
mod node;

pub use connection::{Connection, ConnectionDraft, ConnectionRejection, READY_HINT};
pub use node::{
    CONNECTOR_RADIUS, Connector, ConnectorKind, DEFAULT_NODE_SIZE, HEADER_HEIGHT, Node, NodeData,
    SLOT_SPACING,
};

use std::cell::RefCell;
use std::rc::Rc;

use kurbo::{Point, Rect};
use uuid::Uuid;

use crate::action::{Movable, MoveEntitiesAction};
use crate::history::History;
use crate::interaction::{
    ConnectorId, EditorEvent, EditorHost, EntityId, EntityStore, HitTarget, HitTest,
};

/// Label of the undo step recorded for a drag.
pub const MOVE_LABEL: &str = "Move nodes";

#[derive(Default)]
struct GraphState {
    /// Back to front.
    nodes: Vec<Rc<Node>>,
    connections: Vec<Connection>,
}

impl GraphState {
    fn node(&self, id: EntityId) -> Option<&Rc<Node>> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    fn connector(&self, id: ConnectorId) -> Option<(&Rc<Node>, &Connector)> {
        self.nodes.iter().find_map(|node| {
            let connector = node.find_connector(id)?;
            Some((node, connector))
        })
    }

    fn add_connection(&mut self, index: usize, connection: Connection) {
        let index = index.min(self.connections.len());
        self.connections.insert(index, connection);
        self.sync_connected(&connection);
    }

    fn connection_index(&self, id: Uuid) -> Option<usize> {
        self.connections.iter().position(|c| c.id == id)
    }

    fn remove_connection(&mut self, id: Uuid) -> Option<(usize, Connection)> {
        let index = self.connection_index(id)?;
        let connection = self.connections.remove(index);
        self.sync_connected(&connection);
        Some((index, connection))
    }

    fn remove_nodes(&mut self, ids: &[EntityId]) {
        self.nodes.retain(|node| !ids.contains(&node.id()));
    }

    /// Refresh the connected flags of both ends of `connection`.
    fn sync_connected(&self, connection: &Connection) {
        for end in [connection.source, connection.target] {
            let connected = self.connections.iter().any(|c| c.touches(end));
            if let Some((_, connector)) = self.connector(end) {
                connector.set_connected(connected);
            }
        }
    }
}

/// Nodes, connections and the history that records edits to them.
pub struct NodeGraph {
    state: Rc<RefCell<GraphState>>,
    history: History,
    draft: ConnectionDraft,
    opt_out_regions: Vec<Rect>,
}

impl NodeGraph {
    pub fn new(history: History) -> Self {
        Self {
            state: Rc::new(RefCell::new(GraphState::default())),
            history,
            draft: ConnectionDraft::default(),
            opt_out_regions: Vec::new(),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Insert a node on top without recording history, e.g. when building
    /// the initial document.
    pub fn insert_node(&mut self, node: Node) -> Rc<Node> {
        let node = Rc::new(node);
        self.state.borrow_mut().nodes.push(Rc::clone(&node));
        node
    }

    /// Add a node on top as an undoable step.
    pub fn add_node(&mut self, node: Node) -> Rc<Node> {
        let node = Rc::new(node);
        let (state, added) = (Rc::clone(&self.state), Rc::clone(&node));
        let (undo_state, id) = (Rc::clone(&self.state), node.id());
        self.history.record(
            move || state.borrow_mut().nodes.push(Rc::clone(&added)),
            move || undo_state.borrow_mut().nodes.retain(|n| n.id() != id),
            "Add node",
        );
        node
    }

    pub fn node(&self, id: EntityId) -> Option<Rc<Node>> {
        self.state.borrow().node(id).cloned()
    }

    /// Nodes back to front.
    pub fn nodes(&self) -> Vec<Rc<Node>> {
        self.state.borrow().nodes.clone()
    }

    pub fn node_count(&self) -> usize {
        self.state.borrow().nodes.len()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.state.borrow().connections.clone()
    }

    /// The node owning `connector`.
    pub fn connector_owner(&self, connector: ConnectorId) -> Option<Rc<Node>> {
        self.state
            .borrow()
            .connector(connector)
            .map(|(node, _)| Rc::clone(node))
    }

    pub fn is_connected(&self, connector: ConnectorId) -> bool {
        self.state
            .borrow()
            .connector(connector)
            .is_some_and(|(_, connector)| connector.is_connected())
    }

    /// Delete the selected nodes and every connection touching them as one
    /// undo step. Returns the number of nodes removed.
    pub fn delete_selected(&mut self) -> usize {
        let selected: Vec<EntityId> = self.selected_ids();
        if selected.is_empty() {
            return 0;
        }

        let _batch = self.history.batch("Delete selection");

        let doomed: Vec<Uuid> = {
            let state = self.state.borrow();
            let selected_end = |end: ConnectorId| {
                state
                    .connector(end)
                    .is_some_and(|(_, connector)| selected.contains(&connector.owner()))
            };
            state
                .connections
                .iter()
                .filter(|c| selected_end(c.source) || selected_end(c.target))
                .map(|connection| connection.id)
                .collect()
        };
        for id in doomed {
            self.remove_connection(id);
        }

        let removed: Vec<(usize, Rc<Node>)> = {
            let state = self.state.borrow();
            state
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, node)| selected.contains(&node.id()))
                .map(|(index, node)| (index, Rc::clone(node)))
                .collect()
        };
        let (state, undo_state) = (Rc::clone(&self.state), Rc::clone(&self.state));
        let restore = removed.clone();
        self.history.record(
            move || state.borrow_mut().remove_nodes(&selected),
            move || {
                let mut state = undo_state.borrow_mut();
                for (index, node) in &restore {
                    let index = (*index).min(state.nodes.len());
                    state.nodes.insert(index, Rc::clone(node));
                }
            },
            "Delete nodes",
        );
        removed.len()
    }

    /// Check whether `source` may be linked to `target`.
    pub fn validate(
        &self,
        source: ConnectorId,
        target: Option<ConnectorId>,
    ) -> Result<(), ConnectionRejection> {
        let target = target
            .filter(|target| *target != source)
            .ok_or(ConnectionRejection::NoTarget)?;
        let state = self.state.borrow();
        let (source_node, source) = state
            .connector(source)
            .ok_or(ConnectionRejection::UnknownConnector(source))?;
        let (target_node, target) = state
            .connector(target)
            .ok_or(ConnectionRejection::UnknownConnector(target))?;

        if source.kind() == target.kind() {
            return Err(ConnectionRejection::SameDirection);
        }
        if source_node.id() == target_node.id() {
            return Err(ConnectionRejection::SameNode);
        }
        Ok(())
    }

    /// Validate the current draft and update its hint.
    pub fn can_create_connection(&mut self) -> bool {
        let Some(source) = self.draft.source else {
            self.draft.hint = ConnectionRejection::NoTarget.to_string();
            return false;
        };
        let result = self.validate(source, self.draft.target);
        self.draft.hint = match &result {
            Ok(()) => READY_HINT.to_string(),
            Err(rejection) => rejection.to_string(),
        };
        result.is_ok()
    }

    /// The connection being dragged out, if any.
    pub fn draft(&self) -> &ConnectionDraft {
        &self.draft
    }

    /// Link two connectors as an undoable step.
    ///
    /// The connectors may be given in either order; the connection always
    /// runs from the output to the input.
    pub fn create_connection(
        &mut self,
        a: ConnectorId,
        b: ConnectorId,
    ) -> Result<Connection, ConnectionRejection> {
        self.validate(a, Some(b))?;
        let a_is_output = self
            .state
            .borrow()
            .connector(a)
            .is_some_and(|(_, connector)| connector.is_output());
        let connection = if a_is_output {
            Connection::new(a, b)
        } else {
            Connection::new(b, a)
        };

        let (state, undo_state) = (Rc::clone(&self.state), Rc::clone(&self.state));
        let index = self.state.borrow().connections.len();
        self.history.record(
            move || state.borrow_mut().add_connection(index, connection),
            move || {
                undo_state.borrow_mut().remove_connection(connection.id);
            },
            "Connect",
        );
        log::debug!("connected {} -> {}", connection.source, connection.target);
        Ok(connection)
    }

    /// Remove a connection as an undoable step. Returns `false` if it does
    /// not exist.
    pub fn remove_connection(&mut self, id: Uuid) -> bool {
        let Some(index) = self.state.borrow().connection_index(id) else {
            return false;
        };
        let (state, undo_state) = (Rc::clone(&self.state), Rc::clone(&self.state));
        let removed = Rc::new(RefCell::new(None));
        let stash = Rc::clone(&removed);
        self.history.record(
            move || *stash.borrow_mut() = state.borrow_mut().remove_connection(id),
            move || {
                if let Some((index, connection)) = removed.borrow_mut().take() {
                    undo_state.borrow_mut().add_connection(index, connection);
                }
            },
            "Disconnect",
        );
        log::debug!("removed connection {id} at {index}");
        true
    }

    /// Suppress canvas gestures inside `region` (world space).
    pub fn add_opt_out_region(&mut self, region: Rect) {
        self.opt_out_regions.push(region);
    }

    pub fn clear_opt_out_regions(&mut self) {
        self.opt_out_regions.clear();
    }

    fn selected_nodes(&self) -> Vec<Rc<Node>> {
        self.state
            .borrow()
            .nodes
            .iter()
            .filter(|node| node.is_selected())
            .cloned()
            .collect()
    }

    fn begin_move(&self) {
        let selected = self.selected_nodes();
        let action = MoveEntitiesAction::new(&selected).with_label(MOVE_LABEL);
        self.history.execute_action(action);
    }

    fn finish_move(&self) {
        let committed = self.history.with_current(|action| {
            action
                .downcast_mut::<MoveEntitiesAction<Node>>()
                .map(MoveEntitiesAction::commit)
        });
        match committed {
            Some(Some(Ok(()))) => {}
            Some(Some(Err(err))) => log::warn!("drag could not be recorded: {err}"),
            _ => log::debug!("drag finished without a pending move action"),
        }
    }

    fn finish_connection(&mut self, source: ConnectorId, target: ConnectorId) {
        self.draft.target = Some(target);
        if self.can_create_connection() {
            if let Err(rejection) = self.create_connection(source, target) {
                log::warn!("connection refused: {rejection}");
            }
        } else {
            log::warn!("connection refused: {}", self.draft.hint);
        }
        self.draft = ConnectionDraft::default();
    }
}

impl HitTest for NodeGraph {
    fn classify(&self, point: Point) -> HitTarget {
        let state = self.state.borrow();
        let front_to_back = || state.nodes.iter().rev();

        if let Some(connector) = front_to_back().find_map(|node| node.connector_at(point)) {
            return HitTarget::Connector {
                connector: connector.id(),
                owner: Some(connector.owner()),
            };
        }
        front_to_back()
            .find(|node| node.bounds().contains(point))
            .map_or(HitTarget::None, |node| HitTarget::Item(node.id()))
    }

    fn is_in_opt_out_region(&self, point: Point) -> bool {
        self.opt_out_regions
            .iter()
            .any(|region| region.contains(point))
    }

    fn connector_anchor(&self, connector: ConnectorId) -> Option<Point> {
        self.state
            .borrow()
            .connector(connector)
            .map(|(node, connector)| connector.anchor(node.bounds()))
    }
}

impl EntityStore for NodeGraph {
    fn entity_ids(&self) -> Vec<EntityId> {
        self.nodes().iter().map(|node| node.id()).collect()
    }

    fn selected_ids(&self) -> Vec<EntityId> {
        self.selected_nodes().iter().map(|node| node.id()).collect()
    }

    fn is_selected(&self, id: EntityId) -> bool {
        self.node(id).is_some_and(|node| node.is_selected())
    }

    fn select(&mut self, id: EntityId, additive: bool) {
        for node in &self.state.borrow().nodes {
            if node.id() == id {
                node.set_selected(true);
            } else if !additive {
                node.set_selected(false);
            }
        }
    }

    fn clear_selection(&mut self) {
        for node in &self.state.borrow().nodes {
            node.set_selected(false);
        }
    }

    fn bounds(&self, id: EntityId) -> Option<Rect> {
        self.state.borrow().node(id).map(|node| node.bounds())
    }

    fn position(&self, id: EntityId) -> Option<Point> {
        self.state.borrow().node(id).map(|node| node.position())
    }

    fn set_position(&mut self, id: EntityId, position: Point) {
        if let Some(node) = self.node(id) {
            node.set_position(position);
        }
    }

    fn bring_to_front(&mut self, id: EntityId) {
        let mut state = self.state.borrow_mut();
        if let Some(index) = state.nodes.iter().position(|node| node.id() == id) {
            let node = state.nodes.remove(index);
            state.nodes.push(node);
        }
    }
}

impl EditorHost for NodeGraph {
    fn notify(&mut self, event: EditorEvent) {
        match event {
            EditorEvent::DragStarted => self.begin_move(),
            EditorEvent::DragFinished => self.finish_move(),
            EditorEvent::ConnectionStarted(source) => {
                self.draft = ConnectionDraft::new(source);
                self.can_create_connection();
            }
            EditorEvent::ConnectionTargetChanged(target) => {
                self.draft.target = target;
                self.can_create_connection();
            }
            EditorEvent::ConnectionFinished { source, target } => {
                self.finish_connection(source, target)
            }
            EditorEvent::ConnectionCancelled(_) => self.draft = ConnectionDraft::default(),
        }
    }
}

impl std::fmt::Debug for NodeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("NodeGraph")
            .field("nodes", &state.nodes.len())
            .field("connections", &state.connections.len())
            .field("history", &self.history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        graph: NodeGraph,
        a: Rc<Node>,
        b: Rc<Node>,
    }

    fn fixture() -> Fixture {
        let history = History::new();
        let mut graph = NodeGraph::new(history.clone());
        let a = graph.insert_node(
            Node::new("a", Point::ZERO, &history)
                .with_input("in_0")
                .with_output("out_0")
                .with_output("out_1"),
        );
        let b = graph.insert_node(
            Node::new("b", Point::new(200.0, 0.0), &history)
                .with_input("in_0")
                .with_output("out_0"),
        );
        Fixture { graph, a, b }
    }

    #[test]
    fn test_add_node_undo_redo() {
        let Fixture { mut graph, .. } = fixture();
        let history = graph.history().clone();
        let node = graph.add_node(Node::new("c", Point::new(0.0, 300.0), &history));

        assert_eq!(graph.node_count(), 3);
        assert_eq!(history.current_label().as_deref(), Some("Add node"));
        history.undo();
        assert!(graph.node(node.id()).is_none());
        history.redo();
        assert!(graph.node(node.id()).is_some());
    }

    #[test]
    fn test_create_connection_orients_output_to_input() {
        let Fixture { mut graph, a, b } = fixture();
        let input = b.inputs()[0].id();
        let output = a.outputs()[0].id();

        let connection = graph.create_connection(input, output).unwrap();
        assert_eq!(connection.source, output);
        assert_eq!(connection.target, input);
        assert!(graph.is_connected(input));
        assert!(graph.is_connected(output));

        graph.history().undo();
        assert!(graph.connections().is_empty());
        assert!(!graph.is_connected(input));
    }

    #[test]
    fn test_validation_rules() {
        let Fixture { graph, a, b } = fixture();
        let a_out = a.outputs()[0].id();

        assert_eq!(
            graph.validate(a_out, None),
            Err(ConnectionRejection::NoTarget)
        );
        assert_eq!(
            graph.validate(a_out, Some(a_out)),
            Err(ConnectionRejection::NoTarget)
        );
        assert_eq!(
            graph.validate(a_out, Some(b.outputs()[0].id())),
            Err(ConnectionRejection::SameDirection)
        );
        assert_eq!(
            graph.validate(a_out, Some(a.inputs()[0].id())),
            Err(ConnectionRejection::SameNode)
        );
        assert!(graph.validate(a_out, Some(b.inputs()[0].id())).is_ok());
    }

    #[test]
    fn test_draft_hint_follows_target() {
        let Fixture { mut graph, a, b } = fixture();
        graph.notify(EditorEvent::ConnectionStarted(a.outputs()[0].id()));
        assert_eq!(graph.draft().hint, "drag to connect");

        let target = b.inputs()[0].id();
        graph.notify(EditorEvent::ConnectionTargetChanged(Some(target)));
        assert_eq!(graph.draft().hint, READY_HINT);

        let target = a.inputs()[0].id();
        graph.notify(EditorEvent::ConnectionTargetChanged(Some(target)));
        assert_eq!(graph.draft().hint, "cannot connect a node to itself");
    }

    #[test]
    fn test_connected_flag_stays_while_other_connection_remains() {
        let Fixture { mut graph, a, b } = fixture();
        let b_in = b.inputs()[0].id();
        let first = graph.create_connection(a.outputs()[0].id(), b_in).unwrap();
        graph.create_connection(a.outputs()[1].id(), b_in).unwrap();

        assert!(graph.remove_connection(first.id));
        assert!(graph.is_connected(b_in));
        assert!(!graph.is_connected(a.outputs()[0].id()));
        assert!(!graph.remove_connection(first.id));
    }

    #[test]
    fn test_delete_selected_is_one_step() {
        let Fixture { mut graph, a, b } = fixture();
        let b_in = b.inputs()[0].id();
        graph.create_connection(a.outputs()[0].id(), b_in).unwrap();
        let history = graph.history().clone();
        let before = history.undo_count();
        graph.select(a.id(), false);

        assert_eq!(graph.delete_selected(), 1);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.connections().is_empty());
        assert!(!graph.is_connected(b_in));
        assert_eq!(history.undo_count(), before + 1);
        assert_eq!(history.current_label().as_deref(), Some("Delete selection"));

        history.undo();
        assert_eq!(graph.entity_ids(), vec![a.id(), b.id()]);
        assert_eq!(graph.connections().len(), 1);
        assert!(graph.is_connected(b_in));
    }

    #[test]
    fn test_delete_without_selection_records_nothing() {
        let Fixture { mut graph, .. } = fixture();
        assert_eq!(graph.delete_selected(), 0);
        assert!(!graph.history().can_undo());
    }

    #[test]
    fn test_classify_prefers_connectors_and_top_node() {
        let Fixture { mut graph, a, b } = fixture();
        b.set_position(Point::new(50.0, 0.0));

        let overlap = Point::new(100.0, 10.0);
        assert_eq!(graph.classify(overlap), HitTarget::Item(b.id()));
        graph.bring_to_front(a.id());
        assert_eq!(graph.classify(overlap), HitTarget::Item(a.id()));

        let anchor = a.inputs()[0].anchor(a.bounds());
        assert_eq!(
            graph.classify(anchor),
            HitTarget::Connector {
                connector: a.inputs()[0].id(),
                owner: Some(a.id()),
            }
        );
        assert_eq!(graph.connector_anchor(a.inputs()[0].id()), Some(anchor));
        assert_eq!(graph.classify(Point::new(-500.0, 0.0)), HitTarget::None);
    }

    #[test]
    fn test_select_replaces_or_adds() {
        let Fixture { mut graph, a, b } = fixture();
        graph.select(a.id(), false);
        graph.select(b.id(), false);
        assert_eq!(graph.selected_ids(), vec![b.id()]);

        graph.select(a.id(), true);
        assert_eq!(graph.selected_ids(), vec![a.id(), b.id()]);
        graph.clear_selection();
        assert!(graph.selected_ids().is_empty());
    }

    #[test]
    fn test_drag_notifications_record_move() {
        let Fixture { mut graph, a, b } = fixture();
        graph.select(a.id(), false);

        graph.notify(EditorEvent::DragStarted);
        graph.set_position(a.id(), Point::new(30.0, 40.0));
        graph.notify(EditorEvent::DragFinished);

        let history = graph.history().clone();
        assert_eq!(history.current_label().as_deref(), Some(MOVE_LABEL));
        history.undo();
        assert_eq!(a.position(), Point::ZERO);
        assert_eq!(b.position(), Point::new(200.0, 0.0));
        history.redo();
        assert_eq!(a.position(), Point::new(30.0, 40.0));
    }
}
