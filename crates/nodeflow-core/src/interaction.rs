//! Gesture recognition for the editor canvas.
//!
//! [`InteractionStateMachine`] turns a stream of [`PointerEvent`]s into modal
//! editing gestures. What lies under the pointer is answered by the host
//! through [`HitTest`]; selection and positions live in the host's
//! [`EntityStore`]. The machine never walks a widget tree itself.

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::input::{Modifiers, PointerButtons, PointerEvent};
use crate::options::EditorOptions;
use crate::transform::ViewTransform;

/// Identifier of an item on the canvas.
pub type EntityId = Uuid;
/// Identifier of a connector.
pub type ConnectorId = Uuid;

/// Modal state of the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GestureState {
    #[default]
    Idle,
    Panning,
    WindowSelection,
    Dragging,
    Connecting,
}

impl GestureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, GestureState::Idle)
    }
}

/// What a world-space point lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitTarget {
    #[default]
    None,
    Item(EntityId),
    Connector {
        connector: ConnectorId,
        /// Item the connector belongs to, if any.
        owner: Option<EntityId>,
    },
}

impl HitTarget {
    /// The item that was hit, including a connector's owner.
    pub fn item(&self) -> Option<EntityId> {
        match *self {
            HitTarget::Item(id) => Some(id),
            HitTarget::Connector { owner, .. } => owner,
            HitTarget::None => None,
        }
    }

    pub fn connector(&self) -> Option<ConnectorId> {
        match *self {
            HitTarget::Connector { connector, .. } => Some(connector),
            _ => None,
        }
    }
}

/// Notifications sent to the host while gestures run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    /// Selected items are about to move.
    DragStarted,
    /// The drag ended; final positions are in place.
    DragFinished,
    ConnectionStarted(ConnectorId),
    /// The connector under the cursor changed while connecting.
    ConnectionTargetChanged(Option<ConnectorId>),
    /// A pending connection was released over a connector.
    ConnectionFinished {
        source: ConnectorId,
        target: ConnectorId,
    },
    /// A pending connection was released over nothing.
    ConnectionCancelled(ConnectorId),
}

/// Spatial queries the host answers for the machine.
///
/// Points are in world coordinates.
pub trait HitTest {
    fn classify(&self, point: Point) -> HitTarget;

    /// Whether `point` lies in a region that suppresses canvas gestures,
    /// such as an interactive control embedded in an item.
    fn is_in_opt_out_region(&self, _point: Point) -> bool {
        false
    }

    /// World-space attachment point of a connector.
    fn connector_anchor(&self, connector: ConnectorId) -> Option<Point>;
}

/// The host's items and their selection.
pub trait EntityStore {
    fn entity_ids(&self) -> Vec<EntityId>;
    fn selected_ids(&self) -> Vec<EntityId>;
    fn is_selected(&self, id: EntityId) -> bool;
    /// Select `id`, replacing the selection unless `additive`.
    fn select(&mut self, id: EntityId, additive: bool);
    fn clear_selection(&mut self);
    /// World-space bounds of an item.
    fn bounds(&self, id: EntityId) -> Option<Rect>;
    fn position(&self, id: EntityId) -> Option<Point>;
    fn set_position(&mut self, id: EntityId, position: Point);

    /// Raise `id` above every other item.
    fn bring_to_front(&mut self, _id: EntityId) {}
}

/// Everything the machine needs from the surface it runs on.
pub trait EditorHost: HitTest + EntityStore {
    /// Acquire or release pointer capture.
    fn set_pointer_capture(&mut self, _captured: bool) {}

    fn notify(&mut self, _event: EditorEvent) {}
}

/// The rubber band drawn while a connection is being made.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PendingConnection {
    /// World-space anchor of the source connector.
    pub source: Point,
    /// World-space far endpoint.
    pub target: Point,
    pub source_connector: Option<ConnectorId>,
    pub target_connector: Option<ConnectorId>,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    position: Point,
    hit: HitTarget,
}

/// Pointer gesture recognizer.
#[derive(Debug, Clone)]
pub struct InteractionStateMachine {
    state: GestureState,
    options: EditorOptions,
    view: ViewTransform,
    press: Option<Press>,
    /// Transform captured when a pan could start.
    pan_origin: Option<ViewTransform>,
    /// Positions of the dragged items when the drag started.
    drag_origins: Vec<(EntityId, Point)>,
    /// Marquee in screen space.
    marquee: Option<Rect>,
    pending: PendingConnection,
    captured: bool,
}

impl Default for InteractionStateMachine {
    fn default() -> Self {
        Self::new(EditorOptions::default())
    }
}

impl InteractionStateMachine {
    pub fn new(options: EditorOptions) -> Self {
        let mut view = ViewTransform::new();
        view.set_limits(options.zoom_limits);
        Self {
            state: GestureState::Idle,
            options,
            view,
            press: None,
            pan_origin: None,
            drag_origins: Vec::new(),
            marquee: None,
            pending: PendingConnection::default(),
            captured: false,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn options(&self) -> &EditorOptions {
        &self.options
    }

    /// Replace the options. Zoom limits apply to future zooms.
    pub fn set_options(&mut self, options: EditorOptions) {
        self.view.set_limits(options.zoom_limits);
        self.options = options;
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }

    pub fn pending_connection(&self) -> &PendingConnection {
        &self.pending
    }

    /// The marquee rectangle in screen space, while window-selecting.
    pub fn marquee(&self) -> Option<Rect> {
        self.marquee
    }

    pub fn is_capturing(&self) -> bool {
        self.captured
    }

    /// Feed one pointer event.
    pub fn handle<H: EditorHost + ?Sized>(&mut self, host: &mut H, event: PointerEvent) {
        match event {
            PointerEvent::Down {
                position,
                buttons,
                modifiers,
            } => self.pointer_down(host, position, buttons, modifiers),
            PointerEvent::Move { position, buttons } => self.pointer_move(host, position, buttons),
            PointerEvent::Up { position, .. } => self.pointer_up(host, position),
            PointerEvent::Wheel {
                position,
                delta,
                modifiers,
            } => {
                self.wheel(position, delta, modifiers);
            }
        }
    }

    /// Handle a button press at a screen position.
    pub fn pointer_down<H: EditorHost + ?Sized>(
        &mut self,
        host: &mut H,
        position: Point,
        buttons: PointerButtons,
        modifiers: Modifiers,
    ) {
        if !self.state.is_idle() {
            return;
        }
        let world = self.view.screen_to_world(position);
        if host.is_in_opt_out_region(world) {
            self.press = None;
            return;
        }

        let hit = host.classify(world);
        if let Some(item) = hit.item() {
            host.bring_to_front(item);
        }

        self.pending = PendingConnection::default();
        if buttons.left {
            match hit {
                HitTarget::Item(id) => {
                    if !host.is_selected(id) {
                        host.select(id, modifiers.shift);
                    }
                }
                HitTarget::None => host.clear_selection(),
                HitTarget::Connector { connector, .. } => {
                    let anchor = host.connector_anchor(connector).unwrap_or(world);
                    self.pending.source_connector = Some(connector);
                    self.pending.source = anchor;
                    self.pending.target = anchor;
                }
            }
        }
        self.pan_origin = buttons.middle.then_some(self.view);
        self.press = Some(Press { position, hit });
    }

    /// Handle pointer motion at a screen position.
    pub fn pointer_move<H: EditorHost + ?Sized>(
        &mut self,
        host: &mut H,
        position: Point,
        buttons: PointerButtons,
    ) {
        if self.state.is_idle() && host.is_in_opt_out_region(self.view.screen_to_world(position)) {
            return;
        }
        let Some(press) = self.press else {
            return;
        };

        let delta = position - press.position;
        if self.state.is_idle() && self.exceeds_threshold(delta) {
            let target = if buttons.left {
                Some(match press.hit {
                    HitTarget::Connector { .. } => GestureState::Connecting,
                    HitTarget::Item(_) => GestureState::Dragging,
                    HitTarget::None => GestureState::WindowSelection,
                })
            } else if buttons.middle {
                Some(GestureState::Panning)
            } else {
                None
            };
            if let Some(target) = target {
                self.goto(host, target);
            }
        }

        match self.state {
            GestureState::Dragging => self.drag_move(host, delta),
            GestureState::WindowSelection => self.update_marquee(host, press.position, delta),
            GestureState::Panning => {
                if let Some(origin) = self.pan_origin {
                    self.view = origin.translated(delta);
                }
            }
            GestureState::Connecting => self.snap_pending_connection(host, position),
            GestureState::Idle => {}
        }
    }

    /// Handle a button release at a screen position. Always ends in `Idle`.
    pub fn pointer_up<H: EditorHost + ?Sized>(&mut self, host: &mut H, position: Point) {
        match self.state {
            GestureState::Dragging => host.notify(EditorEvent::DragFinished),
            GestureState::WindowSelection => self.marquee = None,
            GestureState::Connecting => {
                self.snap_pending_connection(host, position);
                if let Some(source) = self.pending.source_connector {
                    match self.pending.target_connector {
                        Some(target) => {
                            host.notify(EditorEvent::ConnectionFinished { source, target })
                        }
                        None => host.notify(EditorEvent::ConnectionCancelled(source)),
                    }
                }
            }
            GestureState::Panning | GestureState::Idle => {}
        }

        self.goto(host, GestureState::Idle);
        self.press = None;
        self.pan_origin = None;
        self.pending = PendingConnection::default();
    }

    /// Zoom about the cursor by one step per wheel tick.
    ///
    /// Returns `true` if the view changed.
    pub fn wheel(&mut self, position: Point, delta: Vec2, modifiers: Modifiers) -> bool {
        if !self.state.is_idle() || !self.options.capabilities.pan_and_zoom {
            return false;
        }
        if self.options.zoom_requires_ctrl && !modifiers.ctrl {
            return false;
        }
        let step = self.options.zoom_in_factor;
        if delta.y > 0.0 {
            self.view.zoom_in(position, step)
        } else if delta.y < 0.0 {
            self.view.zoom_out(position, step)
        } else {
            false
        }
    }

    /// Abort the current gesture, e.g. after the host lost pointer capture.
    pub fn cancel<H: EditorHost + ?Sized>(&mut self, host: &mut H) {
        match self.state {
            GestureState::Dragging => host.notify(EditorEvent::DragFinished),
            GestureState::Connecting => {
                if let Some(source) = self.pending.source_connector {
                    host.notify(EditorEvent::ConnectionCancelled(source));
                }
            }
            _ => {}
        }
        self.goto(host, GestureState::Idle);
        self.press = None;
        self.pan_origin = None;
        self.marquee = None;
        self.pending = PendingConnection::default();
    }

    fn exceeds_threshold(&self, delta: Vec2) -> bool {
        let threshold = self.options.drag_threshold;
        delta.x.abs() > threshold || delta.y.abs() > threshold
    }

    fn can_enter(&self, state: GestureState) -> bool {
        let capabilities = self.options.capabilities;
        match state {
            GestureState::Idle | GestureState::WindowSelection => true,
            GestureState::Panning => capabilities.pan_and_zoom,
            GestureState::Dragging => capabilities.drag_move,
            GestureState::Connecting => {
                capabilities.connection && self.pending.source_connector.is_some()
            }
        }
    }

    fn goto<H: EditorHost + ?Sized>(&mut self, host: &mut H, state: GestureState) -> bool {
        if self.state == state {
            return false;
        }
        if !self.can_enter(state) {
            log::debug!("gesture: {:?} -> {:?} refused", self.state, state);
            return false;
        }
        log::debug!("gesture: {:?} -> {:?}", self.state, state);
        self.state = state;

        // Capture is held for exactly the time spent outside Idle.
        if state.is_idle() {
            if self.captured {
                host.set_pointer_capture(false);
                self.captured = false;
            }
            self.drag_origins.clear();
            return true;
        }
        if !self.captured {
            host.set_pointer_capture(true);
            self.captured = true;
        }

        match state {
            GestureState::Dragging => {
                self.drag_origins = host
                    .selected_ids()
                    .into_iter()
                    .filter_map(|id| host.position(id).map(|origin| (id, origin)))
                    .collect();
                host.notify(EditorEvent::DragStarted);
            }
            GestureState::Connecting => {
                self.pending.visible = true;
                if let Some(source) = self.pending.source_connector {
                    host.notify(EditorEvent::ConnectionStarted(source));
                }
            }
            _ => {}
        }
        true
    }

    fn drag_move<H: EditorHost + ?Sized>(&mut self, host: &mut H, delta: Vec2) {
        // Linear part only, so non-uniform scales map each axis on its own.
        let inverse = self.view.inverse();
        let offset = inverse * Point::new(delta.x, delta.y) - inverse * Point::ZERO;
        let step = self.options.move_step;
        for &(id, origin) in &self.drag_origins {
            let mut position = origin + offset;
            if let Some(step) = step {
                position = Point::new(
                    snap_to_step(position.x, step),
                    snap_to_step(position.y, step),
                );
            }
            host.set_position(id, position);
        }
    }

    fn update_marquee<H: EditorHost + ?Sized>(&mut self, host: &mut H, anchor: Point, delta: Vec2) {
        let marquee = Rect::from_points(anchor, anchor + delta);
        self.marquee = Some(marquee);

        let world = self.view.screen_rect_to_world(marquee);
        for id in host.entity_ids() {
            if host.is_selected(id) {
                continue;
            }
            let Some(bounds) = host.bounds(id) else {
                continue;
            };
            if contains_rect(world, bounds) {
                host.select(id, true);
            }
        }
    }

    fn snap_pending_connection<H: EditorHost + ?Sized>(&mut self, host: &mut H, position: Point) {
        let world = self.view.screen_to_world(position);
        let hit = host.classify(world).connector();
        let anchor = hit.and_then(|connector| host.connector_anchor(connector));

        let candidate = anchor.and(hit);
        self.pending.target = anchor.unwrap_or(world);
        self.pending.visible = true;
        if candidate != self.pending.target_connector {
            self.pending.target_connector = candidate;
            host.notify(EditorEvent::ConnectionTargetChanged(candidate));
        }
    }
}

/// Truncate `value` to a multiple of `step`.
fn snap_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).trunc() * step
}

fn contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}
