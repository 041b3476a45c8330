//! Pointer input events.

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const SHIFT: Self = Self {
        shift: true,
        ..Self::NONE
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };
}

/// Set of currently pressed buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerButtons {
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

impl PointerButtons {
    pub const NONE: Self = Self {
        left: false,
        right: false,
        middle: false,
    };

    pub const LEFT: Self = Self {
        left: true,
        ..Self::NONE
    };

    pub const MIDDLE: Self = Self {
        middle: true,
        ..Self::NONE
    };

    /// Check if a button is in the set.
    pub fn contains(&self, button: MouseButton) -> bool {
        match button {
            MouseButton::Left => self.left,
            MouseButton::Right => self.right,
            MouseButton::Middle => self.middle,
        }
    }

    /// The set with `button` added.
    pub fn with(mut self, button: MouseButton) -> Self {
        match button {
            MouseButton::Left => self.left = true,
            MouseButton::Right => self.right = true,
            MouseButton::Middle => self.middle = true,
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        !(self.left || self.right || self.middle)
    }
}

impl From<MouseButton> for PointerButtons {
    fn from(button: MouseButton) -> Self {
        Self::NONE.with(button)
    }
}

/// Pointer event in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down {
        position: Point,
        buttons: PointerButtons,
        modifiers: Modifiers,
    },
    Move {
        position: Point,
        buttons: PointerButtons,
    },
    Up {
        position: Point,
        button: MouseButton,
    },
    Wheel {
        position: Point,
        delta: Vec2,
        modifiers: Modifiers,
    },
}

impl PointerEvent {
    /// Where the event happened.
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down { position, .. }
            | PointerEvent::Move { position, .. }
            | PointerEvent::Up { position, .. }
            | PointerEvent::Wheel { position, .. } => position,
        }
    }
}
