//! Editor behaviour options.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::ZOOM_STEP;

/// Default drag recognition threshold in screen pixels.
pub const DEFAULT_DRAG_THRESHOLD: f64 = 3.0;

/// Options loading errors.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid editor options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid editor options: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Gestures the editor is allowed to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub pan_and_zoom: bool,
    pub drag_move: bool,
    pub connection: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            pan_and_zoom: true,
            drag_move: true,
            connection: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            pan_and_zoom: false,
            drag_move: false,
            connection: false,
        }
    }
}

/// Tunables for the interaction state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
    pub capabilities: Capabilities,
    /// Displacement (per axis, screen pixels) a press must exceed to become a drag.
    pub drag_threshold: f64,
    /// Zoom multiplier per wheel tick; zooming out uses the reciprocal.
    pub zoom_in_factor: f64,
    /// Only zoom with the wheel while Ctrl is held.
    pub zoom_requires_ctrl: bool,
    /// Host-imposed `(min, max)` zoom bounds.
    pub zoom_limits: Option<(f64, f64)>,
    /// Dragged items snap to multiples of this step, in world units.
    pub move_step: Option<f64>,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::all(),
            drag_threshold: DEFAULT_DRAG_THRESHOLD,
            zoom_in_factor: ZOOM_STEP,
            zoom_requires_ctrl: true,
            zoom_limits: None,
            move_step: None,
        }
    }
}

impl EditorOptions {
    /// Load options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Check that every numeric option yields a usable view and drag.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let invalid = |field, reason| Err(OptionsError::Invalid { field, reason });
        if !self.drag_threshold.is_finite() || self.drag_threshold < 0.0 {
            return invalid("drag_threshold", "must be a non-negative number");
        }
        if !self.zoom_in_factor.is_finite() || self.zoom_in_factor <= 0.0 {
            return invalid("zoom_in_factor", "must be positive");
        }
        if let Some((min, max)) = self.zoom_limits {
            if !min.is_finite() || !max.is_finite() || min <= 0.0 || max <= 0.0 {
                return invalid("zoom_limits", "must be positive");
            }
        }
        if let Some(step) = self.move_step {
            if !step.is_finite() || step <= 0.0 {
                return invalid("move_step", "must be positive");
            }
        }
        Ok(())
    }

    /// Serialize the options to JSON.
    pub fn to_json(&self) -> Result<String, OptionsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_drag_threshold(mut self, threshold: f64) -> Self {
        self.drag_threshold = threshold;
        self
    }

    pub fn with_move_step(mut self, step: f64) -> Self {
        self.move_step = (step > 0.0).then_some(step);
        self
    }
}
