//! Runtime reconfiguration hook

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

use crate::model::ActionId;

/// Model element whose monitored state changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelElement {
    /// A monitored action completed and produced a new measurement
    Action(ActionId),
}

impl fmt::Display for ModelElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelElement::Action(id) => write!(f, "action {}", id),
        }
    }
}

/// Consulted after every monitored state change
pub trait Reconfigurator {
    /// React to a change of `element`. Returns whether a reconfiguration ran.
    fn on_state_change(&self, element: &ModelElement) -> bool;
}

/// Never reconfigures
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconfiguration;

impl Reconfigurator for NoReconfiguration {
    fn on_state_change(&self, _element: &ModelElement) -> bool {
        false
    }
}

/// Remembers every notification and reports a fixed outcome
#[derive(Debug, Default)]
pub struct RecordingReconfigurator {
    fires: bool,
    observed: Mutex<Vec<ModelElement>>,
}

impl RecordingReconfigurator {
    /// Create a reconfigurator answering `fires` to every notification
    pub fn new(fires: bool) -> Self {
        Self {
            fires,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Notifications received so far
    pub fn observed(&self) -> Vec<ModelElement> {
        self.observed.lock().clone()
    }
}

impl Reconfigurator for RecordingReconfigurator {
    fn on_state_change(&self, element: &ModelElement) -> bool {
        self.observed.lock().push(element.clone());
        self.fires
    }
}
