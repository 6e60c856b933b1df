use crate::element::ElementKind;
use serde::{Deserialize, Serialize};

/// The operator of a scripted action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptOp {
    #[serde(rename = "set toggle")]
    SetToggle,
    #[serde(rename = "clear toggle")]
    ClearToggle,
    #[serde(rename = "sensor on")]
    SensorOn,
    #[serde(rename = "sensor off")]
    SensorOff,
    #[serde(rename = "car")]
    Car,
    #[serde(rename = "truck")]
    Truck,
    #[serde(rename = "pedestrian")]
    Pedestrian,
}

impl ScriptOp {
    /// The element kind a spawn operator creates, if it is one.
    pub(crate) fn spawn_kind(&self) -> Option<ElementKind> {
        match self {
            ScriptOp::Car => Some(ElementKind::Car),
            ScriptOp::Truck => Some(ElementKind::Truck),
            ScriptOp::Pedestrian => Some(ElementKind::Pedestrian),
            _ => None,
        }
    }
}

/// One timestamped scripted action.
///
/// For toggle and sensor operators the target is a face name or
/// `all` and the operand names the toggle or sensor. For spawn
/// operators the operand names the travel path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScriptAction {
    pub time: f64,
    pub op: ScriptOp,
    pub target: String,
    pub operand: String,
    /// Number of repetitions; expanded at load.
    #[serde(default = "one")]
    pub count: u32,
    /// Seconds between repetitions.
    #[serde(default)]
    pub interval: f64,
    /// Override of the spawned element's permissive delay in seconds.
    #[serde(default)]
    pub permissive_delay: Option<f64>,
}

fn one() -> u32 {
    1
}

/// The ordered set of pending scripted actions.
#[derive(Default)]
pub(crate) struct Script {
    actions: Vec<ScriptAction>,
    cursor: usize,
}

impl Script {
    /// Loads a batch of actions, expanding repeat counts into
    /// individual actions spaced `interval` seconds apart, and orders
    /// everything by time.
    pub fn load(actions: Vec<ScriptAction>) -> Self {
        let mut expanded = vec![];
        for action in actions {
            for rep in 0..u32::max(action.count, 1) {
                expanded.push(ScriptAction {
                    time: action.time + rep as f64 * action.interval,
                    count: 1,
                    interval: 0.0,
                    ..action.clone()
                });
            }
        }
        expanded.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            actions: expanded,
            cursor: 0,
        }
    }

    /// The time of the next pending action, if any remain.
    pub fn next_time(&self) -> Option<f64> {
        self.actions.get(self.cursor).map(|a| a.time)
    }

    /// Consumes and returns the actions due at or before `now`.
    pub fn take_due(&mut self, now: f64) -> &[ScriptAction] {
        let start = self.cursor;
        while self.cursor < self.actions.len() && self.actions[self.cursor].time <= now {
            self.cursor += 1;
        }
        &self.actions[start..self.cursor]
    }
}
