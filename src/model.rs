use crate::face::TimerDuration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error found while loading or validating the static
/// intersection description.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown super-state {0:?}")]
    UnknownSuperState(String),
    #[error("exit destination {0:?} / {1:?} does not exist")]
    UnknownDestination(String, String),
    #[error("unrecognised action keyword {0:?}")]
    UnknownAction(String),
    #[error("unrecognised guard keyword {0:?}")]
    UnknownGuard(String),
    #[error("face {face:?} does not declare toggle {name:?}")]
    UndeclaredToggle { face: String, name: String },
    #[error("face {face:?} does not declare timer {name:?}")]
    UndeclaredTimer { face: String, name: String },
    #[error("unknown face {0:?}")]
    UnknownFace(String),
    #[error("unknown lane {0:?}")]
    UnknownLane(String),
    #[error("unrecognised movement filter {0:?}")]
    UnknownMovement(String),
    #[error("unrecognised permissive turn {0:?}")]
    UnknownTurn(String),
    #[error("travel path {0:?} needs at least two milestones")]
    ShortPath(String),
    #[error("the template has no Red / Waiting for Clearance state")]
    MissingInitialState,
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// The immutable description of an intersection: the FSM template,
/// the signal faces, lanes, travel paths and sensors.
///
/// Consumed, never mutated, by the simulation core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntersectionModel {
    pub template: TemplateModel,
    pub faces: Vec<FaceModel>,
    pub lanes: Vec<LaneModel>,
    pub paths: Vec<PathModel>,
    pub sensors: Vec<SensorModel>,
}

/// The FSM template in its authored, stringly form. Compiled and
/// validated once at load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateModel {
    pub states: Vec<SuperStateModel>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuperStateModel {
    pub name: String,
    pub substates: Vec<SubstateModel>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubstateModel {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionModel>,
    #[serde(default)]
    pub exits: Vec<ExitModel>,
}

/// An entry action: `set lamp`, `set toggle`, `clear toggle`
/// or `start timer`, with its operand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionModel {
    pub op: String,
    pub operand: String,
}

/// A guarded exit; the destination is a `(super-state, substate)` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExitModel {
    pub guards: Vec<GuardModel>,
    pub to: [String; 2],
}

/// A guard clause: `toggle is true`, `toggle is false`,
/// `timer is completed` or `timer is not complete`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuardModel {
    pub test: String,
    pub operand: String,
}

/// One signal face instance: its toggle and timer declarations,
/// conflict sets, lamp map and waiting limit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceModel {
    pub name: String,
    pub toggles: Vec<String>,
    pub timers: Vec<TimerModel>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub partial_conflicts: Vec<String>,
    /// Internal lamp name to physical lamp name.
    #[serde(default)]
    pub lamp_map: Vec<(String, String)>,
    pub waiting_limit: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimerModel {
    pub name: String,
    pub duration: TimerDuration,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LaneModel {
    pub name: String,
    /// Speed limit in m/s.
    pub speed_limit: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathModel {
    pub name: String,
    /// The signal face controlling the path's movement.
    pub face: String,
    pub entry: String,
    pub exit: String,
    /// Ordered waypoints: lane or region name plus position.
    pub milestones: Vec<MilestoneModel>,
    #[serde(default)]
    pub permissive_turns: Vec<PermissiveModel>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MilestoneModel {
    pub region: String,
    pub x: f64,
    pub y: f64,
}

/// A permissive-turn descriptor: the turn it applies to, the movement
/// filter (`present`, or `moving north` / `south` / `east` / `west`)
/// and the region that must be free of relevant traffic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PermissiveModel {
    /// `left` or `right`.
    pub turn: String,
    pub movement: String,
    pub region: RectModel,
}

/// An axis-aligned rectangle: minimum corner plus extents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectModel {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A sensor: its face, optional detection region and the toggles it
/// drives. Toggle names may carry a `Face/Toggle` qualifier to wire
/// the sensor to a neighbouring face.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorModel {
    pub name: String,
    pub face: String,
    #[serde(default)]
    pub region: Option<RectModel>,
    pub toggles: Vec<String>,
}

impl IntersectionModel {
    /// Parses a model from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the model to JSON. Reloading the output yields an
    /// identical model.
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }
}
