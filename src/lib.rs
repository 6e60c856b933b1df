pub use cgmath;
pub use element::{ElementKind, TrafficElement};
pub use event::{ElementEvent, ElementEventKind, Event, LampEvent};
pub use face::{toggles, LampClass, SignalFace, Timer, TimerDuration, TimerState};
pub use fsm::SuperState;
pub use model::{
    ActionModel, ExitModel, FaceModel, GuardModel, IntersectionModel, LaneModel, MilestoneModel,
    ModelError, PathModel, PermissiveModel, RectModel, SensorModel, SubstateModel,
    SuperStateModel, TemplateModel, TimerModel,
};
pub use path::{Lane, Milestone, TravelPath, CROSSWALK, INTERSECTION};
pub use script::{ScriptAction, ScriptOp};
pub use sensor::Sensor;
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};

mod clearance;
mod element;
mod event;
mod face;
mod fsm;
pub mod math;
mod model;
mod path;
mod scheduler;
mod script;
mod sensor;
mod simulation;
mod util;

new_key_type! {
    /// Unique ID of a [SignalFace].
    pub struct FaceId;
    /// Unique ID of a [TrafficElement].
    pub struct ElementId;
}

type FaceSet = SlotMap<FaceId, SignalFace>;
type ElementSet = SlotMap<ElementId, TrafficElement>;
