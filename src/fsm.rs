use crate::event::Event;
use crate::face::{RunningTimers, SignalFace, TimerState};
use crate::model::{ModelError, TemplateModel};
use crate::sensor::{holds_toggle, Sensor};
use smallvec::SmallVec;

/// The name of the super-state every face starts in.
const INITIAL_SUPER: &str = "Red";

/// The name of the substate every face starts in.
const INITIAL_SUB: &str = "Waiting for Clearance";

/// One of the three signal head super-states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuperState {
    Red,
    Yellow,
    Green,
}

/// The shared state machine template executed by every signal face.
///
/// Compiled once from the static model; all toggle, timer and state
/// names are validated at load so execution never parses strings.
pub(crate) struct Template {
    states: Vec<SuperStateDef>,
}

struct SuperStateDef {
    name: String,
    kind: SuperState,
    substates: Vec<Substate>,
}

pub(crate) struct Substate {
    name: String,
    actions: Vec<Action>,
    exits: Vec<Exit>,
}

/// An entry action of a substate.
enum Action {
    SetLamp(String),
    SetToggle(String),
    ClearToggle(String),
    StartTimer(String),
}

/// A guarded exit to another `(super-state, substate)`.
struct Exit {
    guards: SmallVec<[Guard; 4]>,
    to: (usize, usize),
}

/// A single guard clause; an exit is taken when all its guards hold.
enum Guard {
    Toggle { name: String, value: bool },
    Timer { name: String, complete: bool },
}

impl Template {
    /// Compiles the template from its model form, rejecting unknown
    /// action and guard keywords and unresolvable exit destinations.
    pub fn compile(model: &TemplateModel) -> Result<Self, ModelError> {
        let find = |sup: &str, sub: &str| -> Result<(usize, usize), ModelError> {
            model
                .states
                .iter()
                .position(|s| s.name == sup)
                .and_then(|i| {
                    model.states[i]
                        .substates
                        .iter()
                        .position(|s| s.name == sub)
                        .map(|j| (i, j))
                })
                .ok_or_else(|| ModelError::UnknownDestination(sup.to_owned(), sub.to_owned()))
        };

        let states = model
            .states
            .iter()
            .map(|sup| {
                let kind = match sup.name.as_str() {
                    "Red" => SuperState::Red,
                    "Yellow" => SuperState::Yellow,
                    "Green" => SuperState::Green,
                    other => return Err(ModelError::UnknownSuperState(other.to_owned())),
                };
                let substates = sup
                    .substates
                    .iter()
                    .map(|sub| {
                        let actions = sub
                            .actions
                            .iter()
                            .map(|a| {
                                let operand = a.operand.clone();
                                match a.op.as_str() {
                                    "set lamp" => Ok(Action::SetLamp(operand)),
                                    "set toggle" => Ok(Action::SetToggle(operand)),
                                    "clear toggle" => Ok(Action::ClearToggle(operand)),
                                    "start timer" => Ok(Action::StartTimer(operand)),
                                    other => Err(ModelError::UnknownAction(other.to_owned())),
                                }
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        let exits = sub
                            .exits
                            .iter()
                            .map(|e| {
                                let guards = e
                                    .guards
                                    .iter()
                                    .map(|g| {
                                        let name = g.operand.clone();
                                        match g.test.as_str() {
                                            "toggle is true" => {
                                                Ok(Guard::Toggle { name, value: true })
                                            }
                                            "toggle is false" => {
                                                Ok(Guard::Toggle { name, value: false })
                                            }
                                            "timer is completed" => {
                                                Ok(Guard::Timer { name, complete: true })
                                            }
                                            "timer is not complete" => {
                                                Ok(Guard::Timer { name, complete: false })
                                            }
                                            other => {
                                                Err(ModelError::UnknownGuard(other.to_owned()))
                                            }
                                        }
                                    })
                                    .collect::<Result<SmallVec<_>, _>>()?;
                                Ok(Exit {
                                    guards,
                                    to: find(&e.to[0], &e.to[1])?,
                                })
                            })
                            .collect::<Result<Vec<_>, ModelError>>()?;
                        Ok(Substate {
                            name: sub.name.clone(),
                            actions,
                            exits,
                        })
                    })
                    .collect::<Result<Vec<_>, ModelError>>()?;
                Ok(SuperStateDef {
                    name: sup.name.clone(),
                    kind,
                    substates,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(Self { states })
    }

    /// The `(super-state, substate)` every face starts in.
    pub fn initial(&self) -> Result<(usize, usize), ModelError> {
        self.states
            .iter()
            .position(|s| s.name == INITIAL_SUPER)
            .and_then(|i| {
                self.states[i]
                    .substates
                    .iter()
                    .position(|s| s.name == INITIAL_SUB)
                    .map(|j| (i, j))
            })
            .ok_or(ModelError::MissingInitialState)
    }

    /// The super-state kind of the given state index.
    pub fn kind(&self, state: usize) -> SuperState {
        self.states[state].kind
    }

    /// The names of the given `(super-state, substate)`.
    pub fn state_names(&self, state: (usize, usize)) -> (&str, &str) {
        let sup = &self.states[state.0];
        (&sup.name, &sup.substates[state.1].name)
    }

    /// Checks that every toggle and timer the template references
    /// is declared by the given face.
    pub fn validate_face(&self, face: &SignalFace) -> Result<(), ModelError> {
        let toggle = |name: &str| -> Result<(), ModelError> {
            face.toggle(name)
                .map(|_| ())
                .ok_or_else(|| ModelError::UndeclaredToggle {
                    face: face.name().to_owned(),
                    name: name.to_owned(),
                })
        };
        let timer = |name: &str| -> Result<(), ModelError> {
            face.timer(name)
                .map(|_| ())
                .ok_or_else(|| ModelError::UndeclaredTimer {
                    face: face.name().to_owned(),
                    name: name.to_owned(),
                })
        };
        for sup in &self.states {
            for sub in &sup.substates {
                for action in &sub.actions {
                    match action {
                        Action::SetLamp(_) => {}
                        Action::SetToggle(name) | Action::ClearToggle(name) => toggle(name)?,
                        Action::StartTimer(name) => timer(name)?,
                    }
                }
                for exit in &sub.exits {
                    for guard in &exit.guards {
                        match guard {
                            Guard::Toggle { name, .. } => toggle(name)?,
                            Guard::Timer { name, .. } => timer(name)?,
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// The outcome of stepping one face's state machine.
pub(crate) struct StepResult {
    /// Whether a significant transition occurred.
    pub activity: bool,
    /// The number of internal consistency errors encountered.
    pub errors: usize,
}

/// Evaluates the current substate's exits in declared order and returns
/// the destination of the first exit whose guards all hold. Mutates
/// nothing; calling it repeatedly yields the same result.
pub(crate) fn evaluate_exits(
    face: &SignalFace,
    template: &Template,
) -> Result<Option<(usize, usize)>, String> {
    let substate = &template.states[face.state.0].substates[face.state.1];
    for exit in &substate.exits {
        let mut holds = true;
        for guard in &exit.guards {
            let value = match guard {
                Guard::Toggle { name, value } => match face.toggle(name) {
                    Some(current) => current == *value,
                    None => return Err(name.clone()),
                },
                Guard::Timer { name, complete } => match face.timer(name) {
                    Some(timer) => (timer.state() == TimerState::Completed) == *complete,
                    None => return Err(name.clone()),
                },
            };
            if !value {
                holds = false;
                break;
            }
        }
        if holds {
            return Ok(Some(exit.to));
        }
    }
    Ok(None)
}

/// Executes one tick of a face's state machine: takes the first exit
/// whose guards hold and, if it leads elsewhere, runs the destination
/// substate's entry actions.
pub(crate) fn step_face(
    face: &mut SignalFace,
    template: &Template,
    sensors: &[Sensor],
    running: &mut RunningTimers,
    events: &mut Vec<Event>,
    now: f64,
) -> StepResult {
    let dest = match evaluate_exits(face, template) {
        Ok(Some(dest)) => dest,
        Ok(None) => {
            return StepResult {
                activity: false,
                errors: 0,
            }
        }
        Err(name) => {
            log::error!("face {:?}: guard references undefined {:?}", face.name(), name);
            return StepResult {
                activity: false,
                errors: 1,
            };
        }
    };

    if dest == face.state {
        // Not a significant transition; entry actions are not re-run.
        return StepResult {
            activity: false,
            errors: 0,
        };
    }

    let (sup, sub) = template.state_names(dest);
    log::debug!("face {:?} -> {sup} / {sub} at {now}", face.name());
    face.state = dest;
    face.super_state = template.kind(dest.0);
    let errors = enter_substate(face, template, sensors, running, events, now);
    StepResult {
        activity: true,
        errors,
    }
}

/// Runs the entry actions of the face's current substate.
/// Returns the number of internal consistency errors encountered.
pub(crate) fn enter_substate(
    face: &mut SignalFace,
    template: &Template,
    sensors: &[Sensor],
    running: &mut RunningTimers,
    events: &mut Vec<Event>,
    now: f64,
) -> usize {
    let mut errors = 0;
    let substate = &template.states[face.state.0].substates[face.state.1];
    for action in &substate.actions {
        match action {
            Action::SetLamp(internal) => {
                if let Some(physical) = face.set_lamp(internal) {
                    log::info!("face {:?} lamp -> {physical:?} at {now}", face.name());
                    events.push(Event::lamp(now, face.name(), &physical));
                }
            }
            Action::SetToggle(name) => {
                if face.set_toggle(name, true).is_none() {
                    log::error!("face {:?}: set of undefined toggle {name:?}", face.name());
                    errors += 1;
                }
            }
            Action::ClearToggle(name) => {
                if holds_toggle(sensors, face.id, name) {
                    // An active sensor holds the toggle true.
                    log::warn!("face {:?}: clear of {name:?} refused", face.name());
                } else if face.set_toggle(name, false).is_none() {
                    log::error!("face {:?}: clear of undefined toggle {name:?}", face.name());
                    errors += 1;
                }
            }
            Action::StartTimer(name) => match face.timer_index(name) {
                Some(idx) => {
                    face.timers[idx].start(now);
                    running.add(face.id, idx);
                }
                None => {
                    log::error!("face {:?}: start of undefined timer {name:?}", face.name());
                    errors += 1;
                }
            },
        }
    }
    errors
}
