//! Shared model builders for the integration tests: a standard
//! actuated signal cycle and a four-approach intersection layout.
#![allow(dead_code)]

use signal_sim::*;

/// The toggles every face declares.
pub const FACE_TOGGLES: [&str; 10] = [
    toggles::REQUEST_GREEN,
    toggles::GREEN_REQUEST_GRANTED,
    toggles::TRAFFIC_FLOWING,
    toggles::REQUEST_CLEARANCE,
    toggles::REQUEST_PARTIAL_CLEARANCE,
    toggles::CLEARANCE_REQUESTED,
    toggles::CLEARED,
    toggles::CONFLICTING_PATHS_CLEAR,
    toggles::PARTIAL_CONFLICTING_PATHS_CLEAR,
    toggles::FLASH,
];

pub fn act(op: &str, operand: &str) -> ActionModel {
    ActionModel {
        op: op.into(),
        operand: operand.into(),
    }
}

pub fn guard(test: &str, operand: &str) -> GuardModel {
    GuardModel {
        test: test.into(),
        operand: operand.into(),
    }
}

pub fn exit(guards: Vec<GuardModel>, sup: &str, sub: &str) -> ExitModel {
    ExitModel {
        guards,
        to: [sup.into(), sub.into()],
    }
}

pub fn substate(name: &str, actions: Vec<ActionModel>, exits: Vec<ExitModel>) -> SubstateModel {
    SubstateModel {
        name: name.into(),
        actions,
        exits,
    }
}

/// A standard actuated cycle: red until cleared, green on demand once
/// granted and conflicts are clear, yellow on a clearance request.
pub fn template() -> TemplateModel {
    TemplateModel {
        states: vec![
            SuperStateModel {
                name: "Red".into(),
                substates: vec![
                    substate(
                        "Waiting for Clearance",
                        vec![
                            act("set lamp", "Steady Circular Red"),
                            act("clear toggle", "Traffic Flowing"),
                            act("clear toggle", "Request Green"),
                            act("start timer", "Clearance Delay"),
                        ],
                        vec![
                            exit(vec![guard("toggle is true", "Flash")], "Red", "Flashing"),
                            exit(
                                vec![guard("timer is completed", "Clearance Delay")],
                                "Red",
                                "Cleared",
                            ),
                        ],
                    ),
                    substate(
                        "Cleared",
                        vec![act("set toggle", "Cleared")],
                        vec![
                            exit(vec![guard("toggle is true", "Flash")], "Red", "Flashing"),
                            exit(
                                vec![guard("toggle is true", "Request Green")],
                                "Red",
                                "Delay Green",
                            ),
                        ],
                    ),
                    substate(
                        "Delay Green",
                        vec![
                            act("set toggle", "Request Clearance"),
                            act("start timer", "Delay Green"),
                        ],
                        vec![
                            exit(vec![guard("toggle is true", "Flash")], "Red", "Flashing"),
                            exit(
                                vec![
                                    guard("timer is completed", "Delay Green"),
                                    guard("toggle is true", "Green Request Granted"),
                                    guard("toggle is true", "Conflicting Paths are Clear"),
                                ],
                                "Green",
                                "Going Green",
                            ),
                        ],
                    ),
                    substate(
                        "Flashing",
                        vec![act("set lamp", "Flashing Circular Red")],
                        vec![exit(
                            vec![guard("toggle is false", "Flash")],
                            "Red",
                            "Waiting for Clearance",
                        )],
                    ),
                ],
            },
            SuperStateModel {
                name: "Yellow".into(),
                substates: vec![substate(
                    "Going Yellow",
                    vec![
                        act("set lamp", "Steady Circular Yellow"),
                        act("clear toggle", "Traffic Flowing"),
                        act("start timer", "Yellow Change"),
                    ],
                    vec![exit(
                        vec![guard("timer is completed", "Yellow Change")],
                        "Red",
                        "Waiting for Clearance",
                    )],
                )],
            },
            SuperStateModel {
                name: "Green".into(),
                substates: vec![substate(
                    "Going Green",
                    vec![
                        act("set lamp", "Steady Circular Green"),
                        act("clear toggle", "Cleared"),
                        act("clear toggle", "Request Clearance"),
                        act("clear toggle", "Request Green"),
                        act("set toggle", "Traffic Flowing"),
                        act("start timer", "Minimum Green"),
                    ],
                    vec![
                        exit(vec![guard("toggle is true", "Flash")], "Yellow", "Going Yellow"),
                        exit(
                            vec![
                                guard("timer is completed", "Minimum Green"),
                                guard("toggle is true", "Clearance Requested"),
                            ],
                            "Yellow",
                            "Going Yellow",
                        ),
                    ],
                )],
            },
        ],
    }
}

/// A deliberately unsafe cycle that turns green on demand without
/// arbitration, used to exercise the safety monitor.
pub fn permissive_template() -> TemplateModel {
    let mut template = template();
    let delay_green = &mut template.states[0].substates[2];
    delay_green.exits[1].guards = vec![guard("timer is completed", "Delay Green")];
    template
}

pub fn face(name: &str, conflicts: &[&str], waiting_limit: f64) -> FaceModel {
    FaceModel {
        name: name.into(),
        toggles: FACE_TOGGLES.iter().map(|s| s.to_string()).collect(),
        timers: vec![
            TimerModel {
                name: "Clearance Delay".into(),
                duration: TimerDuration::Finite(2.0),
            },
            TimerModel {
                name: "Delay Green".into(),
                duration: TimerDuration::Finite(1.0),
            },
            TimerModel {
                name: "Minimum Green".into(),
                duration: TimerDuration::Finite(5.0),
            },
            TimerModel {
                name: "Yellow Change".into(),
                duration: TimerDuration::Finite(3.0),
            },
        ],
        conflicts: conflicts.iter().map(|s| s.to_string()).collect(),
        partial_conflicts: vec![],
        lamp_map: vec![],
        waiting_limit,
    }
}

pub fn lane(name: &str, speed_limit: f64) -> LaneModel {
    LaneModel {
        name: name.into(),
        speed_limit,
    }
}

/// A straight south-to-north travel path at the given x offset:
/// approach, stop line, intersection, and exit lane.
pub fn straight_path(name: &str, face: &str, entry: &str, exit_lane: &str, x: f64) -> PathModel {
    let milestone = |region: &str, y: f64| MilestoneModel {
        region: region.into(),
        x,
        y,
    };
    PathModel {
        name: name.into(),
        face: face.into(),
        entry: entry.into(),
        exit: exit_lane.into(),
        milestones: vec![
            milestone(entry, -60.0),
            milestone(entry, -5.0),
            milestone(INTERSECTION, 5.0),
            milestone(exit_lane, 8.0),
            milestone(exit_lane, 60.0),
        ],
        permissive_turns: vec![],
    }
}

/// A geometric demand sensor covering the approach to the stop line.
pub fn stopline_sensor(face: &str, x: f64) -> SensorModel {
    SensorModel {
        name: "Demand".into(),
        face: face.into(),
        region: Some(RectModel {
            x: x - 2.0,
            y: -12.0,
            width: 4.0,
            height: 8.0,
        }),
        toggles: vec![toggles::REQUEST_GREEN.into()],
    }
}

/// A script-driven demand sensor with no detection region.
pub fn scripted_sensor(face: &str) -> SensorModel {
    SensorModel {
        name: "Demand".into(),
        face: face.into(),
        region: None,
        toggles: vec![toggles::REQUEST_GREEN.into()],
    }
}

/// A script-driven flash sensor, present on every face so the safety
/// monitor has something to force.
pub fn flash_sensor(face: &str) -> SensorModel {
    SensorModel {
        name: "Flash".into(),
        face: face.into(),
        region: None,
        toggles: vec![toggles::FLASH.into()],
    }
}

pub fn spawn(op: ScriptOp, time: f64, path: &str) -> ScriptAction {
    ScriptAction {
        time,
        op,
        target: "all".into(),
        operand: path.into(),
        count: 1,
        interval: 0.0,
        permissive_delay: None,
    }
}

pub fn sensor_on(time: f64, face: &str, sensor: &str) -> ScriptAction {
    ScriptAction {
        time,
        op: ScriptOp::SensorOn,
        target: face.into(),
        operand: sensor.into(),
        count: 1,
        interval: 0.0,
        permissive_delay: None,
    }
}

/// Asserts that no two conflicting faces are simultaneously green.
pub fn assert_no_conflicting_green(sim: &Simulation) {
    let faces: Vec<&SignalFace> = sim.iter_faces().collect();
    for a in &faces {
        for b in &faces {
            if a.id() != b.id() && a.conflicts().contains(&b.id()) {
                assert!(
                    !(a.super_state() == SuperState::Green && b.super_state() == SuperState::Green),
                    "{} and {} are both green at {}",
                    a.name(),
                    b.name(),
                    sim.time()
                );
            }
        }
    }
}

/// Runs the simulation to completion, checking the green-overlap
/// invariant after every tick.
pub fn run_checked(sim: &mut Simulation, duration: f64) {
    loop {
        let more = sim.tick(duration);
        assert_no_conflicting_green(sim);
        if !more {
            break;
        }
    }
    assert_eq!(sim.error_count(), 0, "model errors during run");
}
