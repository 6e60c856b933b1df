//! Traffic element scenarios: signal gating, blocking, permissive
//! turns and spawn suppression.

mod common;

use common::*;
use signal_sim::*;

fn demand_model() -> IntersectionModel {
    IntersectionModel {
        template: template(),
        faces: vec![
            face("North Vehicles", &["East Vehicles"], 60.0),
            face("East Vehicles", &["North Vehicles"], 60.0),
        ],
        lanes: vec![lane("North Approach", 15.0), lane("North Exit", 15.0)],
        paths: vec![straight_path(
            "North Through",
            "North Vehicles",
            "North Approach",
            "North Exit",
            0.0,
        )],
        sensors: vec![stopline_sensor("North Vehicles", 0.0)],
    }
}

fn element_events(events: &[Event]) -> Vec<&ElementEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Element(el) => Some(el),
            _ => None,
        })
        .collect()
}

/// A car stops at the red light, trips the demand sensor, and crosses
/// once the face turns green, at the reduced after-stop speed.
#[test]
fn car_waits_for_green_then_crosses() {
    let mut sim = Simulation::new(&demand_model()).unwrap();
    sim.load_script(vec![spawn(ScriptOp::Car, 0.0, "North Through")]);
    run_checked(&mut sim, 30.0);

    let events = sim.drain_events();
    let elements = element_events(&events);

    let stopped = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Stopped)
        .expect("car never stopped at the line");
    assert!((3.0..4.5).contains(&stopped.time), "stopped at {}", stopped.time);

    let entered = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Entered && e.region == INTERSECTION)
        .expect("car never entered the intersection");
    let exited = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Exited)
        .expect("car never exited");
    assert!(entered.time > stopped.time);
    assert!(exited.time > entered.time);
    assert!(!exited.present);
    assert_eq!(exited.destination, "North Exit");

    // Having been stopped, the car crosses at the reduced limit.
    assert!(entered.speed < 5.0, "crossed at {}", entered.speed);

    // Event times are monotone, and the chaining timestamp matches.
    let times: Vec<f64> = events.iter().map(|e| e.time()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        sim.last_event_time(),
        Some(times.last().copied().unwrap().ceil())
    );
}

/// A follower runs into a stopped leader's tail, is marked blocked with
/// zero speed, and resumes at the leader's speed once it pulls away.
#[test]
fn blocking_and_release() {
    let mut sim = Simulation::new(&demand_model()).unwrap();
    sim.load_script(vec![
        spawn(ScriptOp::Car, 0.0, "North Through"),
        spawn(ScriptOp::Car, 1.5, "North Through"),
    ]);
    run_checked(&mut sim, 30.0);

    let events = sim.drain_events();
    let elements = element_events(&events);

    let blocked = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Blocked)
        .expect("follower never blocked");
    assert_eq!(blocked.name, "car 2");
    assert_eq!(blocked.speed, 0.0);
    assert!((4.0..5.5).contains(&blocked.time), "blocked at {}", blocked.time);

    let unblocked = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Unblocked)
        .expect("follower never released");
    assert_eq!(unblocked.name, "car 2");
    assert!(unblocked.time > blocked.time);
    assert!((5.0..6.5).contains(&unblocked.time), "released at {}", unblocked.time);
    // Resumes at the lesser of its prior speed and the leader's
    // reduced crossing speed.
    assert!((unblocked.speed - 4.5).abs() < 0.01, "resumed at {}", unblocked.speed);

    let exits = elements
        .iter()
        .filter(|e| e.kind == ElementEventKind::Exited)
        .count();
    assert_eq!(exits, 2, "both cars should cross eventually");
}

/// A car on a path with a permissive-right-turn region crosses on a
/// steady red after one stopped second with the region empty.
#[test]
fn permissive_right_on_red() {
    let mut path = straight_path(
        "West Right",
        "West Right Turn",
        "West Approach",
        "North Exit",
        0.0,
    );
    path.permissive_turns = vec![PermissiveModel {
        turn: "right".into(),
        movement: "moving west".into(),
        region: RectModel {
            x: -30.0,
            y: -10.0,
            width: 25.0,
            height: 8.0,
        },
    }];
    let model = IntersectionModel {
        template: template(),
        faces: vec![face("West Right Turn", &[], 60.0)],
        lanes: vec![lane("West Approach", 15.0), lane("North Exit", 15.0)],
        paths: vec![path],
        sensors: vec![],
    };
    let mut sim = Simulation::new(&model).unwrap();
    sim.load_script(vec![spawn(ScriptOp::Car, 0.0, "West Right")]);
    run_checked(&mut sim, 30.0);

    // The face never turned green.
    let face_id = sim.face_id("West Right Turn").unwrap();
    assert_eq!(sim.get_face(face_id).super_state(), SuperState::Red);
    assert_eq!(sim.get_face(face_id).lamp(), Some("Steady Circular Red"));

    let events = sim.drain_events();
    let elements = element_events(&events);
    let stopped = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Stopped)
        .expect("car never stopped");
    let entered = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::Entered && e.region == INTERSECTION)
        .expect("car never crossed");
    // One stopped second before the turn is considered.
    assert!(entered.time - stopped.time >= 1.0);
    assert!(elements.iter().any(|e| e.kind == ElementEventKind::Exited));
}

/// An element that would be born overlapping another is discarded.
#[test]
fn overlapping_spawn_is_suppressed() {
    let mut sim = Simulation::new(&demand_model()).unwrap();
    sim.load_script(vec![ScriptAction {
        time: 0.0,
        op: ScriptOp::Car,
        target: "all".into(),
        operand: "North Through".into(),
        count: 2,
        interval: 0.0,
        permissive_delay: None,
    }]);
    run_checked(&mut sim, 30.0);

    let events = sim.drain_events();
    let elements = element_events(&events);
    assert_eq!(
        elements
            .iter()
            .filter(|e| e.kind == ElementEventKind::Spawned)
            .count(),
        1
    );
    let suppressed = elements
        .iter()
        .find(|e| e.kind == ElementEventKind::BlockedFromSpawning)
        .expect("second spawn should be suppressed");
    assert!(!suppressed.present);
    assert_eq!(
        elements
            .iter()
            .filter(|e| e.kind == ElementEventKind::Exited)
            .count(),
        1
    );
}

/// A spaced repeat spawns every element.
#[test]
fn spaced_repeats_all_spawn() {
    let mut sim = Simulation::new(&demand_model()).unwrap();
    sim.load_script(vec![ScriptAction {
        time: 0.0,
        op: ScriptOp::Car,
        target: "all".into(),
        operand: "North Through".into(),
        count: 3,
        interval: 2.0,
        permissive_delay: None,
    }]);
    run_checked(&mut sim, 40.0);

    let events = sim.drain_events();
    let elements = element_events(&events);
    let spawn_times: Vec<f64> = elements
        .iter()
        .filter(|e| e.kind == ElementEventKind::Spawned)
        .map(|e| e.time)
        .collect();
    assert_eq!(spawn_times, vec![0.0, 2.0, 4.0]);
    assert_eq!(
        elements
            .iter()
            .filter(|e| e.kind == ElementEventKind::Exited)
            .count(),
        3
    );
}
