use crate::element::{
    can_change_lanes, first_overlap, ElementKind, ElementView, TrafficElement,
    DEFAULT_PERMISSIVE_DELAY, REDUCED_SPEED,
};
use crate::event::{ElementEventKind, Event};
use crate::face::{RunningTimers, SignalFace};
use crate::fsm::{self, SuperState, Template};
use crate::math::{Point2d, Rect, EAST, NORTH, SOUTH, WEST};
use crate::model::{IntersectionModel, ModelError};
use crate::path::{is_controlled_region, Lane, Milestone, MovementFilter, PermissiveTurn, TravelPath};
use crate::scheduler::Scheduler;
use crate::script::{Script, ScriptAction, ScriptOp};
use crate::sensor::{holds_toggle, Sensor};
use crate::{clearance, ElementId, ElementSet, FaceId, FaceSet};
use itertools::Itertools;
use smallvec::SmallVec;

/// While any traffic element is present, the clock advances by at most
/// this increment, in s.
const POLL_INTERVAL: f64 = 0.1;

/// Upper bound on sub-phase passes within one tick. A tick that fails
/// to settle within this many passes is reported as a model error.
const MAX_SETTLE_PASSES: usize = 100;

/// The sensor name forced on by the safety monitor.
const FLASH_SENSOR: &str = "Flash";

/// An actuated signal intersection simulation.
///
/// The simulation is single-threaded and tick-driven: each tick repeats
/// its sub-phases until a full pass produces no state change, and only
/// then advances the logical clock to the next timer completion,
/// scripted action, or polling increment.
pub struct Simulation {
    /// The compiled state machine template shared by all faces.
    template: Template,
    /// The signal faces.
    faces: FaceSet,
    /// The lanes, in declared order.
    lanes: Vec<Lane>,
    /// The travel paths, in declared order.
    paths: Vec<TravelPath>,
    /// The sensors, in declared order.
    sensors: Vec<Sensor>,
    /// The traffic elements being simulated.
    elements: ElementSet,
    /// The green-request scheduler.
    scheduler: Scheduler,
    /// Pending scripted actions.
    script: Script,
    /// The timers currently counting down.
    running: RunningTimers,
    /// Events produced but not yet drained.
    events: Vec<Event>,
    /// The timestamp of the latest event produced so far.
    last_event: Option<f64>,
    /// The current simulation time in s.
    time: f64,
    /// Accumulated model errors; nonzero stops the clock.
    errors: usize,
    /// Monotone counter used to name spawned elements.
    spawn_seq: usize,
}

impl Simulation {
    /// Builds a simulation from the static intersection description,
    /// rejecting unknown names and malformed references at load.
    pub fn new(model: &IntersectionModel) -> Result<Self, ModelError> {
        let template = Template::compile(&model.template)?;
        let initial = template.initial()?;

        let mut faces = FaceSet::default();
        let mut names = vec![];
        for fm in &model.faces {
            let id = faces.insert_with_key(|id| {
                SignalFace::new(
                    id,
                    fm.name.clone(),
                    fm.toggles.clone(),
                    fm.timers.iter().map(|t| (t.name.clone(), t.duration)).collect(),
                    fm.lamp_map.clone(),
                    fm.waiting_limit,
                )
            });
            names.push((fm.name.clone(), id));
        }
        let find_face = |name: &str| -> Result<FaceId, ModelError> {
            names
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, id)| *id)
                .ok_or_else(|| ModelError::UnknownFace(name.to_owned()))
        };

        // Conflict relations are symmetric within each declared pair.
        for (fm, (_, id)) in model.faces.iter().zip(&names) {
            for name in &fm.conflicts {
                let other = find_face(name)?;
                if !faces[*id].conflicts.contains(&other) {
                    faces[*id].conflicts.push(other);
                }
                if !faces[other].conflicts.contains(id) {
                    faces[other].conflicts.push(*id);
                }
            }
            for name in &fm.partial_conflicts {
                let other = find_face(name)?;
                if !faces[*id].partial_conflicts.contains(&other) {
                    faces[*id].partial_conflicts.push(other);
                }
            }
        }

        for (_, id) in &names {
            template.validate_face(&faces[*id])?;
        }

        let lanes: Vec<Lane> = model
            .lanes
            .iter()
            .map(|l| Lane {
                name: l.name.clone(),
                speed_limit: l.speed_limit,
            })
            .collect();
        let find_lane = |name: &str| -> Result<usize, ModelError> {
            lanes
                .iter()
                .position(|l| l.name == name)
                .ok_or_else(|| ModelError::UnknownLane(name.to_owned()))
        };

        let mut paths = vec![];
        for pm in &model.paths {
            if pm.milestones.len() < 2 {
                return Err(ModelError::ShortPath(pm.name.clone()));
            }
            let mut permissive_left = None;
            let mut permissive_right = None;
            for turn in &pm.permissive_turns {
                let filter = match turn.movement.as_str() {
                    "present" => MovementFilter::Present,
                    "moving north" => MovementFilter::Moving(NORTH),
                    "moving south" => MovementFilter::Moving(SOUTH),
                    "moving east" => MovementFilter::Moving(EAST),
                    "moving west" => MovementFilter::Moving(WEST),
                    other => return Err(ModelError::UnknownMovement(other.to_owned())),
                };
                let permissive = PermissiveTurn {
                    filter,
                    region: Rect::axis_aligned(
                        turn.region.x,
                        turn.region.y,
                        turn.region.width,
                        turn.region.height,
                    ),
                };
                match turn.turn.as_str() {
                    "left" => permissive_left = Some(permissive),
                    "right" => permissive_right = Some(permissive),
                    other => return Err(ModelError::UnknownTurn(other.to_owned())),
                }
            }
            paths.push(TravelPath {
                name: pm.name.clone(),
                face: find_face(&pm.face)?,
                entry: find_lane(&pm.entry)?,
                exit: find_lane(&pm.exit)?,
                milestones: pm
                    .milestones
                    .iter()
                    .map(|m| Milestone {
                        region: m.region.clone(),
                        pos: Point2d::new(m.x, m.y),
                    })
                    .collect(),
                permissive_left,
                permissive_right,
            });
        }

        let mut sensors = vec![];
        for sm in &model.sensors {
            let face = find_face(&sm.face)?;
            let mut toggle_refs = SmallVec::new();
            for name in &sm.toggles {
                // A `Face/Toggle` qualifier wires the sensor to a
                // neighbouring face.
                let (target, toggle) = match name.split_once('/') {
                    Some((f, t)) => (find_face(f)?, t.to_owned()),
                    None => (face, name.clone()),
                };
                if faces[target].toggle(&toggle).is_none() {
                    return Err(ModelError::UndeclaredToggle {
                        face: faces[target].name().to_owned(),
                        name: toggle,
                    });
                }
                toggle_refs.push((target, toggle));
            }
            sensors.push(Sensor::new(
                sm.name.clone(),
                face,
                sm.region
                    .as_ref()
                    .map(|r| Rect::axis_aligned(r.x, r.y, r.width, r.height)),
                toggle_refs,
            ));
        }

        let mut sim = Self {
            template,
            faces,
            lanes,
            paths,
            sensors,
            elements: ElementSet::default(),
            scheduler: Scheduler::default(),
            script: Script::default(),
            running: RunningTimers::default(),
            events: vec![],
            last_event: None,
            time: 0.0,
            errors: 0,
            spawn_seq: 0,
        };

        // Every face starts in Red / Waiting for Clearance and runs
        // that substate's entry actions.
        let ids: Vec<FaceId> = sim.faces.keys().collect();
        for id in ids {
            sim.faces[id].state = initial;
            sim.faces[id].super_state = sim.template.kind(initial.0);
            let errors = fsm::enter_substate(
                &mut sim.faces[id],
                &sim.template,
                &sim.sensors,
                &mut sim.running,
                &mut sim.events,
                0.0,
            );
            sim.errors += errors;
        }

        Ok(sim)
    }

    /// Loads the scripted actions driving the run, replacing any
    /// previously loaded script.
    pub fn load_script(&mut self, actions: Vec<ScriptAction>) {
        self.script = Script::load(actions);
    }

    /// The current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The number of model errors encountered so far.
    pub fn error_count(&self) -> usize {
        self.errors
    }

    /// Looks up a face by name.
    pub fn face_id(&self, name: &str) -> Option<FaceId> {
        self.faces
            .iter()
            .find(|(_, face)| face.name() == name)
            .map(|(id, _)| id)
    }

    /// Gets a reference to the face with the given ID.
    pub fn get_face(&self, face_id: FaceId) -> &SignalFace {
        &self.faces[face_id]
    }

    /// Returns an iterator over all the faces in the simulation.
    pub fn iter_faces(&self) -> impl Iterator<Item = &SignalFace> {
        self.faces.values()
    }

    /// Returns an iterator over all the traffic elements, including
    /// ones that are no longer present.
    pub fn iter_elements(&self) -> impl Iterator<Item = &TrafficElement> {
        self.elements.values()
    }

    /// The worst wait a face has experienced between requesting green
    /// and flowing, and the time that wait ended.
    pub fn max_wait(&self, face: FaceId) -> Option<(f64, f64)> {
        self.scheduler.max_wait(face)
    }

    /// Takes the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// The ceiling of the final event's timestamp, for chaining runs.
    pub fn last_event_time(&self) -> Option<f64> {
        self.last_event.map(f64::ceil)
    }

    /// Runs the simulation until the clock reaches `duration`, nothing
    /// remains to happen, or a model error halts the clock.
    pub fn run(&mut self, duration: f64) {
        while self.tick(duration) {}
    }

    /// Executes one tick: settles all sub-phases at the current time,
    /// then advances the clock. Returns false once the run is over.
    pub fn tick(&mut self, duration: f64) -> bool {
        if self.errors > 0 {
            return false;
        }
        self.settle();
        if self.errors > 0 {
            log::error!("halting at {}: {} model errors", self.time, self.errors);
            return false;
        }
        match self.next_wake() {
            Some(next) if next <= duration => {
                self.time = next;
                true
            }
            Some(_) => {
                self.time = duration;
                false
            }
            // No running timers, pending actions or present elements.
            None => false,
        }
    }

    /// Repeats the sub-phases, in their fixed order, until a full pass
    /// produces no state change. This guarantees all cascading
    /// consequences of an external event propagate before time moves.
    fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_PASSES {
            if self.errors > 0 {
                return;
            }
            let mut activity = false;
            activity |= self.fsm_pass();
            activity |= self.scheduler.step(&mut self.faces, self.time);
            activity |= clearance::step(&mut self.faces);
            activity |= self.safety_pass();
            activity |= self.script_pass();
            activity |= self.sensor_pass();
            activity |= self.propagate_pass();
            activity |= self.motion_pass();
            activity |= self.running.expire(&mut self.faces, self.time);
            if !activity {
                self.note_events();
                return;
            }
        }
        log::error!("tick at {} did not settle", self.time);
        self.errors += 1;
    }

    /// The time of the next thing that can happen: the earliest timer
    /// completion, the next scripted action, or a polling increment
    /// while any element is present.
    fn next_wake(&self) -> Option<f64> {
        let mut next = f64::INFINITY;
        if let Some(at) = self.running.next_completion(&self.faces) {
            next = next.min(at);
        }
        if let Some(at) = self.script.next_time() {
            next = next.min(at);
        }
        if self.elements.values().any(|e| e.present()) {
            next = next.min(self.time + POLL_INTERVAL);
        }
        next.is_finite().then_some(f64::max(next, self.time))
    }

    /// Evaluates every face's state machine exits.
    fn fsm_pass(&mut self) -> bool {
        let mut activity = false;
        let ids: Vec<FaceId> = self.faces.keys().collect();
        for id in ids {
            let result = fsm::step_face(
                &mut self.faces[id],
                &self.template,
                &self.sensors,
                &mut self.running,
                &mut self.events,
                self.time,
            );
            activity |= result.activity;
            self.errors += result.errors;
        }
        activity
    }

    /// Verifies that no two conflicting faces are simultaneously green;
    /// on violation, forces every face's flash sensor on. The FSM's
    /// guards prevent this structurally; this is a failsafe.
    fn safety_pass(&mut self) -> bool {
        let ids: Vec<FaceId> = self.faces.keys().collect();
        let violation = ids.iter().tuple_combinations().any(|(a, b)| {
            self.faces[*a].super_state() == SuperState::Green
                && self.faces[*b].super_state() == SuperState::Green
                && self.faces[*a].conflicts_with(*b)
        });
        if !violation {
            return false;
        }
        log::error!("conflicting faces are simultaneously green; flashing all faces");
        let mut activity = false;
        for sensor in &mut self.sensors {
            if sensor.name() == FLASH_SENSOR {
                sensor.controlled_by_script = true;
                if !sensor.value {
                    sensor.value = true;
                    activity = true;
                }
            }
        }
        activity
    }

    /// Executes the scripted actions due at the current time.
    fn script_pass(&mut self) -> bool {
        let due: Vec<ScriptAction> = self.script.take_due(self.time).to_vec();
        let mut activity = false;
        for action in due {
            activity |= self.run_action(&action);
        }
        activity
    }

    fn run_action(&mut self, action: &ScriptAction) -> bool {
        if let Some(kind) = action.op.spawn_kind() {
            let delay = action.permissive_delay.unwrap_or(DEFAULT_PERMISSIVE_DELAY);
            return self.spawn_element(kind, &action.operand, delay);
        }

        match action.op {
            ScriptOp::SetToggle | ScriptOp::ClearToggle => {
                let value = action.op == ScriptOp::SetToggle;
                let targets = match self.face_targets(&action.target) {
                    Some(targets) => targets,
                    None => return false,
                };
                let mut activity = false;
                for id in targets {
                    if !value && holds_toggle(&self.sensors, id, &action.operand) {
                        log::warn!(
                            "script: clear of {:?} on {:?} refused",
                            action.operand,
                            self.faces[id].name()
                        );
                        continue;
                    }
                    match self.faces[id].set_toggle(&action.operand, value) {
                        Some(changed) => activity |= changed,
                        None => {
                            log::error!(
                                "script: face {:?} has no toggle {:?}",
                                self.faces[id].name(),
                                action.operand
                            );
                            self.errors += 1;
                        }
                    }
                }
                activity
            }
            ScriptOp::SensorOn | ScriptOp::SensorOff => {
                let value = action.op == ScriptOp::SensorOn;
                let targets = match self.face_targets(&action.target) {
                    Some(targets) => targets,
                    None => return false,
                };
                let mut activity = false;
                let mut found = false;
                for sensor in &mut self.sensors {
                    if sensor.name() == action.operand && targets.contains(&sensor.face()) {
                        found = true;
                        sensor.controlled_by_script = true;
                        if sensor.value != value {
                            sensor.value = value;
                            activity = true;
                        }
                    }
                }
                if !found {
                    log::error!("script: no sensor {:?} on {:?}", action.operand, action.target);
                    self.errors += 1;
                }
                activity
            }
            ScriptOp::Car | ScriptOp::Truck | ScriptOp::Pedestrian => unreachable!(),
        }
    }

    /// Resolves a script target: a face name, or `all`.
    fn face_targets(&mut self, target: &str) -> Option<Vec<FaceId>> {
        if target == "all" {
            return Some(self.faces.keys().collect());
        }
        match self.face_id(target) {
            Some(id) => Some(vec![id]),
            None => {
                log::error!("script: unknown face {target:?}");
                self.errors += 1;
                None
            }
        }
    }

    /// Spawns a traffic element at the first milestone of the named
    /// travel path. An element born overlapping another is discarded.
    fn spawn_element(&mut self, kind: ElementKind, path_name: &str, permissive_delay: f64) -> bool {
        let Some(path_idx) = self.paths.iter().position(|p| p.name == path_name) else {
            log::error!("script: unknown travel path {path_name:?}");
            self.errors += 1;
            return false;
        };
        let path = &self.paths[path_idx];
        let cruise = f64::min(
            self.lanes[path.entry].speed_limit,
            self.lanes[path.exit].speed_limit,
        );
        self.spawn_seq += 1;
        let name = format!("{} {}", kind.label(), self.spawn_seq);
        let now = self.time;
        let id = self.elements.insert_with_key(|id| {
            TrafficElement::new(id, name, kind, path_idx, path, cruise, permissive_delay, now)
        });

        let footprint = *self.elements[id].footprint();
        let blocked = self
            .elements
            .iter()
            .any(|(other, e)| other != id && e.present() && e.footprint().intersects(&footprint));

        let path = &self.paths[path_idx];
        let region = path.milestones[0].region.clone();
        if blocked {
            self.elements[id].present = false;
            log::info!("{:?} blocked from spawning", self.elements[id].name());
            self.events.push(element_event(
                now,
                ElementEventKind::BlockedFromSpawning,
                &region,
                &self.elements[id],
                path,
                &self.lanes,
            ));
            self.elements.remove(id);
        } else {
            log::info!("{:?} spawned on {:?}", self.elements[id].name(), path.name);
            self.events.push(element_event(
                now,
                ElementEventKind::Spawned,
                &region,
                &self.elements[id],
                path,
                &self.lanes,
            ));
        }
        true
    }

    /// Re-evaluates geometric sensors from element footprints.
    fn sensor_pass(&mut self) -> bool {
        let Self {
            sensors, elements, ..
        } = self;
        let mut activity = false;
        for sensor in sensors.iter_mut() {
            if sensor.controlled_by_script {
                continue;
            }
            let Some(region) = sensor.region() else {
                continue;
            };
            let value = elements
                .values()
                .any(|e| e.present() && e.footprint().intersects(region));
            if value != sensor.value {
                log::debug!("sensor {:?} -> {value}", sensor.name());
                sensor.value = value;
                activity = true;
            }
        }
        activity
    }

    /// Asserts the toggles mapped by every active sensor.
    fn propagate_pass(&mut self) -> bool {
        let Self {
            sensors,
            faces,
            errors,
            ..
        } = self;
        let mut activity = false;
        for sensor in sensors.iter() {
            if !sensor.value {
                continue;
            }
            for (face, toggle) in &sensor.toggles {
                match faces[*face].set_toggle(toggle, true) {
                    Some(changed) => activity |= changed,
                    None => *errors += 1,
                }
            }
        }
        activity
    }

    /// Advances every present element by the time elapsed since it last
    /// moved, handling signal gating, blocking and milestone crossings.
    ///
    /// Only discrete changes count as activity; steady movement does
    /// not, which is what lets a tick settle while elements roll.
    fn motion_pass(&mut self) -> bool {
        let Self {
            elements,
            paths,
            lanes,
            faces,
            events,
            time,
            ..
        } = self;
        let now = *time;
        let mut activity = false;

        let views: Vec<ElementView> = elements.values().map(|e| e.view()).collect();
        let ids: Vec<ElementId> = elements.keys().collect();

        for id in ids {
            if !elements[id].present() {
                continue;
            }
            let dt = now - elements[id].updated_at;
            elements[id].updated_at = now;
            let path = &paths[elements[id].path];

            // A blocked element waits for its remembered blocker to
            // clear its go shape, then resumes at the lesser of its
            // prior speed and the blocker's.
            if let Some(blocker) = elements[id].blocker {
                let view = views.iter().find(|v| v.id == blocker && v.present);
                let cleared = match view {
                    Some(v) => !v.footprint.intersects(elements[id].go_shape()),
                    None => true,
                };
                if !cleared {
                    continue;
                }
                let resume = match view {
                    Some(v) => f64::min(elements[id].pre_block_speed, v.speed),
                    None => elements[id].pre_block_speed,
                };
                let el = &mut elements[id];
                el.blocker = None;
                el.speed = resume;
                el.stopped_since = None;
                let region = path.milestones[el.milestone].region.clone();
                events.push(element_event(
                    now,
                    ElementEventKind::Unblocked,
                    &region,
                    &elements[id],
                    path,
                    lanes,
                ));
                activity = true;
            }

            // At a milestone on the edge of the intersection or
            // crosswalk, passage depends on the face's lamp.
            if elements[id].at_milestone(path)
                && path.enters_controlled_region(elements[id].milestone)
            {
                let lamp = faces[path.face].lamp_class();
                if !can_change_lanes(&elements[id], path, lamp, &views, now) {
                    let was_moving = elements[id].speed > 0.0;
                    let el = &mut elements[id];
                    el.come_to_stop(now);
                    if was_moving {
                        let region = path.milestones[el.milestone].region.clone();
                        events.push(element_event(
                            now,
                            ElementEventKind::Stopped,
                            &region,
                            &elements[id],
                            path,
                            lanes,
                        ));
                        activity = true;
                    }
                    continue;
                }
                if elements[id].speed == 0.0 {
                    let el = &mut elements[id];
                    el.speed = if el.was_stopped {
                        f64::min(el.cruise_speed, REDUCED_SPEED)
                    } else {
                        el.cruise_speed
                    };
                    el.stopped_since = None;
                    activity = true;
                }
            }

            if dt <= 0.0 || elements[id].speed <= 0.0 {
                continue;
            }

            // Straight-line motion toward the next milestone.
            let target = path.milestones[elements[id].milestone + 1].pos;
            let prev_pos = elements[id].position();
            let prev_speed = elements[id].speed;
            let reached = {
                let el = &mut elements[id];
                let reached = el.step_toward(target, el.speed * dt);
                el.update_shapes();
                reached
            };

            // A move that runs the stop shape into another element is
            // rolled back; the mover is blocked.
            if let Some(other) = first_overlap(elements[id].stop_shape(), &views, id) {
                let el = &mut elements[id];
                el.rollback_to(prev_pos);
                el.pre_block_speed = prev_speed;
                el.blocker = Some(other);
                el.come_to_stop(now);
                let region = path.milestones[el.milestone].region.clone();
                log::debug!("{:?} blocked at {now}", elements[id].name());
                events.push(element_event(
                    now,
                    ElementEventKind::Blocked,
                    &region,
                    &elements[id],
                    path,
                    lanes,
                ));
                activity = true;
                continue;
            }

            if reached {
                let el = &mut elements[id];
                el.milestone += 1;
                let last = el.milestone + 1 == path.milestones.len();
                let old_region = path.milestones[el.milestone - 1].region.clone();
                let new_region = path.milestones[el.milestone].region.clone();

                if last {
                    el.present = false;
                    events.push(element_event(
                        now,
                        ElementEventKind::Exited,
                        &new_region,
                        &elements[id],
                        path,
                        lanes,
                    ));
                    activity = true;
                    continue;
                }

                let el = &mut elements[id];
                el.reorient(path);
                el.update_shapes();
                // Outside the shared region the lane limits apply again.
                if !is_controlled_region(&new_region) && el.blocker.is_none() {
                    el.speed = el.cruise_speed;
                }
                if new_region != old_region {
                    if !is_controlled_region(&old_region) {
                        events.push(element_event(
                            now,
                            ElementEventKind::Left,
                            &old_region,
                            &elements[id],
                            path,
                            lanes,
                        ));
                    }
                    events.push(element_event(
                        now,
                        ElementEventKind::Entered,
                        &new_region,
                        &elements[id],
                        path,
                        lanes,
                    ));
                    activity = true;
                }
            }
        }

        activity
    }

    /// Records the timestamp of the latest event produced.
    fn note_events(&mut self) {
        if let Some(event) = self.events.last() {
            let at = event.time();
            self.last_event = Some(self.last_event.map_or(at, |prev| f64::max(prev, at)));
        }
    }
}

fn element_event(
    now: f64,
    kind: ElementEventKind,
    region: &str,
    element: &TrafficElement,
    path: &TravelPath,
    lanes: &[Lane],
) -> Event {
    Event::element(now, kind, region, &lanes[path.exit].name, &path.name, element)
}
