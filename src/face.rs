use crate::fsm::SuperState;
use crate::FaceId;
use serde::{Deserialize, Serialize};

/// The well-known toggle names read and written by the scheduler,
/// the clearance protocol and the safety monitor.
pub mod toggles {
    pub const REQUEST_GREEN: &str = "Request Green";
    pub const GREEN_REQUEST_GRANTED: &str = "Green Request Granted";
    pub const TRAFFIC_FLOWING: &str = "Traffic Flowing";
    pub const REQUEST_CLEARANCE: &str = "Request Clearance";
    pub const REQUEST_PARTIAL_CLEARANCE: &str = "Request Partial Clearance";
    pub const CLEARANCE_REQUESTED: &str = "Clearance Requested";
    pub const CLEARED: &str = "Cleared";
    pub const CONFLICTING_PATHS_CLEAR: &str = "Conflicting Paths are Clear";
    pub const PARTIAL_CONFLICTING_PATHS_CLEAR: &str = "Partial Conflicting Paths are Clear";
    pub const FLASH: &str = "Flash";
}

/// A named boolean condition flag scoped to a signal face.
#[derive(Clone, Debug)]
pub struct Toggle {
    name: String,
    value: bool,
}

/// The configured duration of a [Timer]. A timer with an
/// `infinite` duration never completes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DurationRepr", into = "DurationRepr")]
pub enum TimerDuration {
    Finite(f64),
    Infinite,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DurationRepr {
    Seconds(f64),
    Sentinel(String),
}

impl From<TimerDuration> for DurationRepr {
    fn from(value: TimerDuration) -> Self {
        match value {
            TimerDuration::Finite(secs) => DurationRepr::Seconds(secs),
            TimerDuration::Infinite => DurationRepr::Sentinel("infinite".to_owned()),
        }
    }
}

impl TryFrom<DurationRepr> for TimerDuration {
    type Error = String;

    fn try_from(value: DurationRepr) -> Result<Self, Self::Error> {
        match value {
            DurationRepr::Seconds(secs) => Ok(TimerDuration::Finite(secs)),
            DurationRepr::Sentinel(s) if s == "infinite" => Ok(TimerDuration::Infinite),
            DurationRepr::Sentinel(s) => Err(format!("invalid timer duration {s:?}")),
        }
    }
}

/// The lifecycle state of a [Timer].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Off,
    Running,
    Completed,
}

/// A named countdown used to gate FSM transitions.
#[derive(Clone, Debug)]
pub struct Timer {
    name: String,
    duration: TimerDuration,
    state: TimerState,
    /// The simulation time at which the timer completes.
    completes_at: f64,
}

impl Timer {
    pub(crate) fn new(name: String, duration: TimerDuration) -> Self {
        Self {
            name,
            duration,
            state: TimerState::Off,
            completes_at: f64::INFINITY,
        }
    }

    /// The timer's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The timer's lifecycle state.
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Starts or restarts the timer with a fresh completion time.
    pub(crate) fn start(&mut self, now: f64) {
        self.state = TimerState::Running;
        self.completes_at = match self.duration {
            TimerDuration::Finite(secs) => now + secs,
            TimerDuration::Infinite => f64::INFINITY,
        };
    }

    /// The simulation time at which the timer completes.
    pub(crate) fn completes_at(&self) -> f64 {
        self.completes_at
    }

    /// The time left until completion. Negative once the timer is due.
    pub fn remaining(&self, now: f64) -> f64 {
        self.completes_at - now
    }

    /// Marks a due timer as completed. Returns true if the state changed.
    pub(crate) fn expire(&mut self, now: f64) -> bool {
        if self.state == TimerState::Running && self.completes_at <= now {
            self.state = TimerState::Completed;
            true
        } else {
            false
        }
    }
}

/// The set of timers currently counting down, across all faces.
///
/// A timer is `Running` exactly while it is a member of this set;
/// expiry removes it within the tick its remaining time reaches zero.
#[derive(Default)]
pub(crate) struct RunningTimers(Vec<(FaceId, usize)>);

impl RunningTimers {
    pub fn add(&mut self, face: FaceId, timer: usize) {
        if !self.0.contains(&(face, timer)) {
            self.0.push((face, timer));
        }
    }

    /// The earliest finite completion time of any member, if one exists.
    pub fn next_completion(&self, faces: &crate::FaceSet) -> Option<f64> {
        self.0
            .iter()
            .map(|(face, idx)| faces[*face].timers[*idx].completes_at())
            .filter(|at| at.is_finite())
            .min_by(f64::total_cmp)
    }

    /// Expires all due members, removing them from the set.
    /// Returns true if any timer completed.
    pub fn expire(&mut self, faces: &mut crate::FaceSet, now: f64) -> bool {
        let mut activity = false;
        self.0.retain(|(face, idx)| {
            if faces[*face].timers[*idx].expire(now) {
                log::debug!(
                    "timer {:?} on {:?} completed at {now}",
                    faces[*face].timers[*idx].name(),
                    faces[*face].name()
                );
                activity = true;
                false
            } else {
                true
            }
        });
        activity
    }
}

/// How a lamp gates traffic elements wanting to enter the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LampClass {
    /// Any green-family lamp; grants passage unconditionally.
    Green,
    /// A flashing arrow; grants a permissive turn across opposing traffic.
    PermissiveLeft,
    /// Steady red or yellow; at most a permissive right turn is allowed.
    RedOrYellow,
}

impl LampClass {
    /// Classifies an internal lamp name from the FSM template vocabulary.
    pub fn of(lamp: &str) -> Self {
        if lamp.contains("Green") {
            LampClass::Green
        } else if lamp.contains("Flashing") && lamp.contains("Arrow") {
            LampClass::PermissiveLeft
        } else {
            LampClass::RedOrYellow
        }
    }
}

/// One controlled movement at the intersection: a vehicular lane group
/// or a pedestrian crossing, with its own state machine, toggles and timers.
pub struct SignalFace {
    /// The face's ID.
    pub(crate) id: FaceId,
    /// The face's name.
    name: String,
    /// The current (super-state, substate) indices into the shared template.
    pub(crate) state: (usize, usize),
    /// The current super-state, mirrored from the template for cheap queries.
    pub(crate) super_state: SuperState,
    /// The face's toggles, in declared order.
    toggles: Vec<Toggle>,
    /// The face's timers, in declared order.
    pub(crate) timers: Vec<Timer>,
    /// Internal lamp name to physical lamp name.
    lamp_map: Vec<(String, String)>,
    /// The internal name of the currently illuminated lamp.
    lamp_internal: Option<String>,
    /// The physical name of the currently illuminated lamp.
    lamp: Option<String>,
    /// The faces whose green phase cannot overlap this one's.
    pub(crate) conflicts: Vec<FaceId>,
    /// The reduced conflict set that applies during permissive-turn phases.
    pub(crate) partial_conflicts: Vec<FaceId>,
    /// Max seconds the face may be denied green before it is force-admitted.
    waiting_limit: f64,
    /// The faces that have requested this face to clear.
    pub(crate) clearance_requested_by: Vec<FaceId>,
}

impl SignalFace {
    pub(crate) fn new(
        id: FaceId,
        name: String,
        toggles: Vec<String>,
        timers: Vec<(String, TimerDuration)>,
        lamp_map: Vec<(String, String)>,
        waiting_limit: f64,
    ) -> Self {
        Self {
            id,
            name,
            state: (0, 0),
            super_state: SuperState::Red,
            toggles: toggles
                .into_iter()
                .map(|name| Toggle { name, value: false })
                .collect(),
            timers: timers
                .into_iter()
                .map(|(name, duration)| Timer::new(name, duration))
                .collect(),
            lamp_map,
            lamp_internal: None,
            lamp: None,
            conflicts: vec![],
            partial_conflicts: vec![],
            waiting_limit,
            clearance_requested_by: vec![],
        }
    }

    /// Gets the face's ID.
    pub fn id(&self) -> FaceId {
        self.id
    }

    /// The face's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current super-state.
    pub fn super_state(&self) -> SuperState {
        self.super_state
    }

    /// The faces whose green phase cannot overlap this one's.
    pub fn conflicts(&self) -> &[FaceId] {
        &self.conflicts
    }

    /// The reduced conflict set used for permissive-turn phases.
    pub fn partial_conflicts(&self) -> &[FaceId] {
        &self.partial_conflicts
    }

    /// Max seconds the face may be denied green before it is force-admitted.
    pub fn waiting_limit(&self) -> f64 {
        self.waiting_limit
    }

    /// The value of the named toggle, or `None` if the face does not declare it.
    pub fn toggle(&self, name: &str) -> Option<bool> {
        self.toggles.iter().find(|t| t.name == name).map(|t| t.value)
    }

    /// True if the face declares the named toggle and it is currently true.
    pub fn toggle_is_true(&self, name: &str) -> bool {
        self.toggle(name) == Some(true)
    }

    /// Sets the named toggle. Returns whether the value changed,
    /// or `None` if the face does not declare the toggle.
    pub(crate) fn set_toggle(&mut self, name: &str, value: bool) -> Option<bool> {
        let toggle = self.toggles.iter_mut().find(|t| t.name == name)?;
        let changed = toggle.value != value;
        toggle.value = value;
        Some(changed)
    }

    /// The named timer, if the face declares it.
    pub fn timer(&self, name: &str) -> Option<&Timer> {
        self.timers.iter().find(|t| t.name == name)
    }

    /// The index of the named timer in the face's declared order.
    pub(crate) fn timer_index(&self, name: &str) -> Option<usize> {
        self.timers.iter().position(|t| t.name == name)
    }

    /// The internal name of the currently illuminated lamp.
    pub fn lamp_internal(&self) -> Option<&str> {
        self.lamp_internal.as_deref()
    }

    /// The physical name of the currently illuminated lamp.
    pub fn lamp(&self) -> Option<&str> {
        self.lamp.as_deref()
    }

    /// How the currently illuminated lamp gates traffic.
    /// A dark face gates like a steady red.
    pub fn lamp_class(&self) -> LampClass {
        self.lamp_internal
            .as_deref()
            .map(LampClass::of)
            .unwrap_or(LampClass::RedOrYellow)
    }

    /// Illuminates the given internal lamp, resolving it through the
    /// face's lamp map. Returns the physical lamp name if the physical
    /// lamp actually changed; a repeat set of the same lamp is a no-op.
    pub(crate) fn set_lamp(&mut self, internal: &str) -> Option<String> {
        let physical = self
            .lamp_map
            .iter()
            .find(|(from, _)| from == internal)
            .map(|(_, to)| to.clone())
            .unwrap_or_else(|| internal.to_owned());
        self.lamp_internal = Some(internal.to_owned());
        if self.lamp.as_deref() == Some(&physical) {
            return None;
        }
        self.lamp = Some(physical.clone());
        Some(physical)
    }

    /// True if the other face is in this face's full conflict set.
    pub fn conflicts_with(&self, other: FaceId) -> bool {
        self.conflicts.contains(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(duration: TimerDuration) -> Timer {
        Timer::new("Minimum Green".into(), duration)
    }

    #[test]
    fn timer_counts_down_and_completes() {
        let mut t = timer(TimerDuration::Finite(5.0));
        assert_eq!(t.state(), TimerState::Off);
        t.start(10.0);
        assert_eq!(t.state(), TimerState::Running);

        // Remaining time strictly decreases as the clock advances.
        let mut prev = t.remaining(10.0);
        for step in 1..=4 {
            let rem = t.remaining(10.0 + step as f64);
            assert!(rem < prev);
            prev = rem;
        }

        assert!(!t.expire(14.9));
        assert_eq!(t.state(), TimerState::Running);
        assert!(t.expire(15.0));
        assert_eq!(t.state(), TimerState::Completed);
    }

    #[test]
    fn timer_restart_resets_completion() {
        let mut t = timer(TimerDuration::Finite(2.0));
        t.start(0.0);
        assert!(t.expire(2.0));
        t.start(5.0);
        assert_eq!(t.state(), TimerState::Running);
        assert!(!t.expire(6.0));
        assert!(t.expire(7.0));
    }

    #[test]
    fn infinite_timer_never_completes() {
        let mut t = timer(TimerDuration::Infinite);
        t.start(0.0);
        assert!(!t.expire(1e12));
        assert_eq!(t.state(), TimerState::Running);
    }

    #[test]
    fn duration_serde_round_trip() {
        let finite: TimerDuration = serde_json::from_str("2.5").unwrap();
        assert_eq!(finite, TimerDuration::Finite(2.5));
        let infinite: TimerDuration = serde_json::from_str("\"infinite\"").unwrap();
        assert_eq!(infinite, TimerDuration::Infinite);
        assert_eq!(serde_json::to_string(&infinite).unwrap(), "\"infinite\"");
        assert!(serde_json::from_str::<TimerDuration>("\"forever\"").is_err());
    }

    #[test]
    fn lamp_map_resolution_and_repeat_sets() {
        let mut face = SignalFace::new(
            FaceId::default(),
            "North Pedestrians".into(),
            vec![],
            vec![],
            vec![("Steady Circular Green".into(), "Walk".into())],
            60.0,
        );
        assert_eq!(face.set_lamp("Steady Circular Green").as_deref(), Some("Walk"));
        // Repeat set of the same physical lamp produces no event.
        assert_eq!(face.set_lamp("Steady Circular Green"), None);
        // Classification uses the internal name, not the physical one.
        assert_eq!(face.lamp_class(), LampClass::Green);
        // Unmapped lamps resolve to themselves.
        assert_eq!(
            face.set_lamp("Steady Circular Red").as_deref(),
            Some("Steady Circular Red")
        );
        assert_eq!(face.lamp_class(), LampClass::RedOrYellow);
    }

    #[test]
    fn lamp_classification() {
        assert_eq!(LampClass::of("Steady Left Arrow Green"), LampClass::Green);
        assert_eq!(
            LampClass::of("Flashing Left Arrow Yellow"),
            LampClass::PermissiveLeft
        );
        assert_eq!(LampClass::of("Steady Circular Yellow"), LampClass::RedOrYellow);
        assert_eq!(LampClass::of("Flashing Circular Red"), LampClass::RedOrYellow);
    }
}
