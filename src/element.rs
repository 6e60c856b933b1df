use crate::face::LampClass;
use crate::math::{Point2d, Rect, Vector2d};
use crate::path::{MovementFilter, PermissiveTurn, TravelPath};
use crate::ElementId;
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};

/// Length of the probe region just ahead of an element, used to
/// detect that it is blocked, in m.
const STOP_RANGE: f64 = 1.5;

/// Length of the longer probe region used to detect that a blocker
/// has sufficiently cleared before resuming, in m.
const GO_RANGE: f64 = 5.0;

/// Speed limit granted inside the intersection to an element that has
/// previously been stopped, in m/s.
pub(crate) const REDUCED_SPEED: f64 = 4.5;

/// Seconds an element must be stopped before a permissive turn is
/// considered, unless the script overrides it.
pub(crate) const DEFAULT_PERMISSIVE_DELAY: f64 = 1.0;

/// The kind of a traffic element, fixing its footprint dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Car,
    Truck,
    Pedestrian,
}

impl ElementKind {
    /// The element's length in m.
    pub fn length(&self) -> f64 {
        match self {
            ElementKind::Car => 4.5,
            ElementKind::Truck => 9.0,
            ElementKind::Pedestrian => 0.6,
        }
    }

    /// The element's width in m.
    pub fn width(&self) -> f64 {
        match self {
            ElementKind::Car => 1.8,
            ElementKind::Truck => 2.4,
            ElementKind::Pedestrian => 0.6,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            ElementKind::Car => "car",
            ElementKind::Truck => "truck",
            ElementKind::Pedestrian => "pedestrian",
        }
    }
}

/// A read-only snapshot of an element taken before a motion pass,
/// so each element's decisions see a consistent world.
#[derive(Clone, Copy)]
pub(crate) struct ElementView {
    pub id: ElementId,
    pub footprint: Rect,
    pub speed: f64,
    pub heading: Vector2d,
    pub present: bool,
}

/// A car, truck or pedestrian moving along a travel path.
pub struct TrafficElement {
    /// The element's ID.
    pub(crate) id: ElementId,
    /// The element's unique name.
    name: String,
    kind: ElementKind,
    /// Index of the element's travel path.
    pub(crate) path: usize,
    /// Index of the last milestone reached; the element moves toward
    /// the following one.
    pub(crate) milestone: usize,
    /// The centre of the element.
    pos: Point2d,
    /// Unit vector in the direction of travel.
    heading: Vector2d,
    /// The current speed in m/s.
    pub(crate) speed: f64,
    /// The speed assigned from the entry and exit lane limits, in m/s.
    pub(crate) cruise_speed: f64,
    /// False once the element has exited or was suppressed at spawn.
    pub(crate) present: bool,
    /// Whether the element has ever been stopped.
    pub(crate) was_stopped: bool,
    /// The time the element last came to a stop, while it remains stopped.
    pub(crate) stopped_since: Option<f64>,
    /// The element blocking this one, while blocked.
    pub(crate) blocker: Option<ElementId>,
    /// The speed to restore when the blocker clears, in m/s.
    pub(crate) pre_block_speed: f64,
    /// Seconds stopped before a permissive turn is considered.
    pub(crate) permissive_delay: f64,
    /// The time the element last moved.
    pub(crate) updated_at: f64,
    /// The element's current footprint.
    footprint: Rect,
    /// Short probe ahead of the element, used to detect being blocked.
    stop_shape: Rect,
    /// Longer probe ahead, used to detect that a blocker has cleared.
    go_shape: Rect,
}

impl TrafficElement {
    /// Creates an element at the first milestone of its travel path,
    /// heading toward the second.
    pub(crate) fn new(
        id: ElementId,
        name: String,
        kind: ElementKind,
        path_idx: usize,
        path: &TravelPath,
        cruise_speed: f64,
        permissive_delay: f64,
        now: f64,
    ) -> Self {
        let pos = path.milestones[0].pos;
        let heading = (path.milestones[1].pos - pos).normalize();
        let mut element = Self {
            id,
            name,
            kind,
            path: path_idx,
            milestone: 0,
            pos,
            heading,
            speed: cruise_speed,
            cruise_speed,
            present: true,
            was_stopped: false,
            stopped_since: None,
            blocker: None,
            pre_block_speed: cruise_speed,
            permissive_delay,
            updated_at: now,
            footprint: Rect::axis_aligned(0.0, 0.0, 0.0, 0.0),
            stop_shape: Rect::axis_aligned(0.0, 0.0, 0.0, 0.0),
            go_shape: Rect::axis_aligned(0.0, 0.0, 0.0, 0.0),
        };
        element.update_shapes();
        element
    }

    /// The element's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element's kind.
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The element's position.
    pub fn position(&self) -> Point2d {
        self.pos
    }

    /// A unit vector in the element's direction of travel.
    pub fn heading(&self) -> Vector2d {
        self.heading
    }

    /// The element's speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// False once the element has exited or was suppressed at spawn.
    pub fn present(&self) -> bool {
        self.present
    }

    /// The element's current footprint.
    pub fn footprint(&self) -> &Rect {
        &self.footprint
    }

    pub(crate) fn stop_shape(&self) -> &Rect {
        &self.stop_shape
    }

    pub(crate) fn go_shape(&self) -> &Rect {
        &self.go_shape
    }

    pub(crate) fn view(&self) -> ElementView {
        ElementView {
            id: self.id,
            footprint: self.footprint,
            speed: self.speed,
            heading: self.heading,
            present: self.present,
        }
    }

    /// True if the element sits exactly on its last reached milestone.
    pub(crate) fn at_milestone(&self, path: &TravelPath) -> bool {
        self.pos == path.milestones[self.milestone].pos
    }

    /// Moves up to `dist` metres toward the target point.
    /// Returns true if the target was reached.
    pub(crate) fn step_toward(&mut self, target: Point2d, dist: f64) -> bool {
        let to_target = target - self.pos;
        let remaining = to_target.magnitude();
        if remaining <= dist {
            self.pos = target;
            true
        } else {
            self.heading = to_target / remaining;
            self.pos += dist * self.heading;
            false
        }
    }

    /// Points the element toward the next milestone, if there is one.
    pub(crate) fn reorient(&mut self, path: &TravelPath) {
        if let Some(next) = path.milestones.get(self.milestone + 1) {
            let to_next = next.pos - self.pos;
            if to_next.magnitude() > 0.0 {
                self.heading = to_next.normalize();
            }
        }
    }

    /// Recomputes the footprint, stop shape and go shape from the
    /// element's position and heading.
    pub(crate) fn update_shapes(&mut self) {
        let half_len = 0.5 * self.kind.length();
        let half_wid = 0.5 * self.kind.width();
        self.footprint = Rect::oriented(self.pos, self.heading, half_len, half_wid);
        self.stop_shape = Rect::oriented(
            self.pos + (half_len + 0.5 * STOP_RANGE) * self.heading,
            self.heading,
            0.5 * STOP_RANGE,
            half_wid,
        );
        self.go_shape = Rect::oriented(
            self.pos + (half_len + 0.5 * GO_RANGE) * self.heading,
            self.heading,
            0.5 * GO_RANGE,
            half_wid,
        );
    }

    /// Undoes a move, restoring the previous position and shapes.
    pub(crate) fn rollback_to(&mut self, pos: Point2d) {
        self.pos = pos;
        self.update_shapes();
    }

    /// Marks the element stopped, remembering when it happened.
    pub(crate) fn come_to_stop(&mut self, now: f64) {
        self.speed = 0.0;
        self.was_stopped = true;
        self.stopped_since.get_or_insert(now);
    }

    /// True if the element has been stopped for at least its
    /// permissive delay.
    pub(crate) fn stopped_long_enough(&self, now: f64) -> bool {
        self.stopped_since
            .map(|since| now - since >= self.permissive_delay)
            .unwrap_or(false)
    }
}

/// Decides whether an element may proceed past a milestone into the
/// shared intersection or crosswalk region, based on the illuminated
/// lamp of the path's signal face.
pub(crate) fn can_change_lanes(
    element: &TrafficElement,
    path: &TravelPath,
    lamp: LampClass,
    others: &[ElementView],
    now: f64,
) -> bool {
    match lamp {
        // Any green-family lamp grants passage unconditionally.
        LampClass::Green => true,
        LampClass::PermissiveLeft => match &path.permissive_left {
            Some(turn) => {
                element.stopped_long_enough(now) && region_clear(turn, others, element.id)
            }
            None => false,
        },
        // A red or yellow lamp allows at most a permissive right turn.
        LampClass::RedOrYellow => match &path.permissive_right {
            Some(turn) => {
                element.stopped_long_enough(now) && region_clear(turn, others, element.id)
            }
            None => false,
        },
    }
}

/// True if no relevant element occupies the permissive-turn region.
fn region_clear(turn: &PermissiveTurn, others: &[ElementView], exclude: ElementId) -> bool {
    others
        .iter()
        .filter(|view| view.present && view.id != exclude)
        .filter(|view| view.footprint.intersects(&turn.region))
        .all(|view| match turn.filter {
            MovementFilter::Present => false,
            // Only elements heading within 90 degrees of the filter
            // direction threaten the turn.
            MovementFilter::Moving(dir) => view.heading.dot(dir) <= 0.0,
        })
}

/// Finds the first present element whose footprint overlaps the given
/// probe shape.
pub(crate) fn first_overlap(
    probe: &Rect,
    others: &[ElementView],
    exclude: ElementId,
) -> Option<ElementId> {
    others
        .iter()
        .find(|view| view.present && view.id != exclude && probe.intersects(&view.footprint))
        .map(|view| view.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::NORTH;
    use crate::path::Milestone;
    use crate::FaceId;

    fn path(permissive_right: Option<PermissiveTurn>) -> TravelPath {
        TravelPath {
            name: "North Through".into(),
            face: FaceId::default(),
            entry: 0,
            exit: 1,
            milestones: vec![
                Milestone {
                    region: "North Approach".into(),
                    pos: Point2d::new(0.0, -60.0),
                },
                Milestone {
                    region: "North Approach".into(),
                    pos: Point2d::new(0.0, -5.0),
                },
                Milestone {
                    region: "Intersection".into(),
                    pos: Point2d::new(0.0, 5.0),
                },
                Milestone {
                    region: "North Exit".into(),
                    pos: Point2d::new(0.0, 60.0),
                },
            ],
            permissive_left: None,
            permissive_right,
        }
    }

    fn element(path: &TravelPath) -> TrafficElement {
        TrafficElement::new(
            ElementId::default(),
            "car 1".into(),
            ElementKind::Car,
            0,
            path,
            15.0,
            DEFAULT_PERMISSIVE_DELAY,
            0.0,
        )
    }

    #[test]
    fn spawns_at_first_milestone_heading_at_second() {
        let path = path(None);
        let el = element(&path);
        assert_eq!(el.position(), Point2d::new(0.0, -60.0));
        assert_eq!(el.heading(), NORTH);
        assert!(el.at_milestone(&path));
    }

    #[test]
    fn probe_shapes_sit_ahead_of_the_footprint() {
        let path = path(None);
        let el = element(&path);
        // A point just beyond the front bumper is inside both probes
        // but outside the footprint.
        let probe_point = Point2d::new(0.0, -60.0 + 0.5 * 4.5 + 0.5);
        assert!(!el.footprint().contains(probe_point));
        assert!(el.stop_shape().contains(probe_point));
        assert!(el.go_shape().contains(probe_point));
        // The go shape reaches further than the stop shape.
        let far_point = Point2d::new(0.0, -60.0 + 0.5 * 4.5 + 4.0);
        assert!(!el.stop_shape().contains(far_point));
        assert!(el.go_shape().contains(far_point));
    }

    #[test]
    fn green_lamp_grants_passage() {
        let path = path(None);
        let el = element(&path);
        assert!(can_change_lanes(&el, &path, LampClass::Green, &[], 0.0));
    }

    #[test]
    fn red_lamp_refuses_without_permissive_region() {
        let path = path(None);
        let mut el = element(&path);
        el.come_to_stop(0.0);
        assert!(!can_change_lanes(&el, &path, LampClass::RedOrYellow, &[], 5.0));
    }

    #[test]
    fn permissive_right_needs_a_stop_and_an_empty_region() {
        let turn = PermissiveTurn {
            filter: MovementFilter::Moving(crate::math::WEST),
            region: Rect::axis_aligned(-20.0, -10.0, 20.0, 8.0),
        };
        let path = path(Some(turn));
        let mut el = element(&path);

        // Rolling up to the line is not enough.
        assert!(!can_change_lanes(&el, &path, LampClass::RedOrYellow, &[], 0.0));

        el.come_to_stop(3.0);
        assert!(!can_change_lanes(&el, &path, LampClass::RedOrYellow, &[], 3.5));
        assert!(can_change_lanes(&el, &path, LampClass::RedOrYellow, &[], 4.0));

        // Cross traffic approaching from the east blocks the turn;
        // traffic moving away does not.
        let mut other = ElementView {
            id: ElementId::default(),
            footprint: Rect::axis_aligned(-15.0, -8.0, 4.5, 1.8),
            speed: 10.0,
            heading: crate::math::WEST,
            present: true,
        };
        // Distinct id so the view is not mistaken for the turning car.
        other.id = crate::ElementId::from(slotmap::KeyData::from_ffi(7));
        assert!(!can_change_lanes(&el, &path, LampClass::RedOrYellow, &[other], 4.0));
        other.heading = crate::math::EAST;
        assert!(can_change_lanes(&el, &path, LampClass::RedOrYellow, &[other], 4.0));
    }
}
